use anyhow::{Context, Result};
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    auth::create_sheets_hub,
    cfg::Cfg,
    notion::{fetch_all, DatabaseQuery, NotionClient},
    properties::{build_row, header_for},
    sheets::{column_letter, data_range, header_range, value_range, ValuesUpdater},
    store::{load_results, save_results, QueryResults},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step finished; carries the number of records handled.
    Done(usize),
    Skipped,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub databases_read: usize,
    pub sheets_written: usize,
    pub skipped: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: StepOutcome, done: fn(&mut Self)) {
        match outcome {
            StepOutcome::Done(_) => done(self),
            StepOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Queries one configured database to exhaustion and persists the results.
/// Unknown labels are reported and skipped; a failing query is returned to
/// the caller and nothing is written.
pub async fn read_database<Q>(cfg: &Cfg, source: &Q, label: &str) -> Result<StepOutcome>
where
    Q: DatabaseQuery + ?Sized,
{
    let Some(db) = cfg.database(label) else {
        error!("No database with label {} found", label);
        return Ok(StepOutcome::Skipped);
    };

    info!("Querying database {}", db.id);
    let records = match fetch_all(source, &db.id, db.filter.as_ref(), cfg.notion.page_size).await {
        Ok(records) => records,
        Err(e) => {
            error!(
                response = e.response_body().unwrap_or("-"),
                "Got the following error when querying db: {}", e
            );
            return Err(e).with_context(|| format!("query of database {} failed", label));
        }
    };

    let count = records.len();
    info!("Saving response json to output file {}", db.output_path.display());
    save_results(&db.output_path, &QueryResults::new(records))?;

    Ok(StepOutcome::Done(count))
}

/// Writes the header row and one row per stored record to the configured
/// spreadsheet, overwriting what is there.
pub async fn write_spreadsheet<U>(cfg: &Cfg, updater: &U, label: &str) -> Result<StepOutcome>
where
    U: ValuesUpdater + ?Sized,
{
    let Some(target) = cfg.spreadsheet(label) else {
        error!("No spreadsheet with label {} found", label);
        return Ok(StepOutcome::Skipped);
    };

    let stored = load_results(&target.input_path)?;
    let records = stored.results;

    let header = header_for(&records, cfg.google.header);
    if records.is_empty() || header.is_empty() {
        warn!(
            "Nothing to write from {}: {} records, {} columns",
            target.input_path.display(),
            records.len(),
            header.len()
        );
        return Ok(StepOutcome::Skipped);
    }

    let width = header.len();
    let sheet = target.sheet.as_deref();
    info!(
        "Writing {} records as {} columns (A..{})",
        records.len(),
        width,
        column_letter(width)
    );

    let range = header_range(sheet, width);
    updater
        .update_values(&target.id, &range, value_range(&range, vec![header.clone()]))
        .await
        .context("failed to write header row")?;

    let rows: Vec<Vec<String>> = records.iter().map(|r| build_row(&header, r)).collect();
    let range = data_range(sheet, width, rows.len(), cfg.google.exact_range);
    updater
        .update_values(&target.id, &range, value_range(&range, rows))
        .await
        .context("failed to write data rows")?;

    Ok(StepOutcome::Done(records.len()))
}

/// Runs every selected read, then every selected write, in label order.
pub async fn run_steps<Q, U>(
    cfg: &Cfg,
    source: Option<&Q>,
    updater: Option<&U>,
) -> Result<RunSummary>
where
    Q: DatabaseQuery + ?Sized,
    U: ValuesUpdater + ?Sized,
{
    let mut summary = RunSummary::default();

    if let Some(source) = source {
        for label in cfg.database_labels() {
            let span = info_span!("notion_read", label = %label);
            let outcome = read_database(cfg, source, &label).instrument(span).await?;
            summary.record(outcome, |s| s.databases_read += 1);
        }
    }

    if let Some(updater) = updater {
        for label in cfg.spreadsheet_labels() {
            let span = info_span!("sheet_write", label = %label);
            let outcome = write_spreadsheet(cfg, updater, &label).instrument(span).await?;
            summary.record(outcome, |s| s.sheets_written += 1);
        }
    }

    Ok(summary)
}

pub async fn run_job(cfg: Cfg) -> Result<RunSummary> {
    info!("Starting job execution");

    cfg.validate()?;

    let client = (!cfg.skip_read).then(|| NotionClient::new(&cfg.notion));
    let hub = if cfg.skip_write {
        None
    } else {
        Some(create_sheets_hub(&cfg.google.credentials_file).await?)
    };

    let summary = run_steps(&cfg, client.as_ref(), hub.as_ref()).await?;

    info!(
        "Job completed. Read {} databases, wrote {} spreadsheets, skipped {}",
        summary.databases_read, summary.sheets_written, summary.skipped
    );
    Ok(summary)
}
