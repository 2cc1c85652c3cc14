use async_trait::async_trait;
use google_sheets4::api::ValueRange;
use google_sheets4::{hyper, hyper_rustls, Sheets};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

pub type SheetsHub = Sheets<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("failed to update {range} in spreadsheet {spreadsheet_id}: {message}")]
    Update {
        spreadsheet_id: String,
        range: String,
        message: String,
    },
}

#[async_trait]
pub trait ValuesUpdater {
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: ValueRange,
    ) -> Result<(), SheetsError>;
}

#[async_trait]
impl ValuesUpdater for SheetsHub {
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: ValueRange,
    ) -> Result<(), SheetsError> {
        info!("Updating sheet {} range {}", spreadsheet_id, range);

        let result = self
            .spreadsheets()
            .values_update(values, spreadsheet_id, range)
            .value_input_option("RAW")
            .doit()
            .await;

        match result {
            Ok((_, response)) => {
                debug!(
                    updated_cells = response.updated_cells.unwrap_or_default(),
                    "Sheet update accepted"
                );
                Ok(())
            }
            Err(e) => Err(SheetsError::Update {
                spreadsheet_id: spreadsheet_id.to_string(),
                range: range.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Spreadsheet column label for the `n`-th column, 1-based (1 → A, 27 → AA).
/// Zero has no label and yields an empty string.
pub fn column_letter(n: usize) -> String {
    let mut n = n;
    let mut letters = Vec::new();
    while n > 0 {
        let remainder = (n - 1) % 26;
        letters.push(b'A' + remainder as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn qualify(sheet: Option<&str>, range: String) -> String {
    match sheet {
        Some(name) => format!("'{}'!{}", name.replace('\'', "''"), range),
        None => range,
    }
}

/// `A1:<last>1` for a header `width` columns wide.
pub fn header_range(sheet: Option<&str>, width: usize) -> String {
    qualify(sheet, format!("A1:{}1", column_letter(width)))
}

/// Range for `rows` data rows below the header. Unless `exact` is set the end
/// row is `rows + 2`, leaving one blank row of slack after the data.
pub fn data_range(sheet: Option<&str>, width: usize, rows: usize, exact: bool) -> String {
    let end_row = if exact { rows + 1 } else { rows + 2 };
    qualify(sheet, format!("A2:{}{}", column_letter(width), end_row))
}

/// Row-major value body for `range`.
pub fn value_range(range: &str, rows: Vec<Vec<String>>) -> ValueRange {
    ValueRange {
        major_dimension: Some("ROWS".to_string()),
        range: Some(range.to_string()),
        values: Some(
            rows.into_iter()
                .map(|row| row.into_iter().map(Value::String).collect())
                .collect(),
        ),
    }
}
