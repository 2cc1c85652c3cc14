use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not access results file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("results file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The file handed from the Notion reader to the sheet writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResults {
    pub results: Vec<Value>,
}

impl QueryResults {
    pub fn new(results: Vec<Value>) -> Self {
        Self { results }
    }
}

pub fn load_results(path: &Path) -> Result<QueryResults, StoreError> {
    debug!("Loading results from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let results: QueryResults =
        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    info!("Loaded {} records from {}", results.results.len(), path.display());
    Ok(results)
}

/// Overwrites `path` with the indented JSON document.
pub fn save_results(path: &Path, results: &QueryResults) -> Result<(), StoreError> {
    let io_err = |source: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let json = serde_json::to_string_pretty(results).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(io_err)?;

    info!("Saved {} records to {}", results.results.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_indented_document_and_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/books.json");

        let results = QueryResults::new(vec![json!({ "id": "1", "properties": {} })]);
        save_results(&path, &results).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"results\""));

        let loaded = load_results(&path).unwrap();
        assert_eq!(loaded.results, results.results);
    }

    #[test]
    fn empty_result_set_is_still_a_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");

        save_results(&path, &QueryResults::default()).unwrap();
        let parsed: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, json!({ "results": [] }));
    }

    #[test]
    fn overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");

        save_results(&path, &QueryResults::new(vec![json!(1), json!(2)])).unwrap();
        save_results(&path, &QueryResults::new(vec![json!(3)])).unwrap();
        assert_eq!(load_results(&path).unwrap().results, vec![json!(3)]);
    }

    #[test]
    fn missing_or_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_results(&missing), Err(StoreError::Io { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(load_results(&broken), Err(StoreError::Json { .. })));
    }
}
