use anyhow::{Context, Result};
use config::{Config, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::args::Args;
use crate::properties::HeaderPolicy;

pub const DEFAULT_NOTION_BASE_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// One Notion database and the file its query results are written to.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseDescriptor {
    pub label: String,
    pub id: String,
    pub output_path: PathBuf,
    pub filter: Option<Value>,
}

/// One target spreadsheet and the results file it is filled from.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadsheetDescriptor {
    pub label: String,
    pub id: String,
    pub input_path: PathBuf,
    pub sheet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotionCfg {
    pub api_key: String,
    pub base_url: String,
    pub version: String,
    pub page_size: Option<u32>,
    pub databases: Vec<DatabaseDescriptor>,
}

#[derive(Debug, Clone)]
pub struct GoogleCfg {
    pub credentials_file: String,
    pub header: HeaderPolicy,
    pub exact_range: bool,
    pub spreadsheets: Vec<SpreadsheetDescriptor>,
}

#[derive(Debug, Clone)]
pub struct Cfg {
    pub notion: NotionCfg,
    pub google: GoogleCfg,
    /// Labels requested on the command line; empty means every configured label.
    pub labels: Vec<String>,
    pub skip_read: bool,
    pub skip_write: bool,
}

// On-disk shape. Each table entry is a single-key mapping of label to descriptor.
#[derive(Debug, Deserialize)]
struct RawCfg {
    notion: RawNotion,
    google: RawGoogle,
}

#[derive(Debug, Deserialize)]
struct RawNotion {
    #[serde(default)]
    api_key: String,
    base_url: Option<String>,
    version: Option<String>,
    page_size: Option<u32>,
    #[serde(default)]
    databases: Vec<HashMap<String, RawDatabase>>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    #[serde(deserialize_with = "quoted_id")]
    id: String,
    output: String,
    #[serde(default)]
    filter: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawGoogle {
    #[serde(default)]
    credentials_file: String,
    #[serde(default)]
    header: HeaderPolicy,
    #[serde(default)]
    exact_range: bool,
    #[serde(default)]
    spreadsheets: Vec<HashMap<String, RawSpreadsheet>>,
}

#[derive(Debug, Deserialize)]
struct RawSpreadsheet {
    #[serde(deserialize_with = "quoted_id")]
    id: String,
    input_json: String,
    #[serde(default)]
    sheet: Option<String>,
}

// YAML reads an unquoted all-digit id as a number, and long ones lose digits
// on the way through a float. Only string scalars are accepted.
fn quoted_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> serde::de::Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a quoted id string")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: serde::de::Error>(self, v: String) -> std::result::Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<String, E> {
            Err(E::custom(format!("id {} must be quoted", v)))
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<String, E> {
            Err(E::custom(format!("id {} must be quoted", v)))
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> std::result::Result<String, E> {
            Err(E::custom(format!("id {} must be quoted", v)))
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

impl Cfg {
    pub fn load(args: Args) -> Result<Self> {
        info!("Loading configuration from: {}", args.config);

        let config = Config::builder()
            .add_source(File::with_name(&args.config).format(FileFormat::Yaml))
            .build()
            .with_context(|| format!("could not read config file {}", args.config))?;

        Self::from_config(config, args)
    }

    pub fn from_yaml(text: &str, args: Args) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Yaml))
            .build()?;

        Self::from_config(config, args)
    }

    fn from_config(config: Config, args: Args) -> Result<Self> {
        let raw: RawCfg = config
            .try_deserialize()
            .context("config file does not match the expected layout")?;

        let databases = raw
            .notion
            .databases
            .into_iter()
            .flat_map(|entry| entry.into_iter())
            .map(|(label, db)| DatabaseDescriptor {
                label,
                id: db.id,
                output_path: PathBuf::from(db.output),
                filter: db.filter,
            })
            .collect();

        let spreadsheets = raw
            .google
            .spreadsheets
            .into_iter()
            .flat_map(|entry| entry.into_iter())
            .map(|(label, sheet)| SpreadsheetDescriptor {
                label,
                id: sheet.id,
                input_path: PathBuf::from(sheet.input_json),
                sheet: sheet.sheet,
            })
            .collect();

        let mut cfg = Cfg {
            notion: NotionCfg {
                api_key: raw.notion.api_key,
                base_url: raw
                    .notion
                    .base_url
                    .unwrap_or_else(|| DEFAULT_NOTION_BASE_URL.to_string()),
                version: raw
                    .notion
                    .version
                    .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
                page_size: raw.notion.page_size,
                databases,
            },
            google: GoogleCfg {
                credentials_file: raw.google.credentials_file,
                header: raw.google.header,
                exact_range: raw.google.exact_range,
                spreadsheets,
            },
            labels: args.labels,
            skip_read: args.skip_read,
            skip_write: args.skip_write,
        };

        if let Some(api_key) = args.notion_api_key {
            debug!("Overriding notion.api_key from command line");
            cfg.notion.api_key = api_key;
        }

        cfg.normalize()?;

        debug!(
            databases = cfg.notion.databases.len(),
            spreadsheets = cfg.google.spreadsheets.len(),
            "Configuration loaded"
        );
        Ok(cfg)
    }

    // Canonical database ids and object filters, so the reader never sees config-file spellings.
    fn normalize(&mut self) -> Result<()> {
        for db in &mut self.notion.databases {
            db.id = normalize_database_id(&db.id).with_context(|| {
                format!("database {} has an unrecognised id: {}", db.label, db.id)
            })?;

            if let Some(Value::String(text)) = &db.filter {
                let parsed: Value = serde_json::from_str(text)
                    .with_context(|| format!("database {} has an invalid filter", db.label))?;
                db.filter = Some(parsed);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.skip_read {
            if self.notion.api_key.trim().is_empty() {
                anyhow::bail!("notion.api_key must be set (or pass --notion-api-key)");
            }
            if let Some(page_size) = self.notion.page_size {
                if !(1..=100).contains(&page_size) {
                    anyhow::bail!("notion.page_size must be between 1 and 100, found: {}", page_size);
                }
            }
        }

        if !self.skip_write && self.google.credentials_file.trim().is_empty() {
            anyhow::bail!("google.credentials_file must be set");
        }

        ensure_unique("notion.databases", self.notion.databases.iter().map(|d| &d.label))?;
        ensure_unique("google.spreadsheets", self.google.spreadsheets.iter().map(|s| &s.label))?;

        for db in &self.notion.databases {
            if db.output_path.as_os_str().is_empty() {
                anyhow::bail!("database {} needs an output path", db.label);
            }
            if let Some(filter) = &db.filter {
                if !filter.is_object() {
                    anyhow::bail!("database {} filter must be an object", db.label);
                }
            }
        }

        for sheet in &self.google.spreadsheets {
            if sheet.id.trim().is_empty() {
                anyhow::bail!("spreadsheet {} needs an id", sheet.label);
            }
            if sheet.input_path.as_os_str().is_empty() {
                anyhow::bail!("spreadsheet {} needs an input_json path", sheet.label);
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }

    pub fn database(&self, label: &str) -> Option<&DatabaseDescriptor> {
        self.notion.databases.iter().find(|db| db.label == label)
    }

    pub fn spreadsheet(&self, label: &str) -> Option<&SpreadsheetDescriptor> {
        self.google.spreadsheets.iter().find(|s| s.label == label)
    }

    /// Labels to read, in run order. Requested labels are passed through even
    /// when unknown so the driver can report them.
    pub fn database_labels(&self) -> Vec<String> {
        if self.labels.is_empty() {
            self.notion.databases.iter().map(|d| d.label.clone()).collect()
        } else {
            self.labels.clone()
        }
    }

    pub fn spreadsheet_labels(&self) -> Vec<String> {
        if self.labels.is_empty() {
            self.google.spreadsheets.iter().map(|s| s.label.clone()).collect()
        } else {
            self.labels.clone()
        }
    }
}

fn ensure_unique<'a>(table: &str, labels: impl Iterator<Item = &'a String>) -> Result<()> {
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label) {
            anyhow::bail!("{} lists label {} more than once", table, label);
        }
    }
    Ok(())
}

fn database_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?:[0-9a-fA-F]{32}|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})$",
        )
        .expect("database id pattern is valid")
    })
}

/// Accepts a bare id, a dashed UUID or a Notion URL and returns the 32-digit lowercase id.
pub fn normalize_database_id(raw: &str) -> Option<String> {
    let path = raw.trim().split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');

    database_id_pattern()
        .find(path)
        .map(|m| m.as_str().replace('-', "").to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
notion:
  api_key: secret_abc
  databases:
    - book_shelf:
        id: https://www.notion.so/me/Books-0123456789abcdef0123456789ABCDEF?v=42
        output: out/book_shelf.json
        filter: '{"property": "Status", "status": {"equals": "Done"}}'
    - reading_log:
        id: 01234567-89ab-cdef-0123-456789abcdef
        output: out/reading_log.json
google:
  credentials_file: token.json
  exact_range: true
  spreadsheets:
    - book_shelf:
        id: sheet-1
        input_json: out/book_shelf.json
        sheet: Books
"#;

    #[test]
    fn parses_label_tables_in_file_order() {
        let cfg = Cfg::from_yaml(SAMPLE, Args::default()).unwrap();

        let labels: Vec<_> = cfg.notion.databases.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["book_shelf", "reading_log"]);
        assert_eq!(cfg.notion.base_url, DEFAULT_NOTION_BASE_URL);
        assert_eq!(cfg.notion.version, DEFAULT_NOTION_VERSION);

        let db = cfg.database("book_shelf").unwrap();
        assert_eq!(db.id, "0123456789abcdef0123456789abcdef");
        assert_eq!(db.output_path, PathBuf::from("out/book_shelf.json"));
        assert_eq!(db.filter.as_ref().unwrap()["property"], "Status");

        let sheet = cfg.spreadsheet("book_shelf").unwrap();
        assert_eq!(sheet.sheet.as_deref(), Some("Books"));
        assert!(cfg.google.exact_range);
        assert_eq!(cfg.google.header, HeaderPolicy::Union);

        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_label_lookup_is_none() {
        let cfg = Cfg::from_yaml(SAMPLE, Args::default()).unwrap();
        assert!(cfg.database("missing").is_none());
        assert!(cfg.spreadsheet("reading_log").is_none());
    }

    #[test]
    fn requested_labels_replace_configured_order() {
        let args = Args {
            labels: vec!["reading_log".into(), "nope".into()],
            ..Args::default()
        };
        let cfg = Cfg::from_yaml(SAMPLE, args).unwrap();
        assert_eq!(cfg.database_labels(), vec!["reading_log", "nope"]);
        assert_eq!(cfg.spreadsheet_labels(), vec!["reading_log", "nope"]);
    }

    #[test]
    fn command_line_api_key_wins() {
        let args = Args {
            notion_api_key: Some("secret_cli".into()),
            ..Args::default()
        };
        let cfg = Cfg::from_yaml(SAMPLE, args).unwrap();
        assert_eq!(cfg.notion.api_key, "secret_cli");
    }

    #[test]
    fn rejects_bad_database_id() {
        let yaml = r#"
notion:
  api_key: k
  databases:
    - a:
        id: not-an-id
        output: a.json
google:
  credentials_file: token.json
"#;
        assert!(Cfg::from_yaml(yaml, Args::default()).is_err());
    }

    #[test]
    fn validate_catches_duplicates_and_page_size() {
        let yaml = r#"
notion:
  api_key: k
  page_size: 500
  databases:
    - a:
        id: 0123456789abcdef0123456789abcdef
        output: a.json
google:
  credentials_file: token.json
"#;
        let cfg = Cfg::from_yaml(yaml, Args::default()).unwrap();
        assert!(cfg.validate().is_err());

        let yaml = r#"
notion:
  api_key: k
  databases:
    - a:
        id: 0123456789abcdef0123456789abcdef
        output: a.json
    - a:
        id: 0123456789abcdef0123456789abcdef
        output: b.json
google:
  credentials_file: token.json
"#;
        let cfg = Cfg::from_yaml(yaml, Args::default()).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_api_key_is_fine_when_only_writing() {
        let yaml = r#"
notion:
  databases: []
google:
  credentials_file: token.json
"#;
        let args = Args {
            skip_read: true,
            ..Args::default()
        };
        let cfg = Cfg::from_yaml(yaml, args).unwrap();
        cfg.validate().unwrap();
    }

    #[test]
    fn unquoted_numeric_spreadsheet_id_is_rejected() {
        let yaml = r#"
notion:
  api_key: k
google:
  credentials_file: token.json
  spreadsheets:
    - books:
        id: 1234567890123456789012345
        input_json: books.json
"#;
        let err = Cfg::from_yaml(yaml, Args::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("must be quoted"));

        let quoted = yaml.replace(
            "id: 1234567890123456789012345",
            "id: \"1234567890123456789012345\"",
        );
        let cfg = Cfg::from_yaml(&quoted, Args::default()).unwrap();
        assert_eq!(cfg.spreadsheet("books").unwrap().id, "1234567890123456789012345");
    }

    #[test]
    fn normalizes_database_ids() {
        assert_eq!(
            normalize_database_id("0123456789ABCDEF0123456789abcdef").as_deref(),
            Some("0123456789abcdef0123456789abcdef")
        );
        assert_eq!(
            normalize_database_id("https://www.notion.so/0123456789abcdef0123456789abcdef/").as_deref(),
            Some("0123456789abcdef0123456789abcdef")
        );
        assert_eq!(normalize_database_id(""), None);
        assert_eq!(normalize_database_id("https://www.notion.so/me/Books"), None);
    }
}
