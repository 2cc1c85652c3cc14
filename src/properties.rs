use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// How the column header is derived from a result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Property names of the first record only.
    FirstRecord,
    /// Every property name seen across all records, in first-seen order.
    #[default]
    Union,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: Option<String>,
    #[serde(default)]
    pub text: Option<TextContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectOption {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateValue {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormulaValue {
    String { string: Option<String> },
    Number { number: Option<serde_json::Number> },
    Boolean { boolean: Option<bool> },
    Date { date: Option<DateValue> },
}

/// A Notion property value, keyed by its `type` tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title { title: Option<Vec<RichText>> },
    RichText { rich_text: Option<Vec<RichText>> },
    MultiSelect { multi_select: Option<Vec<SelectOption>> },
    Status { status: Option<SelectOption> },
    Select { select: Option<SelectOption> },
    Number { number: Option<serde_json::Number> },
    Checkbox { checkbox: Option<bool> },
    Date { date: Option<DateValue> },
    Url { url: Option<String> },
    Email { email: Option<String> },
    PhoneNumber { phone_number: Option<String> },
    CreatedTime { created_time: Option<String> },
    LastEditedTime { last_edited_time: Option<String> },
    Formula { formula: Option<FormulaValue> },
    #[serde(other)]
    Other,
}

impl PropertyValue {
    /// Flattens the value into one spreadsheet cell. Empty payloads and
    /// unhandled types yield an empty string so the row keeps its width.
    pub fn to_cell(&self) -> String {
        match self {
            PropertyValue::Title { title: runs } | PropertyValue::RichText { rich_text: runs } => {
                runs.as_deref().map(first_run_text).unwrap_or_default()
            }
            PropertyValue::MultiSelect { multi_select } => multi_select
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|option| option.name.as_str())
                .collect::<Vec<_>>()
                .join(","),
            PropertyValue::Status { status: option } | PropertyValue::Select { select: option } => {
                option.as_ref().map(|o| o.name.clone()).unwrap_or_default()
            }
            PropertyValue::Number { number } => {
                number.as_ref().map(|n| n.to_string()).unwrap_or_default()
            }
            PropertyValue::Checkbox { checkbox } => {
                checkbox.map(|b| b.to_string()).unwrap_or_default()
            }
            PropertyValue::Date { date } => date.as_ref().map(date_text).unwrap_or_default(),
            PropertyValue::Url { url: text }
            | PropertyValue::Email { email: text }
            | PropertyValue::PhoneNumber { phone_number: text }
            | PropertyValue::CreatedTime { created_time: text }
            | PropertyValue::LastEditedTime { last_edited_time: text } => {
                text.clone().unwrap_or_default()
            }
            PropertyValue::Formula { formula } => match formula {
                Some(FormulaValue::String { string }) => string.clone().unwrap_or_default(),
                Some(FormulaValue::Number { number }) => {
                    number.as_ref().map(|n| n.to_string()).unwrap_or_default()
                }
                Some(FormulaValue::Boolean { boolean }) => {
                    boolean.map(|b| b.to_string()).unwrap_or_default()
                }
                Some(FormulaValue::Date { date }) => {
                    date.as_ref().map(date_text).unwrap_or_default()
                }
                None => String::new(),
            },
            PropertyValue::Other => String::new(),
        }
    }
}

fn first_run_text(runs: &[RichText]) -> String {
    runs.first()
        .and_then(|run| {
            run.text
                .as_ref()
                .map(|t| t.content.clone())
                .or_else(|| run.plain_text.clone())
        })
        .unwrap_or_default()
}

fn date_text(date: &DateValue) -> String {
    match &date.end {
        Some(end) => format!("{} → {}", date.start, end),
        None => date.start.clone(),
    }
}

fn properties(record: &Value) -> Option<&Map<String, Value>> {
    record.get("properties").and_then(Value::as_object)
}

/// Property names of one record, in the order they appear in the record.
pub fn derive_header(record: &Value) -> Vec<String> {
    let header: Vec<String> = properties(record)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    debug!(?header, "Derived header from first record");
    header
}

/// Every property name across `records`, in first-seen order.
pub fn derive_union_header(records: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut header = Vec::new();
    for props in records.iter().filter_map(properties) {
        for name in props.keys() {
            if seen.insert(name.as_str()) {
                header.push(name.clone());
            }
        }
    }
    debug!(?header, "Derived header from all records");
    header
}

pub fn header_for(records: &[Value], policy: HeaderPolicy) -> Vec<String> {
    match policy {
        HeaderPolicy::FirstRecord => records.first().map(derive_header).unwrap_or_default(),
        HeaderPolicy::Union => derive_union_header(records),
    }
}

/// One cell per header entry, in header order.
pub fn build_row(header: &[String], record: &Value) -> Vec<String> {
    let props = properties(record);
    header
        .iter()
        .map(|name| match props.and_then(|p| p.get(name)) {
            Some(raw) => cell_for(name, raw),
            None => String::new(),
        })
        .collect()
}

fn cell_for(name: &str, raw: &Value) -> String {
    match PropertyValue::deserialize(raw) {
        Ok(value) => value.to_cell(),
        Err(e) => {
            debug!(property = name, error = %e, "Unreadable property payload, leaving cell empty");
            String::new()
        }
    }
}
