use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "notion_sheet_sync")]
#[command(about = "A CLI tool to export Notion databases to JSON and write them into Google Sheets")]
#[command(version)]
pub struct Args {
    /// Path to config file
    #[arg(long, default_value = "config.yaml")]
    pub config: String,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Notion integration token (overrides notion.api_key)
    #[arg(long, env = "NOTION_API_KEY", value_name = "KEY", hide_env_values = true)]
    pub notion_api_key: Option<String>,

    /// Only process these labels (repeatable)
    #[arg(long = "label", value_name = "LABEL")]
    pub labels: Vec<String>,

    /// Don't query Notion, reuse the JSON files already on disk
    #[arg(long)]
    pub skip_read: bool,

    /// Don't write to Google Sheets
    #[arg(long)]
    pub skip_write: bool,
}
