use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::cfg::NotionCfg;

#[derive(Debug, Error)]
pub enum NotionError {
    #[error("request to Notion failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Notion answered {status}: {body}")]
    Api { status: u16, body: String },
    #[error("could not decode Notion response: {source}; body: {body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("page {page} reported more results but no next cursor")]
    MissingCursor { page: usize },
}

impl NotionError {
    /// Response body returned by Notion, if the failure carried one.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            NotionError::Api { body, .. } | NotionError::Decode { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Body of a database query call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

/// One page of query results.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryPage {
    pub results: Vec<Value>,
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait DatabaseQuery {
    async fn query_page(
        &self,
        database_id: &str,
        request: &QueryRequest,
    ) -> Result<QueryPage, NotionError>;
}

pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    authorization: String,
    version: String,
}

impl NotionClient {
    pub fn new(cfg: &NotionCfg) -> Self {
        let key = cfg.api_key.trim();
        let authorization = if key.starts_with("Bearer ") {
            key.to_string()
        } else {
            format!("Bearer {}", key)
        };

        Self {
            http: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            authorization,
            version: cfg.version.clone(),
        }
    }
}

#[async_trait]
impl DatabaseQuery for NotionClient {
    async fn query_page(
        &self,
        database_id: &str,
        request: &QueryRequest,
    ) -> Result<QueryPage, NotionError> {
        let url = format!("{}/databases/{}/query", self.base_url, database_id);

        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.authorization)
            .header("Notion-Version", &self.version)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(NotionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| NotionError::Decode { source, body })
    }
}

/// Queries `database_id` page by page until Notion reports no more results
/// and returns every record in the order received. The first failing page
/// aborts the whole read.
pub async fn fetch_all<Q>(
    source: &Q,
    database_id: &str,
    filter: Option<&Value>,
    page_size: Option<u32>,
) -> Result<Vec<Value>, NotionError>
where
    Q: DatabaseQuery + ?Sized,
{
    let mut request = QueryRequest {
        filter: filter.cloned(),
        start_cursor: None,
        page_size,
    };
    let mut records = Vec::new();
    let mut page = 1;

    loop {
        let QueryPage {
            results,
            has_more,
            next_cursor,
        } = source.query_page(database_id, &request).await?;

        records.extend(results);
        debug!(
            page,
            has_more,
            next_cursor = next_cursor.as_deref().unwrap_or("-"),
            total = records.len(),
            "Fetched query page"
        );

        if !has_more {
            break;
        }

        match next_cursor {
            Some(cursor) => request.start_cursor = Some(cursor),
            None => return Err(NotionError::MissingCursor { page }),
        }
        page += 1;
    }

    info!("Got {} results from {} query pages", records.len(), page);
    Ok(records)
}
