use anyhow::{Context, Result};
use google_sheets4::{hyper, hyper_rustls, oauth2, Sheets};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::sheets::SheetsHub;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsKind {
    AuthorizedUser,
    ServiceAccount,
}

#[derive(Deserialize)]
struct CredentialsHeader {
    #[serde(rename = "type")]
    kind: Option<CredentialsKind>,
}

/// Reads the `type` field of a Google credentials file. Token files written by
/// the installed-app flow omit it and are treated as authorized-user secrets.
pub fn credentials_kind(contents: &str) -> Result<CredentialsKind> {
    let header: CredentialsHeader = serde_json::from_str(contents)
        .context("credentials file is not a supported Google credentials JSON")?;
    Ok(header.kind.unwrap_or(CredentialsKind::AuthorizedUser))
}

pub async fn create_sheets_hub(credentials_file: &str) -> Result<SheetsHub> {
    info!("Initializing Google Sheets authentication");

    let path = Path::new(credentials_file);
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("could not read credentials file {}", credentials_file))?;
    let kind = credentials_kind(&contents)?;
    debug!(?kind, "Detected credentials type");

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()?
        .https_or_http()
        .enable_http1()
        .build();
    let client = hyper::Client::builder().build::<_, hyper::Body>(https);

    let auth = match kind {
        CredentialsKind::AuthorizedUser => {
            let secret = oauth2::read_authorized_user_secret(path)
                .await
                .context("could not parse authorized user credentials")?;
            oauth2::AuthorizedUserAuthenticator::with_client(secret, client.clone())
                .build()
                .await
                .context("could not create an authenticator")?
        }
        CredentialsKind::ServiceAccount => {
            let key = oauth2::read_service_account_key(path)
                .await
                .context("could not parse service account key")?;
            oauth2::ServiceAccountAuthenticator::with_client(key, client.clone())
                .build()
                .await
                .context("could not create an authenticator")?
        }
    };

    Ok(Sheets::new(client, auth))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_credentials_kind() {
        let user = r#"{"type": "authorized_user", "client_id": "x", "client_secret": "y", "refresh_token": "z"}"#;
        let service = r#"{"type": "service_account", "private_key": "k"}"#;
        let token = r#"{"token": "t", "refresh_token": "r", "client_id": "x", "client_secret": "y"}"#;

        assert_eq!(credentials_kind(user).unwrap(), CredentialsKind::AuthorizedUser);
        assert_eq!(credentials_kind(service).unwrap(), CredentialsKind::ServiceAccount);
        assert_eq!(credentials_kind(token).unwrap(), CredentialsKind::AuthorizedUser);
        assert!(credentials_kind("not json").is_err());
    }

    #[tokio::test]
    async fn missing_credentials_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");

        let err = create_sheets_hub(path.to_str().unwrap()).await.err().unwrap();
        assert!(format!("{:#}", err).contains("could not read credentials file"));
    }
}
