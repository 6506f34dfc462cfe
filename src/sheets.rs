#![cfg(feature = "web")]
//! Google Sheets backend.
//!
//! Readings live on the first worksheet of a spreadsheet. Access uses a
//! service-account key file: a signed RS256 assertion is exchanged for a
//! bearer token at the key's `token_uri`, and the token is reused until
//! shortly before it expires.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::reading::{HEADER, Reading};
use crate::store::{ReadingStore, StoreError, records_from_rows};

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.file";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens this close to expiry are refreshed before use
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service-account key file this backend needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let credentials_error = |reason: String| StoreError::Credentials {
            path: path.display().to_string(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|e| credentials_error(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| credentials_error(e.to_string()))
    }

    /// Signs the token request assertion, valid from `now` for an hour.
    pub fn assertion(&self, now: i64) -> Result<String, StoreError> {
        let claims = Claims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| StoreError::Auth(format!("invalid private key: {}", e)))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| StoreError::Auth(format!("failed to sign assertion: {}", e)))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsStore {
    spreadsheet_id: String,
    credentials_path: PathBuf,
    api_base: String,
    client: reqwest::Client,
    token: Option<AccessToken>,
    worksheet: Option<String>,
}

impl SheetsStore {
    pub fn new(spreadsheet_id: &str, credentials_path: &Path) -> Self {
        SheetsStore {
            spreadsheet_id: spreadsheet_id.trim().to_string(),
            credentials_path: credentials_path.to_path_buf(),
            api_base: SHEETS_API_BASE.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            token: None,
            worksheet: None,
        }
    }

    /// Points the store at another API host.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn access_token(&mut self) -> Result<String, StoreError> {
        if let Some(token) = &self.token {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let key = ServiceAccountKey::load(&self.credentials_path)?;
        let assertion = key.assertion(Utc::now().timestamp())?;
        debug!("requesting access token for {}", key.client_email);

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!(
                "token request returned {}: {}",
                status,
                body.trim()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("unreadable token response: {}", e)))?;
        let value = token.access_token.clone();
        self.token = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    /// Maps a failed API response onto the store error it stands for.
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());

        Err(match status.as_u16() {
            401 | 403 => StoreError::Auth(message),
            404 => StoreError::NotFound(self.spreadsheet_id.clone()),
            code => StoreError::Api {
                status: code,
                message,
            },
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&mut self, url: &str) -> Result<T, StoreError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        self.check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Transport(format!("unreadable response: {}", e)))
    }

    /// The quoted A1 range naming the first worksheet.
    async fn worksheet_range(&mut self) -> Result<String, StoreError> {
        if self.spreadsheet_id.is_empty() {
            return Err(StoreError::NotConfigured);
        }
        if let Some(title) = &self.worksheet {
            return Ok(a1_sheet_range(title));
        }

        let url = format!(
            "{}/v4/spreadsheets/{}?fields=sheets.properties.title",
            self.api_base,
            urlencoding::encode(&self.spreadsheet_id)
        );
        let meta: SpreadsheetMeta = self.get_json(&url).await?;
        let title = meta
            .sheets
            .into_iter()
            .next()
            .map(|sheet| sheet.properties.title)
            .ok_or_else(|| StoreError::NotFound(format!("{} (no worksheets)", self.spreadsheet_id)))?;
        debug!("using worksheet '{}'", title);

        let range = a1_sheet_range(&title);
        self.worksheet = Some(title);
        Ok(range)
    }

    async fn values(&mut self) -> Result<Vec<Vec<String>>, StoreError> {
        let range = self.worksheet_range().await?;
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(&range)
        );
        let values: ValueRange = self.get_json(&url).await?;
        Ok(values
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn append_values(&mut self, row: Value) -> Result<(), StoreError> {
        let range = self.worksheet_range().await?;
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.api_base,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(&range)
        );
        let token = self.access_token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "values": [row] }))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        self.check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for SheetsStore {
    async fn ensure_header(&mut self) -> Result<(), StoreError> {
        if self.values().await?.is_empty() {
            debug!("worksheet is empty, writing header");
            self.append_values(json!(HEADER)).await?;
        }
        Ok(())
    }

    async fn append(&mut self, reading: &Reading) -> Result<(), StoreError> {
        self.append_values(json!([
            reading.timestamp,
            reading.systolic,
            reading.diastolic,
            reading.pulse
        ]))
        .await
    }

    async fn read_all(&mut self) -> Result<Vec<Reading>, StoreError> {
        records_from_rows(&self.values().await?)
    }
}

fn a1_sheet_range(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
