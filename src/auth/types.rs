use serde::{Deserialize, Serialize};
use thiserror::Error;

/// On-disk credential cache written by the Kiro desktop app
/// (camelCase JSON at `~/.aws/sso/cache/kiro-auth-token.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenFile {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Body POSTed to the desktop auth refresh endpoint.
#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Response from the desktop auth refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "expiresAt", default)]
    pub expires_at: Option<String>,
}

/// Errors specific to the auth module.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("failed to read token file: {0}")]
    ReadToken(#[source] std::io::Error),

    #[error("failed to parse token file: {0}")]
    ParseToken(#[source] serde_json::Error),

    #[error("failed to write token file: {0}")]
    WriteToken(#[source] std::io::Error),

    #[error("token refresh failed: HTTP {status} - {body}")]
    RefreshStatus { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
