use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::auth::config::{get_refresh_url, get_token_file_path};
use crate::auth::types::{AuthError, RefreshRequest, RefreshResponse, TokenFile};
use crate::constants::DEFAULT_REGION;

/// Accessor for the Kiro desktop credential file.
///
/// Refreshes are serialized behind a mutex so that concurrent 403s from
/// parallel requests share a single round-trip to the auth endpoint
/// instead of racing each other on the file.
pub struct TokenStore {
    path: PathBuf,
    refresh_url: String,
    client: reqwest::Client,
    refresh_lock: Mutex<()>,
}

impl TokenStore {
    pub fn new() -> Result<Self, AuthError> {
        Ok(Self::with_paths(
            get_token_file_path()?,
            get_refresh_url(DEFAULT_REGION),
        ))
    }

    /// Construct against an explicit file path and refresh endpoint.
    pub fn with_paths(path: PathBuf, refresh_url: String) -> Self {
        Self {
            path,
            refresh_url,
            client: reqwest::Client::new(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read and parse the token file.
    pub fn read(&self) -> Result<TokenFile, AuthError> {
        let data = std::fs::read_to_string(&self.path).map_err(AuthError::ReadToken)?;
        serde_json::from_str(&data).map_err(AuthError::ParseToken)
    }

    /// Force a refresh against the auth endpoint and persist the result.
    pub async fn refresh(&self) -> Result<TokenFile, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.read()?;
        self.refresh_locked(&current).await
    }

    /// Refresh for a caller that just saw `stale_access_token` rejected.
    ///
    /// If another request already rotated the credential, the on-disk
    /// token differs from the stale one and is returned without a
    /// network call.
    pub async fn refresh_if_stale(&self, stale_access_token: &str) -> Result<TokenFile, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.read()?;
        if current.access_token != stale_access_token {
            info!("Token already rotated by a concurrent refresh, reusing it");
            return Ok(current);
        }
        self.refresh_locked(&current).await
    }

    /// Caller must hold `refresh_lock`.
    async fn refresh_locked(&self, current: &TokenFile) -> Result<TokenFile, AuthError> {
        let req = RefreshRequest {
            refresh_token: current.refresh_token.clone(),
        };

        let resp = self
            .client
            .post(&self.refresh_url)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Token refresh rejected: HTTP {} - {}", status.as_u16(), body);
            return Err(AuthError::RefreshStatus {
                status: status.as_u16(),
                body,
            });
        }

        let refreshed: RefreshResponse = resp.json().await?;
        let token = TokenFile {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed.expires_at,
        };

        self.write(&token)?;
        info!("Token refreshed and persisted to {}", self.path.display());
        Ok(token)
    }

    /// Persist the token: pretty JSON, mode 0600, written to a temp file
    /// in the same directory and renamed into place.
    fn write(&self, token: &TokenFile) -> Result<(), AuthError> {
        let data = serde_json::to_string_pretty(token)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(AuthError::WriteToken)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .map_err(AuthError::WriteToken)?;
        }

        std::fs::rename(&tmp, &self.path).map_err(AuthError::WriteToken)?;
        Ok(())
    }
}
