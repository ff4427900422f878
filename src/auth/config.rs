use std::path::PathBuf;

use crate::auth::types::AuthError;

/// Returns the Kiro Desktop Auth token refresh URL for the given region.
///
/// Example: `get_refresh_url("us-east-1")` →
/// `"https://prod.us-east-1.auth.desktop.kiro.dev/refreshToken"`
pub fn get_refresh_url(region: &str) -> String {
    format!("https://prod.{}.auth.desktop.kiro.dev/refreshToken", region)
}

/// Returns the CodeWhisperer API host for the given region.
///
/// Example: `get_codewhisperer_host("us-east-1")` →
/// `"https://codewhisperer.us-east-1.amazonaws.com"`
pub fn get_codewhisperer_host(region: &str) -> String {
    format!("https://codewhisperer.{}.amazonaws.com", region)
}

/// Path of the Kiro desktop credential cache:
/// `<home>/.aws/sso/cache/kiro-auth-token.json`.
pub fn get_token_file_path() -> Result<PathBuf, AuthError> {
    let home = dirs::home_dir().ok_or(AuthError::NoHomeDir)?;
    Ok(home
        .join(".aws")
        .join("sso")
        .join("cache")
        .join("kiro-auth-token.json"))
}
