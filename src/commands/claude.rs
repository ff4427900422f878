// Claude Code setup: mark onboarding complete in ~/.claude.json so the
// client starts straight into the proxy, then print the env exports.

use std::path::Path;

use serde_json::{json, Value};

use crate::auth::TokenStore;
use crate::error::{AppError, AppResult};

pub fn enable_claude_code() -> AppResult<()> {
    let home = dirs::home_dir()
        .ok_or_else(|| AppError::Other("could not determine home directory".into()))?;
    let config_path = home.join(".claude.json");

    flip_onboarding_flag(&config_path)?;
    println!("Updated {}", config_path.display());

    let store = TokenStore::new()?;
    let token = store.read()?;
    super::token::print_env_exports(&token.access_token);
    Ok(())
}

/// Set `hasCompletedOnboarding: true`, creating the file if missing and
/// preserving every other key.
fn flip_onboarding_flag(path: &Path) -> AppResult<()> {
    let mut config: Value = if path.exists() {
        serde_json::from_str(&std::fs::read_to_string(path)?).unwrap_or_else(|_| json!({}))
    } else {
        json!({})
    };

    if let Value::Object(map) = &mut config {
        map.insert("hasCompletedOnboarding".to_string(), json!(true));
    }

    std::fs::write(path, serde_json::to_string_pretty(&config)?)?;
    Ok(())
}
