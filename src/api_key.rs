//! OpenAI API key resolution and storage.
//!
//! The key is read from the `OPENAI_API_KEY` environment variable first
//! (which dotenvy may have populated from a .env file). When absent there,
//! the OS's native secret storage is consulted:
//! - Linux: libsecret (GNOME Keyring/KDE Wallet)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! Security notes:
//! - Never log the key value
//! - Always use masked display in output

use keyring::Entry;

const SERVICE_NAME: &str = "dentascribe";
const API_KEY_NAME: &str = "openai-api-key";

/// Where a resolved key came from, for status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Keyring,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Environment => "OPENAI_API_KEY environment variable",
            KeySource::Keyring => "system keyring",
        }
    }
}

fn env_api_key() -> Option<String> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Some(key),
        _ => None,
    }
}

fn keyring_api_key() -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, API_KEY_NAME) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("api key: failed to create keyring entry: {}", e);
            return None;
        }
    };

    match entry.get_password() {
        Ok(key) if !key.is_empty() => Some(key),
        Ok(_) => None,
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            tracing::warn!("api key: failed to read keyring: {}", e);
            None
        }
    }
}

/// Resolve the API key: environment first, then keyring.
pub fn resolve_api_key() -> Option<String> {
    env_api_key().or_else(keyring_api_key)
}

/// Resolve the API key along with where it came from.
pub fn resolve_api_key_with_source() -> Option<(String, KeySource)> {
    if let Some(key) = env_api_key() {
        return Some((key, KeySource::Environment));
    }
    keyring_api_key().map(|key| (key, KeySource::Keyring))
}

/// Whether any API key is available (for status display).
pub fn is_api_key_configured() -> bool {
    resolve_api_key().is_some()
}

/// Store the API key in the system keyring. Pass None to delete it.
pub fn set_api_key(key: Option<&str>) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, API_KEY_NAME)
        .map_err(|e| format!("Failed to create keyring entry: {}", e))?;

    match key {
        Some(k) if !k.is_empty() => {
            entry
                .set_password(k)
                .map_err(|e| format!("Failed to store API key: {}", e))?;
            // Log the action, never the key
            tracing::info!("api key: stored new key in keyring");
        }
        _ => {
            match entry.delete_credential() {
                Ok(()) => tracing::info!("api key: deleted key from keyring"),
                Err(keyring::Error::NoEntry) => {
                    // Already deleted, that's fine
                }
                Err(e) => return Err(format!("Failed to delete API key: {}", e)),
            }
        }
    }

    Ok(())
}

/// Mask a key for display (e.g. "sk-...abc123").
pub fn mask_key(key: &str) -> String {
    if key.len() <= 8 {
        "*".repeat(key.len())
    } else {
        format!("{}...{}", &key[..3], &key[key.len() - 6..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_keys_are_fully_masked() {
        assert_eq!(mask_key("abcd"), "****");
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("12345678"), "********");
    }

    #[test]
    fn long_keys_show_prefix_and_suffix_only() {
        let masked = mask_key("sk-proj-1234567890abcdef");
        assert_eq!(masked, "sk-...abcdef");
        assert!(!masked.contains("1234567890"));
    }

    #[test]
    fn key_source_labels() {
        assert!(KeySource::Environment.as_str().contains("OPENAI_API_KEY"));
        assert!(KeySource::Keyring.as_str().contains("keyring"));
    }
}
