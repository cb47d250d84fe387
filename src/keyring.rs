//! Keychain storage for backend credentials
//!
//! All backend keys live in a single keychain entry, stored as JSON, so the
//! OS only prompts once.

use crate::transform::BackendKind;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::warn;

const KEYRING_SERVICE: &str = "refract-credentials";
const KEYRING_USERNAME: &str = "default";

/// All credentials stored in a single keychain entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    anthropic_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    huggingface_api_key: Option<String>,
}

impl StoredCredentials {
    fn get(&self, backend: BackendKind) -> Option<&String> {
        match backend {
            BackendKind::Claude => self.anthropic_api_key.as_ref(),
            BackendKind::HuggingFace => self.huggingface_api_key.as_ref(),
        }
    }

    fn set(&mut self, backend: BackendKind, key: &str) {
        let slot = match backend {
            BackendKind::Claude => &mut self.anthropic_api_key,
            BackendKind::HuggingFace => &mut self.huggingface_api_key,
        };
        *slot = Some(key.to_string());
    }
}

type KeyringResult<T> = Result<T, String>;

static CREDENTIALS_CACHE: OnceLock<Mutex<Option<KeyringResult<StoredCredentials>>>> =
    OnceLock::new();
static KEYRING_ERROR_WARNED: AtomicBool = AtomicBool::new(false);

fn credentials_cache() -> &'static Mutex<Option<KeyringResult<StoredCredentials>>> {
    CREDENTIALS_CACHE.get_or_init(|| Mutex::new(None))
}

/// Keychain access is off under test and when `REFRACT_DISABLE_KEYRING` is set.
pub fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }
    matches!(
        std::env::var("REFRACT_DISABLE_KEYRING")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
        "1" | "true" | "yes"
    )
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

/// Warn about keychain errors only once per process
fn warn_keychain_error_once(err: &str) {
    if KEYRING_ERROR_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    warn!(
        error = err,
        "couldn't access system keychain; set ANTHROPIC_API_KEY / HUGGINGFACE_API_KEY to bypass it"
    );
}

fn read_credentials_uncached() -> KeyringResult<StoredCredentials> {
    if keyring_disabled() {
        return Ok(StoredCredentials::default());
    }
    let entry = keyring_entry().map_err(|e| e.to_string())?;
    match entry.get_password() {
        Ok(json) => {
            serde_json::from_str(&json).map_err(|e| format!("Failed to parse credentials: {}", e))
        }
        Err(keyring::Error::NoEntry) => Ok(StoredCredentials::default()),
        Err(err) => Err(err.to_string()),
    }
}

fn write_credentials(creds: &StoredCredentials) -> Result<(), String> {
    if keyring_disabled() {
        return Err("system keychain is disabled".to_string());
    }
    let json = serde_json::to_string(creds).map_err(|e| e.to_string())?;
    keyring_entry()
        .and_then(|entry| entry.set_password(&json))
        .map_err(|e| e.to_string())
}

fn read_credentials_cached() -> KeyringResult<StoredCredentials> {
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(ref result) = *guard {
        return result.clone();
    }
    let result = read_credentials_uncached();
    *guard = Some(result.clone());
    result
}

fn update_cache(creds: StoredCredentials) {
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(Ok(creds));
}

// ============================================================================
// Public API
// ============================================================================

/// Stored key for `backend`, if any. Keychain errors are warned about once
/// and treated as "no key".
pub fn get_credential(backend: BackendKind) -> Option<String> {
    match read_credentials_cached() {
        Ok(creds) => creds.get(backend).cloned(),
        Err(err) => {
            warn_keychain_error_once(&err);
            None
        }
    }
}

/// Store the key for `backend`, keeping the other backends' keys.
pub fn set_credential(backend: BackendKind, key: &str) -> Result<(), String> {
    let mut creds = read_credentials_cached().unwrap_or_default();
    creds.set(backend, key);
    write_credentials(&creds)?;
    update_cache(creds);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
