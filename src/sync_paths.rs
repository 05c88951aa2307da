//! Centralized home-based storage paths for quota-sync persistence.
//!
//! Everything lives under `~/.quota-sync/`:
//! - `store/<origin-hash>/` - Persistent counter documents, scoped per origin
//! - `logs/<origin-hash>/` - Structured event journal
//! - `config.yaml` - Optional user configuration

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
#[cfg(test)]
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

/// The name of the quota-sync directory.
const QUOTA_SYNC_DIR: &str = ".quota-sync";

#[cfg(test)]
thread_local! {
    static HOME_OVERRIDE: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

/// Returns the home-based quota-sync directory: `~/.quota-sync/`
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn quota_sync_home_dir() -> Result<PathBuf> {
    let home = match home_override() {
        Some(path) => path,
        None => dirs::home_dir().context("Could not determine home directory for quota storage")?,
    };
    let dir = home.join(QUOTA_SYNC_DIR);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create quota-sync directory: {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
fn home_override() -> Option<PathBuf> {
    HOME_OVERRIDE.with(|h| h.borrow().clone())
}

#[cfg(not(test))]
fn home_override() -> Option<PathBuf> {
    None
}

/// Returns the store directory for an origin: `~/.quota-sync/store/<origin-hash>/`
pub fn store_dir(origin: &str) -> Result<PathBuf> {
    let dir = quota_sync_home_dir()?.join("store").join(origin_hash(origin));
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the logs directory for an origin: `~/.quota-sync/logs/<origin-hash>/`
pub fn logs_dir(origin: &str) -> Result<PathBuf> {
    let dir = quota_sync_home_dir()?.join("logs").join(origin_hash(origin));
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the user config path: `~/.quota-sync/config.yaml`
pub fn config_path() -> Result<PathBuf> {
    Ok(quota_sync_home_dir()?.join("config.yaml"))
}

/// Computes an origin hash (SHA256 truncated to 12 hex characters).
///
/// Origins are compared case-insensitively and without a trailing slash, so
/// `https://App.example/` and `https://app.example` share one store.
pub fn origin_hash(origin: &str) -> String {
    let normalized = origin.trim().trim_end_matches('/').to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let result = hasher.finalize();
    hex_encode(&result[..6])
}

/// Encodes bytes as lowercase hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Restores the previous home override when dropped.
#[cfg(test)]
pub struct TestHomeGuard {
    previous: Option<PathBuf>,
}

#[cfg(test)]
impl Drop for TestHomeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        HOME_OVERRIDE.with(|h| *h.borrow_mut() = previous);
    }
}

/// Points `quota_sync_home_dir` at `home` for the current thread.
///
/// The override is thread-local, so tests using it must stay on one thread
/// (`#[test]` or a current-thread `#[tokio::test]`).
#[cfg(test)]
pub fn set_home_for_test(home: PathBuf) -> TestHomeGuard {
    let previous = HOME_OVERRIDE.with(|h| h.borrow_mut().replace(home));
    TestHomeGuard { previous }
}

#[cfg(test)]
#[path = "tests/sync_paths_tests.rs"]
mod tests;
