//! Credential loading from environment variables and secret files.
//!
//! Deployment mounts credentials as files; local runs set them directly.
//! A plain environment variable always overrides the `*_FILE` variant.

use std::path::Path;

/// Read and trim the contents of a secret file. Returns `None` when the
/// path is unset or the file does not exist.
pub fn read_secret_file(path: Option<&str>) -> Option<String> {
    let path = path?;
    if !Path::new(path).is_file() {
        return None;
    }

    std::fs::read_to_string(path)
        .ok()
        .map(|contents| contents.trim().to_string())
        .filter(|secret| !secret.is_empty())
}

/// Resolve a secret from `{var}` or, failing that, from the file named by
/// `{var}_FILE`.
pub fn env_or_secret_file(var: &str) -> Option<String> {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            return Some(value);
        }
    }

    let file_var = format!("{}_FILE", var);
    read_secret_file(std::env::var(file_var).ok().as_deref())
}
