use std::collections::HashSet;
use std::path::PathBuf;

use tracing::debug;

/// Environment variable holding a comma-separated list of config directories.
pub const CONFIG_DIR_ENV: &str = "CLAUDE_CONFIG_DIR";

/// Conventional locations, in lookup order.
pub fn default_config_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(config) = dirs::config_dir() {
        dirs.push(config.join("claude"));
    }
    if let Some(home) = dirs::home_dir() {
        let xdg_style = home.join(".config").join("claude");
        if !dirs.contains(&xdg_style) {
            dirs.push(xdg_style);
        }
        dirs.push(home.join(".claude"));
    }
    dirs
}

pub fn split_override(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub fn override_from_env() -> Vec<PathBuf> {
    std::env::var(CONFIG_DIR_ENV)
        .map(|raw| split_override(&raw))
        .unwrap_or_default()
}

fn existing_unique(candidates: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for candidate in candidates {
        if !candidate.is_dir() {
            debug!(dir = %candidate.display(), "config dir does not exist");
            continue;
        }
        if seen.insert(candidate.clone()) {
            found.push(candidate.clone());
        }
    }
    found
}

/// Directories to scan: the existing overrides if any, else the existing fallbacks.
pub fn resolve_config_dirs(overrides: &[PathBuf], fallbacks: &[PathBuf]) -> Vec<PathBuf> {
    let resolved = existing_unique(overrides);
    if !resolved.is_empty() {
        return resolved;
    }
    existing_unique(fallbacks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_trims_override_list() {
        let dirs = split_override(" /a , /b,,/c ");
        assert_eq!(
            dirs,
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
        assert!(split_override("").is_empty());
    }

    #[test]
    fn keeps_existing_overrides_in_order_without_duplicates() {
        let root = tempfile::tempdir().expect("tempdir");
        let first = root.path().join("first");
        let second = root.path().join("second");
        std::fs::create_dir_all(&first).expect("first");
        std::fs::create_dir_all(&second).expect("second");
        let missing = root.path().join("missing");

        let resolved = resolve_config_dirs(
            &[second.clone(), missing, first.clone(), second.clone()],
            &[],
        );
        assert_eq!(resolved, vec![second, first]);
    }

    #[test]
    fn falls_back_when_no_override_exists() {
        let root = tempfile::tempdir().expect("tempdir");
        let fallback = root.path().join("fallback");
        std::fs::create_dir_all(&fallback).expect("fallback");

        let resolved = resolve_config_dirs(
            &[root.path().join("nope")],
            &[root.path().join("also-nope"), fallback.clone()],
        );
        assert_eq!(resolved, vec![fallback]);
    }

    #[test]
    fn nothing_existing_resolves_to_empty() {
        let root = tempfile::tempdir().expect("tempdir");
        assert!(resolve_config_dirs(&[], &[root.path().join("x")]).is_empty());
    }
}
