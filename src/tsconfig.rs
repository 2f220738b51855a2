//! Resolves TypeScript path aliases (`compilerOptions.paths` /
//! `compilerOptions.baseUrl`) so the relation extractor can turn
//! `import "@app/widgets"` into a real file-relative path. Parsed
//! `tsconfig.json`s are cached per project root; the cache is invalidated
//! whenever that file changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
struct RawTsconfig {
    #[serde(rename = "compilerOptions")]
    compiler_options: Option<RawCompilerOptions>,
}

#[derive(Debug, Deserialize, Default)]
struct RawCompilerOptions {
    #[serde(rename = "baseUrl")]
    base_url: Option<String>,
    paths: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedTsconfig {
    pub base_url: Option<String>,
    /// Alias glob (with a single trailing `*` stripped) to candidate target
    /// prefixes, also with the trailing `*` stripped.
    pub paths: Vec<(String, Vec<String>)>,
}

impl ResolvedTsconfig {
    /// Rewrites `specifier` using the first alias whose prefix matches, or
    /// returns it unchanged if nothing matches.
    pub fn resolve_alias(&self, specifier: &str) -> Option<String> {
        for (alias_prefix, targets) in &self.paths {
            if let Some(suffix) = specifier.strip_prefix(alias_prefix.as_str()) {
                if let Some(target_prefix) = targets.first() {
                    return Some(format!("{target_prefix}{suffix}"));
                }
            }
        }
        None
    }
}

fn strip_star(pattern: &str) -> String {
    pattern.strip_suffix('*').unwrap_or(pattern).to_string()
}

fn parse(contents: &str) -> ResolvedTsconfig {
    let raw: RawTsconfig = serde_json::from_str(contents).unwrap_or_default();
    let Some(options) = raw.compiler_options else {
        return ResolvedTsconfig::default();
    };
    let mut paths = Vec::new();
    if let Some(raw_paths) = options.paths {
        for (alias, targets) in raw_paths {
            let targets = targets.into_iter().map(|t| strip_star(&t)).collect();
            paths.push((strip_star(&alias), targets));
        }
        paths.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }
    ResolvedTsconfig {
        base_url: options.base_url,
        paths,
    }
}

#[derive(Default)]
pub struct TsconfigCache {
    entries: RwLock<HashMap<PathBuf, Arc<ResolvedTsconfig>>>,
}

impl TsconfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resolved config for the `tsconfig.json` found at
    /// `project_root`, parsing and caching it on first access. A missing
    /// file resolves to an empty (no-op) config.
    pub fn get(&self, project_root: &Path) -> Arc<ResolvedTsconfig> {
        if let Some(cached) = self.entries.read().get(project_root) {
            return cached.clone();
        }

        let config_path = project_root.join("tsconfig.json");
        let resolved = std::fs::read_to_string(&config_path)
            .ok()
            .map(|contents| parse(&contents))
            .unwrap_or_default();
        let resolved = Arc::new(resolved);

        self.entries.write().insert(project_root.to_path_buf(), resolved.clone());
        resolved
    }

    /// Drops the cached entry for `project_root`, forcing the next `get` to
    /// re-read `tsconfig.json` from disk.
    pub fn clear(&self, project_root: &Path) {
        self.entries.write().remove(project_root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn resolves_wildcard_alias() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{"compilerOptions": {"baseUrl": ".", "paths": {"@app/*": ["src/*"]}}}"#,
        )
        .unwrap();

        let cache = TsconfigCache::new();
        let resolved = cache.get(dir.path());
        assert_eq!(resolved.resolve_alias("@app/widgets"), Some("src/widgets".to_string()));
        assert_eq!(resolved.resolve_alias("react"), None);
    }

    #[test]
    fn missing_tsconfig_resolves_to_empty_config() {
        let dir = TempDir::new().unwrap();
        let cache = TsconfigCache::new();
        let resolved = cache.get(dir.path());
        assert!(resolved.paths.is_empty());
    }

    #[test]
    fn clear_forces_reparse() {
        let dir = TempDir::new().unwrap();
        let cache = TsconfigCache::new();
        let _ = cache.get(dir.path());
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{"compilerOptions": {"paths": {"@x/*": ["y/*"]}}}"#,
        )
        .unwrap();
        cache.clear(dir.path());
        let resolved = cache.get(dir.path());
        assert_eq!(resolved.resolve_alias("@x/z"), Some("y/z".to_string()));
    }
}
