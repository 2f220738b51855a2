//! Discovers project boundaries: directories rooted at a `package.json`
//! (or `tsconfig.json` when no manifest is present), each becoming one
//! `ProjectBoundary` row.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::IndexResult;
use crate::model::ProjectBoundary;

const MANIFEST_NAMES: &[&str] = &["package.json", "tsconfig.json"];

#[derive(Deserialize)]
struct PackageManifest {
    name: Option<String>,
}

/// Walks `workspace_root` looking for manifest files, stopping descent at
/// the first manifest found along each branch (nested manifests define
/// nested projects, not sub-boundaries of their parent).
pub fn discover(workspace_root: &Path) -> IndexResult<Vec<ProjectBoundary>> {
    let mut boundaries = Vec::new();
    discover_into(workspace_root, workspace_root, &mut boundaries)?;
    if boundaries.is_empty() {
        boundaries.push(root_boundary(workspace_root));
    }
    Ok(boundaries)
}

fn discover_into(
    workspace_root: &Path,
    dir: &Path,
    out: &mut Vec<ProjectBoundary>,
) -> IndexResult<()> {
    if dir.file_name().is_some_and(|n| n == "node_modules") {
        return Ok(());
    }

    if let Some(manifest_path) = MANIFEST_NAMES.iter().map(|n| dir.join(n)).find(|p| p.exists()) {
        out.push(boundary_from_manifest(workspace_root, dir, &manifest_path));
        return Ok(());
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            discover_into(workspace_root, &entry.path(), out)?;
        }
    }
    Ok(())
}

fn boundary_from_manifest(workspace_root: &Path, dir: &Path, manifest_path: &Path) -> ProjectBoundary {
    let name = std::fs::read_to_string(manifest_path)
        .ok()
        .and_then(|contents| serde_json::from_str::<PackageManifest>(&contents).ok())
        .and_then(|manifest| manifest.name)
        .unwrap_or_else(|| basename(dir));

    ProjectBoundary {
        name,
        directory: relative_or_dot(workspace_root, dir),
    }
}

fn root_boundary(workspace_root: &Path) -> ProjectBoundary {
    ProjectBoundary {
        name: basename(workspace_root),
        directory: ".".into(),
    }
}

fn basename(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".into())
}

fn relative_or_dot(workspace_root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(workspace_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().replace('\\', "/"),
        _ => ".".into(),
    }
}

pub fn directory_for(workspace_root: &Path, boundary: &ProjectBoundary) -> PathBuf {
    workspace_root.join(&boundary.directory)
}

/// Resolves which boundary owns `directory`, by longest-directory-prefix
/// match, breaking ties by declaration order (the order `discover` returned
/// them in). Two boundaries can only tie when one's directory is a prefix
/// of another's sibling at the same depth, which doesn't occur from a
/// single depth-first `discover` walk, but the order is fixed regardless.
pub fn owning_boundary<'a>(boundaries: &'a [ProjectBoundary], directory: &str) -> Option<&'a ProjectBoundary> {
    boundaries
        .iter()
        .filter(|b| directory == b.directory || directory.starts_with(&format!("{}/", b.directory)) || b.directory == ".")
        .max_by_key(|b| if b.directory == "." { 0 } else { b.directory.len() + 1 })
}

/// Resolves a workspace-root-relative path to the `(project, rel_path)`
/// pair the rest of the index operates on, where `rel_path` is relative to
/// the owning boundary's directory.
pub fn resolve_workspace_path<'a>(
    boundaries: &'a [ProjectBoundary],
    workspace_rel_path: &str,
) -> Option<(&'a str, String)> {
    let dir_part = Path::new(workspace_rel_path)
        .parent()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();

    let boundary = owning_boundary(boundaries, &dir_part)?;
    let rel_path = if boundary.directory == "." {
        workspace_rel_path.to_string()
    } else {
        workspace_rel_path
            .strip_prefix(&format!("{}/", boundary.directory))
            .unwrap_or(workspace_rel_path)
            .to_string()
    };
    Some((boundary.name.as_str(), rel_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn discovers_named_package_at_root() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name": "my-app"}"#).unwrap();

        let boundaries = discover(dir.path()).unwrap();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].name, "my-app");
        assert_eq!(boundaries[0].directory, ".");
    }

    #[test]
    fn discovers_nested_packages_without_descending_past_them() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("packages/one")).unwrap();
        fs::write(dir.path().join("packages/one/package.json"), r#"{"name": "one"}"#).unwrap();

        let boundaries = discover(dir.path()).unwrap();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].name, "one");
        assert_eq!(boundaries[0].directory, "packages/one");
    }

    #[test]
    fn falls_back_to_directory_name_with_no_manifest() {
        let dir = TempDir::new().unwrap();
        let boundaries = discover(dir.path()).unwrap();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].directory, ".");
    }

    #[test]
    fn resolve_workspace_path_picks_longest_prefix() {
        let boundaries = vec![
            ProjectBoundary { name: "root".into(), directory: ".".into() },
            ProjectBoundary { name: "pkg-one".into(), directory: "packages/one".into() },
        ];

        let (project, rel) = resolve_workspace_path(&boundaries, "packages/one/src/a.ts").unwrap();
        assert_eq!(project, "pkg-one");
        assert_eq!(rel, "src/a.ts");

        let (project, rel) = resolve_workspace_path(&boundaries, "top.ts").unwrap();
        assert_eq!(project, "root");
        assert_eq!(rel, "top.ts");
    }
}
