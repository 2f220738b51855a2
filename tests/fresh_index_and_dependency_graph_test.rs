//! S1: a fresh two-file tree indexes cleanly and its dependency graph is
//! queryable in both directions with no cycle.

use codetrace::{Role, Session, Settings};
use std::fs;
use tempfile::TempDir;

fn settings_for(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.project_root = dir.path().to_path_buf();
    settings.indexing.watch_mode = false;
    settings
}

#[tokio::test]
async fn fresh_tree_indexes_and_resolves_both_directions() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), r#"{"name":"p"}"#).unwrap();
    fs::write(dir.path().join("a.ts"), "export const x = 1;\n").unwrap();
    fs::write(dir.path().join("b.ts"), "import { x } from './a.ts';\nconsole.log(x);\n").unwrap();

    let session = Session::open(settings_for(&dir)).await.unwrap();
    assert_eq!(session.role(), Role::Owner);

    assert_eq!(session.get_dependencies(None, "b.ts").unwrap(), vec!["a.ts".to_string()]);
    assert_eq!(session.get_dependents(None, "a.ts").unwrap(), vec!["b.ts".to_string()]);
    assert!(!session.has_cycle(None).unwrap());

    let x = session.find_symbol(None, "x").unwrap();
    assert!(x.is_some());

    session.close().await.unwrap();
}
