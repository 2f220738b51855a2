//! S2: editing a file to introduce a circular import is picked up on the
//! next index and reported through both `has_cycle` and `get_cycle_paths`.

use codetrace::{Session, Settings};
use std::fs;
use tempfile::TempDir;

fn settings_for(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.project_root = dir.path().to_path_buf();
    settings.indexing.watch_mode = false;
    settings
}

#[tokio::test]
async fn editing_a_file_into_a_cycle_is_detected_after_reindex() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), r#"{"name":"p"}"#).unwrap();
    fs::write(dir.path().join("a.ts"), "export const x = 1;\n").unwrap();
    fs::write(dir.path().join("b.ts"), "import { x } from './a.ts';\nconsole.log(x);\n").unwrap();

    let session = Session::open(settings_for(&dir)).await.unwrap();
    assert!(!session.has_cycle(None).unwrap());

    fs::write(dir.path().join("a.ts"), "import './b.ts';\nexport const x = 1;\n").unwrap();
    session.reindex().await.unwrap();

    assert!(session.has_cycle(None).unwrap());
    let cycles = session.get_cycle_paths(None, None).unwrap();
    assert!(cycles.iter().any(|path| {
        let mut sorted = path.clone();
        sorted.sort();
        sorted == vec!["a.ts".to_string(), "b.ts".to_string()]
    }));

    session.close().await.unwrap();
}
