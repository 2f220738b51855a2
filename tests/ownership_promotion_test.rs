//! S4: a reader promotes to owner once the current owner's heartbeat goes
//! stale, without the owner ever releasing its lease.

use codetrace::{Role, Session, Settings};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn owner_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.project_root = dir.path().to_path_buf();
    settings.indexing.watch_mode = true;
    // Large enough that the owner's heartbeat never refreshes during the
    // test, so it goes stale from the reader's point of view.
    settings.ownership.heartbeat_interval_ms = 3_600_000;
    settings
}

fn reader_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.project_root = dir.path().to_path_buf();
    settings.indexing.watch_mode = true;
    // Large enough that opening right after the owner still sees a fresh
    // heartbeat (this same threshold gates the initial `try_acquire` too),
    // small enough that the background healthcheck loop promotes well
    // within this test's sleep window.
    settings.ownership.staleness_threshold_ms = 1_500;
    settings.ownership.healthcheck_interval_ms = 100;
    settings
}

#[tokio::test]
async fn reader_promotes_once_the_owners_heartbeat_goes_stale() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), r#"{"name":"p"}"#).unwrap();
    fs::write(dir.path().join("a.ts"), "export const x = 1;\n").unwrap();

    let owner = Session::open(owner_settings(&dir)).await.unwrap();
    assert_eq!(owner.role(), Role::Owner);

    let reader = Session::open(reader_settings(&dir)).await.unwrap();
    assert_eq!(reader.role(), Role::Reader);
    assert!(reader.reindex().await.is_err());

    // Several healthcheck_interval_ms cycles past the staleness threshold,
    // generous headroom for the promotion sequence (fresh coordinator,
    // watcher, heartbeat, initial full index) to finish.
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    assert_eq!(reader.role(), Role::Owner);
    reader.reindex().await.unwrap();

    owner.close().await.unwrap();
    reader.close().await.unwrap();
}
