//! End-to-end update cycles against a mock distribution server.
//!
//! Each test gets its own install and home directories plus a wiremock
//! server serving `/api/version` and `/api/download`.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use update_agent::update::PackageFetcher;
use update_agent::{
    Config, CycleState, Scheduler, SchedulerExit, UpdateError, UpdateManifest, UpdateOrchestrator,
    UpdateOutcome,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

struct Harness {
    server: MockServer,
    install: TempDir,
    home: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let install = TempDir::new().unwrap();
        std::fs::write(install.path().join("app.txt"), b"v1").unwrap();
        std::fs::create_dir_all(install.path().join("lib")).unwrap();
        std::fs::write(install.path().join("lib/core.txt"), b"core v1").unwrap();

        Self {
            server: MockServer::start().await,
            install,
            home: TempDir::new().unwrap(),
        }
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.app.name = "app".into();
        config.app.current_version = "1.0.0".into();
        config.app.install_dir = Some(self.install.path().to_path_buf());
        config.app.home_dir = Some(self.home.path().to_path_buf());
        config.server.url = self.server.uri();
        config.server.timeout_secs = 2;
        config
    }

    fn orchestrator(&self) -> UpdateOrchestrator {
        UpdateOrchestrator::new(&self.config()).unwrap()
    }

    async fn serve_manifest(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    async fn serve_package(&self, bytes: Vec<u8>, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    fn backup_names(&self) -> Vec<String> {
        names_in(&self.home.path().join("backups"))
    }

    fn temp_names(&self) -> Vec<String> {
        names_in(&self.home.path().join("temp"))
    }

    fn install_tree(&self) -> BTreeMap<String, Vec<u8>> {
        tree(self.install.path())
    }
}

fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Relative path -> contents for every file under `root`.
fn tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

fn fixture_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, body) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn manifest(version: &str, package: &[u8]) -> serde_json::Value {
    json!({
        "version": version,
        "timestamp": "2024-05-01T12:00:00Z",
        "filename": "fixture.zip",
        "checksum": sha256_hex(package),
        "size": package.len(),
        "changelog": "Bug fixes"
    })
}

/// Flip one hex character.
fn corrupt(checksum: &str) -> String {
    let mut chars: Vec<char> = checksum.chars().collect();
    chars[0] = if chars[0] == '0' { '1' } else { '0' };
    chars.into_iter().collect()
}

#[tokio::test]
async fn test_newer_version_is_applied() {
    let harness = Harness::new().await;
    let package = fixture_zip(&[("app.txt", b"v2"), ("plugins/extra.txt", b"new")]);
    harness.serve_manifest(manifest("1.0.1", &package)).await;
    harness.serve_package(package, 1).await;

    let mut orchestrator = harness.orchestrator();
    let outcome = orchestrator.run_cycle().await;

    match outcome {
        UpdateOutcome::Applied(version) => assert_eq!(version.to_string(), "1.0.1"),
        other => panic!("expected Applied, got {other:?}"),
    }
    assert_eq!(orchestrator.last_state(), CycleState::CleaningUp);

    let tree = harness.install_tree();
    assert_eq!(tree["app.txt"], b"v2");
    assert_eq!(tree["plugins/extra.txt"], b"new");
    // Not in the package, so untouched
    assert_eq!(tree["lib/core.txt"], b"core v1");

    assert_eq!(harness.backup_names(), vec!["app_v1.0.0.zip"]);
    assert!(harness.temp_names().is_empty());
}

#[tokio::test]
async fn test_uppercase_checksum_is_accepted() {
    let harness = Harness::new().await;
    let package = fixture_zip(&[("app.txt", b"v2")]);
    let mut body = manifest("1.0.1", &package);
    body["checksum"] = json!(sha256_hex(&package).to_uppercase());
    harness.serve_manifest(body).await;
    harness.serve_package(package, 1).await;

    let outcome = harness.orchestrator().run_cycle().await;
    assert!(outcome.is_applied(), "{outcome:?}");
}

#[tokio::test]
async fn test_corrupted_checksum_leaves_install_untouched() {
    let harness = Harness::new().await;
    let before = harness.install_tree();
    let package = fixture_zip(&[("app.txt", b"v2")]);
    let mut body = manifest("1.0.1", &package);
    body["checksum"] = json!(corrupt(&sha256_hex(&package)));
    harness.serve_manifest(body).await;
    harness.serve_package(package, 1).await;

    let mut orchestrator = harness.orchestrator();
    let outcome = orchestrator.run_cycle().await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(UpdateError::Checksum { .. })),
        "{outcome:?}"
    );
    assert_eq!(orchestrator.last_state(), CycleState::Aborted);
    assert_eq!(harness.install_tree(), before);
    assert!(harness.backup_names().is_empty());
    assert!(harness.temp_names().is_empty());
}

#[tokio::test]
async fn test_failed_extraction_rolls_back() {
    let harness = Harness::new().await;
    // A plain file where the package expects a directory
    std::fs::write(harness.install.path().join("data"), b"plain file").unwrap();
    let before = harness.install_tree();

    let package = fixture_zip(&[("app.txt", b"v2"), ("data/inner.txt", b"nested")]);
    harness.serve_manifest(manifest("1.0.1", &package)).await;
    harness.serve_package(package, 1).await;

    let mut orchestrator = harness.orchestrator();
    let outcome = orchestrator.run_cycle().await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(UpdateError::Extraction(_))),
        "{outcome:?}"
    );
    assert_eq!(orchestrator.last_state(), CycleState::RolledBack);
    assert_eq!(harness.backup_names(), vec!["app_v1.0.0.zip"]);
    assert_eq!(harness.install_tree(), before);
    assert!(harness.temp_names().is_empty());
}

#[tokio::test]
async fn test_unrestorable_backup_is_fatal() {
    let harness = Harness::new().await;
    std::fs::write(harness.install.path().join("data"), b"plain file").unwrap();
    let mut config = harness.config();
    config.app.home_dir = Some(harness.install.path().join(".app"));

    // Clobbers the fresh backup, then fails on the file/dir clash
    let package = fixture_zip(&[
        (".app/backups/app_v1.0.0.zip", b"garbage"),
        ("data/inner.txt", b"nested"),
    ]);
    harness.serve_manifest(manifest("1.0.1", &package)).await;
    harness.serve_package(package, 1).await;

    let mut orchestrator = UpdateOrchestrator::new(&config).unwrap();
    let outcome = orchestrator.run_cycle().await;

    match &outcome {
        UpdateOutcome::Failed(UpdateError::RollbackFailed { cause, rollback }) => {
            assert!(matches!(**cause, UpdateError::Extraction(_)), "{cause:?}");
            assert!(matches!(**rollback, UpdateError::Extraction(_)), "{rollback:?}");
        }
        other => panic!("expected RollbackFailed, got {other:?}"),
    }
    assert_eq!(orchestrator.last_state(), CycleState::RollbackFailed);
    assert!(outcome.error().unwrap().is_fatal());
    assert!(names_in(&config.temp_dir()).is_empty());
}

#[tokio::test]
async fn test_backup_failure_aborts_before_install() {
    let harness = Harness::new().await;
    let mut config = harness.config();
    let missing = harness.install.path().join("missing");
    config.app.install_dir = Some(missing.clone());

    let package = fixture_zip(&[("app.txt", b"v2")]);
    harness.serve_manifest(manifest("1.0.1", &package)).await;
    harness.serve_package(package, 1).await;

    let mut orchestrator = UpdateOrchestrator::new(&config).unwrap();
    let outcome = orchestrator.run_cycle().await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(UpdateError::Backup(_))),
        "{outcome:?}"
    );
    assert!(!outcome.error().unwrap().is_fatal());
    assert_eq!(orchestrator.last_state(), CycleState::Aborted);
    assert!(!missing.exists());
    assert!(harness.backup_names().is_empty());
    assert!(harness.temp_names().is_empty());
}

#[tokio::test]
async fn test_same_version_performs_no_mutation() {
    let harness = Harness::new().await;
    let before = harness.install_tree();
    let package = fixture_zip(&[("app.txt", b"v2")]);
    harness.serve_manifest(manifest("1.0.0", &package)).await;
    harness.serve_package(package, 0).await;

    let mut orchestrator = harness.orchestrator();
    let outcome = orchestrator.run_cycle().await;

    assert!(matches!(outcome, UpdateOutcome::NoUpdateAvailable));
    assert_eq!(orchestrator.last_state(), CycleState::NoUpdate);
    assert_eq!(harness.install_tree(), before);
    assert!(harness.backup_names().is_empty());
    assert!(harness.temp_names().is_empty());
}

#[tokio::test]
async fn test_older_remote_version_is_ignored() {
    let harness = Harness::new().await;
    let package = fixture_zip(&[("app.txt", b"v0")]);
    harness.serve_manifest(manifest("0.9.9", &package)).await;
    harness.serve_package(package, 0).await;

    let outcome = harness.orchestrator().run_cycle().await;
    assert!(matches!(outcome, UpdateOutcome::NoUpdateAvailable));
}

#[tokio::test]
async fn test_prerelease_of_current_core_is_not_newer() {
    let harness = Harness::new().await;
    let package = fixture_zip(&[("app.txt", b"rc")]);
    harness.serve_manifest(manifest("1.0.0-rc.1", &package)).await;
    harness.serve_package(package, 0).await;

    let outcome = harness.orchestrator().run_cycle().await;
    assert!(matches!(outcome, UpdateOutcome::NoUpdateAvailable));
}

#[tokio::test]
async fn test_server_error_is_network_failure() {
    let harness = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&harness.server)
        .await;

    let outcome = harness.orchestrator().run_cycle().await;
    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::Network(_))));
}

#[tokio::test]
async fn test_slow_manifest_times_out() {
    let harness = Harness::new().await;
    let package = fixture_zip(&[("app.txt", b"v2")]);
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(manifest("1.0.1", &package))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&harness.server)
        .await;

    let mut config = harness.config();
    config.server.timeout_secs = 1;
    let outcome = UpdateOrchestrator::new(&config).unwrap().run_cycle().await;
    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::Network(_))));
}

#[tokio::test]
async fn test_malformed_manifest() {
    let harness = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&harness.server)
        .await;

    let outcome = harness.orchestrator().run_cycle().await;
    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::Manifest(_))));
}

#[tokio::test]
async fn test_manifest_without_checksum_is_rejected() {
    let harness = Harness::new().await;
    harness
        .serve_manifest(json!({"version": "1.0.1", "filename": "fixture.zip"}))
        .await;
    harness.serve_package(Vec::new(), 0).await;

    let outcome = harness.orchestrator().run_cycle().await;
    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::Manifest(_))));
}

#[tokio::test]
async fn test_invalid_remote_version() {
    let harness = Harness::new().await;
    harness
        .serve_manifest(json!({"version": "one.two", "checksum": "ab"}))
        .await;

    let outcome = harness.orchestrator().run_cycle().await;
    assert!(matches!(
        outcome,
        UpdateOutcome::Failed(UpdateError::VersionParse { .. })
    ));
}

#[tokio::test]
async fn test_missing_package_is_download_failure() {
    let harness = Harness::new().await;
    let package = fixture_zip(&[("app.txt", b"v2")]);
    harness.serve_manifest(manifest("1.0.1", &package)).await;
    Mock::given(method("GET"))
        .and(path("/api/download"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&harness.server)
        .await;

    let outcome = harness.orchestrator().run_cycle().await;
    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::Download(_))));
    assert!(harness.backup_names().is_empty());
    assert!(harness.temp_names().is_empty());
}

#[tokio::test]
async fn test_fetch_returns_verified_package() {
    let harness = Harness::new().await;
    let config = harness.config();
    let package = fixture_zip(&[("app.txt", b"v2")]);
    let manifest = UpdateManifest::from_json(&manifest("1.0.1", &package).to_string()).unwrap();
    let expected = sha256_hex(&package);
    harness.serve_package(package, 1).await;

    let fetcher = PackageFetcher::new(&config, reqwest::Client::new());
    let local = fetcher.fetch(&manifest).await.unwrap();

    assert_eq!(local.sha256(), expected);
    assert_eq!(local.path(), fetcher.package_path("1.0.1").as_path());
    assert!(local.path().is_file());
}

#[tokio::test]
async fn test_fetch_checksum_mismatch_leaves_no_file() {
    let harness = Harness::new().await;
    let config = harness.config();
    let package = fixture_zip(&[("app.txt", b"v2")]);
    let mut body = manifest("1.0.1", &package);
    body["checksum"] = json!(corrupt(&sha256_hex(&package)));
    harness.serve_package(package, 1).await;

    let manifest = UpdateManifest::from_json(&body.to_string()).unwrap();
    let fetcher = PackageFetcher::new(&config, reqwest::Client::new());
    let result = fetcher.fetch(&manifest).await;

    assert!(
        matches!(result, Err(UpdateError::Checksum { .. })),
        "{result:?}"
    );
    assert!(!fetcher.package_path("1.0.1").exists());
}

#[tokio::test]
async fn test_retention_after_repeated_updates() {
    let harness = Harness::new().await;
    let mut config = harness.config();
    config.update.max_backup_count = 2;

    // Seed older backups with old timestamps
    let backups = harness.home.path().join("backups");
    std::fs::create_dir_all(&backups).unwrap();
    for (i, version) in ["0.9.0", "0.9.1", "0.9.2"].iter().enumerate() {
        let path = backups.join(format!("app_v{version}.zip"));
        std::fs::write(&path, b"old").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(std::time::UNIX_EPOCH + Duration::from_secs(1_000 + i as u64))
            .unwrap();
    }

    let package = fixture_zip(&[("app.txt", b"v2")]);
    harness.serve_manifest(manifest("1.0.1", &package)).await;
    harness.serve_package(package, 1).await;

    let outcome = UpdateOrchestrator::new(&config).unwrap().run_cycle().await;
    assert!(outcome.is_applied());
    assert_eq!(harness.backup_names(), vec!["app_v0.9.2.zip", "app_v1.0.0.zip"]);
}

#[tokio::test]
async fn test_scheduler_invokes_restart_hook() {
    let harness = Harness::new().await;
    let package = fixture_zip(&[("app.txt", b"v2")]);
    harness.serve_manifest(manifest("1.0.1", &package)).await;
    harness.serve_package(package, 1).await;

    let restarted = Arc::new(AtomicBool::new(false));
    let hook = {
        let restarted = restarted.clone();
        move || restarted.store(true, Ordering::SeqCst)
    };

    let handle = Scheduler::new(harness.orchestrator(), Duration::from_secs(3600))
        .start(hook, CancellationToken::new());
    let exit = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit, SchedulerExit::RestartRequested(semver::Version::new(1, 0, 1)));
    assert!(restarted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_scheduler_retries_after_failure() {
    let harness = Harness::new().await;
    let package = fixture_zip(&[("app.txt", b"v2")]);

    // First check fails, later ones succeed
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&harness.server)
        .await;
    harness.serve_manifest(manifest("1.0.1", &package)).await;
    harness.serve_package(package, 1).await;

    let handle = Scheduler::new(harness.orchestrator(), Duration::from_millis(50))
        .start(|| {}, CancellationToken::new());
    let exit = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(exit, SchedulerExit::RestartRequested(_)));
    assert_eq!(harness.install_tree()["app.txt"], b"v2");
}

#[tokio::test]
async fn test_scheduler_stops_on_cancel() {
    let harness = Harness::new().await;
    let package = fixture_zip(&[("app.txt", b"v1")]);
    harness.serve_manifest(manifest("1.0.0", &package)).await;

    let cancel = CancellationToken::new();
    let handle = Scheduler::new(harness.orchestrator(), Duration::from_millis(20))
        .start(|| panic!("no update expected"), cancel.clone());

    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.cancel();

    let exit = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit, SchedulerExit::Cancelled);
}
