use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cardsync_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cardsync");
    path
}

/// Config for one device. `handle_store` lets two devices share the
/// remembered folder.
fn write_config(root: &Path, device: &str, handle_store: &Path) -> PathBuf {
    let config_dir = root.join(device).join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/{}/data/cards.sqlite"

[user]
id = "owner-1"

[sync]
debounce_ms = 100
handle_store = "{}"
"#,
        root.display(),
        device,
        handle_store.display()
    );

    let config_path = config_dir.join("cardsync.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let folder = root.join("Backups");
    fs::create_dir_all(&folder).unwrap();

    let config_path = write_config(&root, "a", &root.join("a").join("handle.json"));
    (tmp, config_path, folder)
}

fn run_cardsync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cardsync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cardsync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Run a command that prints a new id and return it.
fn create(config_path: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_cardsync(config_path, args);
    assert!(success, "{:?} failed: stdout={}, stderr={}", args, stdout, stderr);
    stdout.trim().to_string()
}

fn read_backup(folder: &Path) -> serde_json::Value {
    let text = fs::read_to_string(folder.join("my-card-manager-backup.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path, _) = setup_test_env();

    let (stdout, stderr, success) = run_cardsync(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path, _) = setup_test_env();

    let (_, _, success1) = run_cardsync(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_cardsync(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_profile_and_card_listing() {
    let (_tmp, config_path, _) = setup_test_env();
    run_cardsync(&config_path, &["init"]);

    let profile = create(&config_path, &["profile", "add", "Acme Corp", "--position", "Engineer"]);
    create(
        &config_path,
        &["card", "add", "--profile", &profile, "--name", "Taro Yamada", "--company", "Initech"],
    );

    let (stdout, _, success) = run_cardsync(&config_path, &["profile", "list"]);
    assert!(success);
    assert!(stdout.contains("Acme Corp / Engineer"));

    let (stdout, _, success) = run_cardsync(&config_path, &["card", "list"]);
    assert!(success);
    assert!(stdout.contains("Taro Yamada"));
    assert!(stdout.contains("***"));
}

#[test]
fn test_invalid_priority_rejected() {
    let (_tmp, config_path, _) = setup_test_env();
    run_cardsync(&config_path, &["init"]);
    let profile = create(&config_path, &["profile", "add", "Acme"]);

    let (_, stderr, success) = run_cardsync(
        &config_path,
        &["card", "add", "--profile", &profile, "--name", "X", "--company", "Y", "--priority", "9"],
    );
    assert!(!success);
    assert!(stderr.contains("priority"));
}

#[test]
fn test_sync_enable_writes_backup() {
    let (_tmp, config_path, folder) = setup_test_env();
    run_cardsync(&config_path, &["init"]);
    create(&config_path, &["profile", "add", "Acme"]);

    let (stdout, stderr, success) =
        run_cardsync(&config_path, &["sync", "enable", folder.to_str().unwrap()]);
    assert!(success, "enable failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Sync enabled: Backups"));

    let doc = read_backup(&folder);
    assert_eq!(doc["version"], 1);
    assert_eq!(doc["user"]["id"], "owner-1");
    assert_eq!(doc["profiles"].as_array().unwrap().len(), 1);
    assert!(doc["exportedAt"].as_str().unwrap().ends_with('Z'));

    let (stdout, _, _) = run_cardsync(&config_path, &["sync", "status"]);
    assert!(stdout.contains("Backups"));
    assert!(stdout.contains("idle"));
}

#[test]
fn test_mutation_updates_backup_before_exit() {
    let (_tmp, config_path, folder) = setup_test_env();
    run_cardsync(&config_path, &["init"]);
    let profile = create(&config_path, &["profile", "add", "Acme"]);
    run_cardsync(&config_path, &["sync", "enable", folder.to_str().unwrap()]);

    let card = create(
        &config_path,
        &["card", "add", "--profile", &profile, "--name", "Taro", "--company", "Initech"],
    );
    let image = folder.parent().unwrap().join("front.jpg");
    fs::write(&image, [0xFFu8, 0xD8, 0xFF, 0xE0]).unwrap();
    create(&config_path, &["image", "add", &card, image.to_str().unwrap()]);

    let doc = read_backup(&folder);
    assert_eq!(doc["cards"][0]["personName"], "Taro");
    let data = doc["images"][0]["imageData"].as_str().unwrap();
    assert!(data.starts_with("data:image/jpeg;base64,"), "got {}", data);
}

#[test]
fn test_disable_stops_backups() {
    let (_tmp, config_path, folder) = setup_test_env();
    run_cardsync(&config_path, &["init"]);
    let profile = create(&config_path, &["profile", "add", "Acme"]);
    run_cardsync(&config_path, &["sync", "enable", folder.to_str().unwrap()]);

    let (_, _, success) = run_cardsync(&config_path, &["sync", "disable"]);
    assert!(success);
    let before = fs::read_to_string(folder.join("my-card-manager-backup.json")).unwrap();

    create(
        &config_path,
        &["card", "add", "--profile", &profile, "--name", "Taro", "--company", "Initech"],
    );
    let after = fs::read_to_string(folder.join("my-card-manager-backup.json")).unwrap();
    assert_eq!(before, after);

    let (_, stderr, success) = run_cardsync(&config_path, &["sync", "now"]);
    assert!(!success);
    assert!(stderr.contains("not enabled"));
}

#[test]
fn test_second_device_restores_only_when_confirmed() {
    let (tmp, config_a, folder) = setup_test_env();
    run_cardsync(&config_a, &["init"]);
    let profile = create(&config_a, &["profile", "add", "Acme"]);
    create(
        &config_a,
        &["card", "add", "--profile", &profile, "--name", "Taro", "--company", "Initech"],
    );
    run_cardsync(&config_a, &["sync", "enable", folder.to_str().unwrap()]);

    // Device B remembers the same folder but has never synced.
    let config_b = write_config(tmp.path(), "b", &tmp.path().join("a").join("handle.json"));
    run_cardsync(&config_b, &["init"]);

    let (stdout, stderr, success) = run_cardsync(&config_b, &["sync", "reconcile", "--no"]);
    assert!(success, "reconcile failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("not restored"));
    let (stdout, _, _) = run_cardsync(&config_b, &["card", "list"]);
    assert!(!stdout.contains("Taro"));

    let (stdout, _, success) = run_cardsync(&config_b, &["sync", "reconcile", "--yes"]);
    assert!(success);
    assert!(stdout.contains("Restored backup"));
    let (stdout, _, _) = run_cardsync(&config_b, &["card", "list"]);
    assert!(stdout.contains("Taro"));

    let (stdout, _, _) = run_cardsync(&config_b, &["sync", "reconcile", "--yes"]);
    assert!(stdout.contains("up to date"));
}

#[test]
fn test_reconcile_seeds_empty_folder() {
    let (tmp, _, folder) = setup_test_env();
    let handle_store = tmp.path().join("shared-handle.json");
    fs::write(
        &handle_store,
        format!(
            r#"{{"handle": {{"path": "{}", "label": "Backups"}}, "saved_at": "2026-01-01T00:00:00Z"}}"#,
            folder.display()
        ),
    )
    .unwrap();
    let config = write_config(tmp.path(), "c", &handle_store);
    run_cardsync(&config, &["init"]);

    let (stdout, stderr, success) = run_cardsync(&config, &["sync", "reconcile"]);
    assert!(success, "reconcile failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("wrote the first one"));

    let doc = read_backup(&folder);
    assert_eq!(doc["version"], 1);
    assert_eq!(doc["cards"].as_array().unwrap().len(), 0);
    assert_eq!(doc["interactionNotes"].as_array().unwrap().len(), 0);
}

#[test]
fn test_export_import_round_trip() {
    let (tmp, config_a, _) = setup_test_env();
    run_cardsync(&config_a, &["init"]);
    let profile = create(&config_a, &["profile", "add", "Acme"]);
    let card = create(
        &config_a,
        &["card", "add", "--profile", &profile, "--name", "Taro", "--company", "Initech"],
    );
    let tag = create(&config_a, &["tag", "add", "partner", "--color", "#ff0000"]);
    run_cardsync(&config_a, &["tag", "link", &card, &tag]);
    create(&config_a, &["note", "add", &card, "Lunch meeting", "--type", "meeting"]);

    let export_file = tmp.path().join("export.json");
    let (_, stderr, success) = run_cardsync(
        &config_a,
        &["export", "--output", export_file.to_str().unwrap()],
    );
    assert!(success, "export failed: {}", stderr);

    let config_b = write_config(tmp.path(), "b", &tmp.path().join("b").join("handle.json"));
    run_cardsync(&config_b, &["init"]);
    let (stdout, stderr, success) = run_cardsync(
        &config_b,
        &["import", export_file.to_str().unwrap(), "--yes"],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1 cards"));
    assert!(stdout.contains("1 tag links"));

    let (stdout, _, _) = run_cardsync(&config_b, &["note", "list", &card]);
    assert!(stdout.contains("Lunch meeting"));
    assert!(stdout.contains("meeting"));
}

#[test]
fn test_import_rejects_foreign_json() {
    let (tmp, config_path, _) = setup_test_env();
    run_cardsync(&config_path, &["init"]);
    let file = tmp.path().join("other.json");
    fs::write(&file, r#"{"documents": []}"#).unwrap();

    let (_, stderr, success) =
        run_cardsync(&config_path, &["import", file.to_str().unwrap(), "--yes"]);
    assert!(!success);
    assert!(stderr.contains("invalid backup document"));
}

#[test]
fn test_stats() {
    let (_tmp, config_path, _) = setup_test_env();
    run_cardsync(&config_path, &["init"]);
    create(&config_path, &["profile", "add", "Acme"]);

    let (stdout, _, success) = run_cardsync(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Profiles:    1"));
    assert!(stdout.contains("(disabled)"));
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(
        &config_path,
        "[db]\npath = \"x.sqlite\"\n\n[user]\nid = \"u\"\n\n[sync]\ndebounce_ms = 0\n",
    )
    .unwrap();

    let (_, stderr, success) = run_cardsync(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("debounce_ms"));
}
