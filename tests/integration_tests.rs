//! Integration tests for the teamboard CLI.
//!
//! Boards are seeded through the library, then inspected and repaired
//! through the binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use teamboard::board::db::BoardDb;
use teamboard::board::permissions::AllowAll;
use teamboard::board::reorder::Reorderer;

/// Helper to create a teamboard Command running inside `dir`
fn teamboard(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("teamboard");
    cmd.current_dir(dir.path())
        .env_remove("TEAMBOARD_DB")
        .env_remove("TEAMBOARD_PORT")
        .env_remove("TEAMBOARD_PERMISSIONS")
        .env_remove("TEAMBOARD_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("board.db")
}

/// Seed a project with one column holding `titles` in order.
/// Returns `(project_id, column_id)`.
fn seed_board(path: &Path, titles: &[&str]) -> (i64, i64) {
    let db = BoardDb::new(path).unwrap();
    let reorderer = Reorderer::new(Arc::new(AllowAll));
    let project = db.create_project("Roadmap", "alice").unwrap();
    let column = reorderer
        .append_column(&db, "alice", project.id, "Todo")
        .unwrap();
    for title in titles {
        reorderer
            .append(&db, "alice", column.id, title, "")
            .unwrap();
    }
    (project.id, column.id)
}

/// Leave a gap at position 1 by writing around the store.
fn damage_column(path: &Path, column_id: i64) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute(
        "UPDATE cards SET position = position + 1 WHERE column_id = ?1 AND position >= 1",
        [column_id],
    )
    .unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_teamboard_help() {
        let dir = create_temp_dir();
        teamboard(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("reindex"));
    }

    #[test]
    fn test_teamboard_version() {
        let dir = create_temp_dir();
        teamboard(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_default_database() {
        let dir = create_temp_dir();

        teamboard(&dir)
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Board database initialized"));

        assert!(dir.path().join(".teamboard/board.db").exists());
    }

    #[test]
    fn test_init_respects_db_path_flag() {
        let dir = create_temp_dir();

        teamboard(&dir)
            .args(["--db-path", "data/custom.db", "init"])
            .assert()
            .success();

        assert!(dir.path().join("data/custom.db").exists());
        assert!(!dir.path().join(".teamboard/board.db").exists());
    }

    #[test]
    fn test_unknown_command_fails() {
        let dir = create_temp_dir();
        teamboard(&dir).arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_init_writes_file() {
        let dir = create_temp_dir();

        teamboard(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created teamboard.toml"));

        let content = fs::read_to_string(dir.path().join(".teamboard/teamboard.toml")).unwrap();
        assert!(content.contains("[server]"));
        assert!(content.contains("mode = \"members\""));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = create_temp_dir();
        fs::create_dir_all(dir.path().join(".teamboard")).unwrap();
        fs::write(
            dir.path().join(".teamboard/teamboard.toml"),
            "[server]\nport = 9000\n",
        )
        .unwrap();

        teamboard(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join(".teamboard/teamboard.toml")).unwrap();
        assert!(content.contains("port = 9000"));
    }

    #[test]
    fn test_config_show_reports_file_values() {
        let dir = create_temp_dir();
        fs::create_dir_all(dir.path().join(".teamboard")).unwrap();
        fs::write(
            dir.path().join(".teamboard/teamboard.toml"),
            "[server]\nport = 9000\n",
        )
        .unwrap();

        teamboard(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 9000"));
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = create_temp_dir();
        fs::create_dir_all(dir.path().join(".teamboard")).unwrap();
        fs::write(
            dir.path().join(".teamboard/teamboard.toml"),
            "[server]\nport = 9000\n",
        )
        .unwrap();

        teamboard(&dir)
            .env("TEAMBOARD_PORT", "9100")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 9100"));
    }

    #[test]
    fn test_config_validate_defaults() {
        let dir = create_temp_dir();

        teamboard(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_validate_reports_bad_mode() {
        let dir = create_temp_dir();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[permissions]\nmode = \"anarchy\"\n").unwrap();

        teamboard(&dir)
            .arg("--config")
            .arg(&path)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Invalid permission mode 'anarchy'"));
    }

    #[test]
    fn test_malformed_config_fails() {
        let dir = create_temp_dir();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[server\nport = ").unwrap();

        teamboard(&dir)
            .arg("--config")
            .arg(&path)
            .arg("init")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse teamboard.toml"));
    }
}

// =============================================================================
// Board inspection and repair
// =============================================================================

mod board_commands {
    use super::*;

    #[test]
    fn test_board_prints_cards_in_order() {
        let dir = create_temp_dir();
        let db = db_path(&dir);
        let (project_id, _) = seed_board(&db, &["Write docs", "Ship", "Celebrate"]);

        let output = teamboard(&dir)
            .arg("--db-path")
            .arg(&db)
            .args(["board", &project_id.to_string()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Project"))
            .stdout(predicate::str::contains("Todo (3 cards)"))
            .get_output()
            .stdout
            .clone();

        let stdout = String::from_utf8(output).unwrap();
        let docs = stdout.find("Write docs").unwrap();
        let ship = stdout.find("Ship").unwrap();
        let party = stdout.find("Celebrate").unwrap();
        assert!(docs < ship && ship < party);
    }

    #[test]
    fn test_board_missing_project_fails() {
        let dir = create_temp_dir();
        let db = db_path(&dir);

        teamboard(&dir)
            .arg("--db-path")
            .arg(&db)
            .args(["board", "42"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("42"));
    }

    #[test]
    fn test_check_empty_database_succeeds() {
        let dir = create_temp_dir();
        let db = db_path(&dir);

        teamboard(&dir)
            .arg("--db-path")
            .arg(&db)
            .arg("check")
            .assert()
            .success()
            .stdout(predicate::str::contains("All 0 columns are contiguous"));
    }

    #[test]
    fn test_check_healthy_board_succeeds() {
        let dir = create_temp_dir();
        let db = db_path(&dir);
        let (project_id, _) = seed_board(&db, &["a", "b", "c"]);

        teamboard(&dir)
            .arg("--db-path")
            .arg(&db)
            .args(["check", &project_id.to_string()])
            .assert()
            .success()
            .stdout(predicate::str::contains("All 1 columns are contiguous"));
    }

    #[test]
    fn test_check_detects_gap() {
        let dir = create_temp_dir();
        let db = db_path(&dir);
        let (_, column_id) = seed_board(&db, &["a", "b", "c"]);
        damage_column(&db, column_id);

        teamboard(&dir)
            .arg("--db-path")
            .arg(&db)
            .arg("check")
            .assert()
            .failure()
            .stdout(predicate::str::contains(format!("column {}", column_id)))
            .stdout(predicate::str::contains("missing [1]"))
            .stderr(predicate::str::contains("non-contiguous"));
    }

    #[test]
    fn test_reindex_repairs_gap() {
        let dir = create_temp_dir();
        let db = db_path(&dir);
        let (_, column_id) = seed_board(&db, &["a", "b", "c"]);
        damage_column(&db, column_id);

        teamboard(&dir)
            .arg("--db-path")
            .arg(&db)
            .args(["reindex", &column_id.to_string()])
            .assert()
            .success()
            .stdout(predicate::str::contains("2 cards moved"));

        teamboard(&dir)
            .arg("--db-path")
            .arg(&db)
            .arg("check")
            .assert()
            .success();

        let store = BoardDb::new(&db).unwrap();
        let titles: Vec<String> = store
            .list_cards(column_id)
            .unwrap()
            .into_iter()
            .map(|card| card.title)
            .collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reindex_contiguous_column_is_noop() {
        let dir = create_temp_dir();
        let db = db_path(&dir);
        let (_, column_id) = seed_board(&db, &["a", "b"]);

        teamboard(&dir)
            .arg("--db-path")
            .arg(&db)
            .args(["reindex", &column_id.to_string()])
            .assert()
            .success()
            .stdout(predicate::str::contains("already contiguous"));
    }

    #[test]
    fn test_reindex_missing_column_fails() {
        let dir = create_temp_dir();
        let db = db_path(&dir);

        teamboard(&dir)
            .arg("--db-path")
            .arg(&db)
            .args(["reindex", "7"])
            .assert()
            .failure();
    }
}
