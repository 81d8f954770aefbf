//! Offline board commands: `teamboard board`, `check` and `reindex`.
//!
//! These open the database directly and do not need a running server.

use anyhow::{Result, bail};

use teamboard::board::reorder::Reorderer;
use teamboard::board::server;
use teamboard::config::BoardConfig;

pub fn cmd_board(config: &BoardConfig, project_id: i64) -> Result<()> {
    let db = server::open_database(&config.database.path)?;
    let board = db.get_board(project_id)?;

    println!("Project {}: {}", board.project.id, board.project.name);
    if board.columns.is_empty() {
        println!("  (no columns)");
    }
    for view in &board.columns {
        println!(
            "  [{}] {} ({} cards)",
            view.column.id,
            view.column.name,
            view.cards.len()
        );
        for card in &view.cards {
            println!("    {:>3}  #{:<5} {}", card.position, card.id, card.title);
        }
    }
    Ok(())
}

pub fn cmd_check(config: &BoardConfig, project_id: Option<i64>) -> Result<()> {
    let db = server::open_database(&config.database.path)?;
    let reorderer = Reorderer::new(config.permission_mode()?.checker());

    let column_ids = db.column_ids(project_id)?;
    let mut damaged = 0usize;
    for column_id in &column_ids {
        let report = reorderer.check_column(&db, *column_id)?;
        if report.is_contiguous() {
            continue;
        }
        damaged += 1;
        println!(
            "column {}: {} cards, missing {:?}, duplicates {:?}, out of range {:?}",
            report.scope_id, report.count, report.missing, report.duplicates, report.out_of_range
        );
    }

    if damaged > 0 {
        bail!(
            "{} of {} columns have non-contiguous positions (run `teamboard reindex <column>`)",
            damaged,
            column_ids.len()
        );
    }
    println!("All {} columns are contiguous", column_ids.len());
    Ok(())
}

pub fn cmd_reindex(config: &BoardConfig, column_id: i64) -> Result<()> {
    let db = server::open_database(&config.database.path)?;
    let reorderer = Reorderer::new(config.permission_mode()?.checker());

    let written = reorderer.reindex_column(&db, column_id)?;
    if written == 0 {
        println!("Column {} is already contiguous", column_id);
    } else {
        println!("Reindexed column {} ({} cards moved)", column_id, written);
    }
    Ok(())
}
