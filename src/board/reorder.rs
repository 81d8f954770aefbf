//! Dense per-column ordering of cards (and per-project ordering of columns).
//!
//! Every position change in the board goes through this module. An
//! operation is split in two halves:
//!
//! 1. A pure **plan** (`MovePlan`): the shift-range updates that open or
//!    close a gap, plus the final placement of the moved item. Plans are
//!    computed from counts and positions only, so the optimistic client
//!    cache applies exactly the same plan to its local copy.
//! 2. The **application** of that plan by [`Reorderer`], inside a single
//!    `BEGIN IMMEDIATE` transaction, after the permission check.
//!
//! Invariant: the live positions of every column are exactly
//! `0..count`, with no gaps and no duplicates.

use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::db::{self, BoardDb, Sequence};
use super::models::{Card, Column};
use super::permissions::PermissionChecker;
use crate::errors::BoardError;

// ── Plans ─────────────────────────────────────────────────────────────

/// `position += delta` for every live item of `scope_id` whose position
/// lies in `start..=end` (`end = None` means unbounded), except `exclude`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftRange {
    pub scope_id: i64,
    pub start: i32,
    pub end: Option<i32>,
    pub delta: i32,
    pub exclude: Option<i64>,
}

impl ShiftRange {
    pub fn covers(&self, scope_id: i64, item_id: i64, position: i32) -> bool {
        scope_id == self.scope_id
            && position >= self.start
            && self.end.is_none_or(|end| position <= end)
            && self.exclude != Some(item_id)
    }
}

/// Final resting place of the moved item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub item_id: i64,
    pub scope_id: i64,
    pub position: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePlan {
    pub shifts: Vec<ShiftRange>,
    pub placement: Option<Placement>,
}

impl MovePlan {
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.shifts.is_empty() && self.placement.is_none()
    }

    /// Apply the plan to an in-memory collection.
    pub fn apply<T: Positioned>(&self, items: &mut [T]) {
        for shift in &self.shifts {
            for item in items.iter_mut() {
                if item.is_live() && shift.covers(item.scope_id(), item.item_id(), item.position())
                {
                    let (scope, position) = (item.scope_id(), item.position() + shift.delta);
                    item.place(scope, position);
                }
            }
        }
        if let Some(p) = &self.placement
            && let Some(item) = items.iter_mut().find(|i| i.item_id() == p.item_id)
        {
            item.place(p.scope_id, p.position);
        }
    }
}

/// Something that lives at a position inside a scope.
pub trait Positioned {
    fn item_id(&self) -> i64;
    fn scope_id(&self) -> i64;
    fn position(&self) -> i32;
    fn place(&mut self, scope_id: i64, position: i32);

    fn is_live(&self) -> bool {
        true
    }
}

impl Positioned for Card {
    fn item_id(&self) -> i64 {
        self.id
    }

    fn scope_id(&self) -> i64 {
        self.column_id
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn place(&mut self, scope_id: i64, position: i32) {
        self.column_id = scope_id;
        self.position = position;
    }

    fn is_live(&self) -> bool {
        !self.archived
    }
}

impl Positioned for Column {
    fn item_id(&self) -> i64 {
        self.id
    }

    fn scope_id(&self) -> i64 {
        self.project_id
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn place(&mut self, scope_id: i64, position: i32) {
        self.project_id = scope_id;
        self.position = position;
    }
}

/// Plan a move inside one scope holding `count` live items.
///
/// Only the span between `old` and `new` is touched.
pub fn plan_within(
    scope_id: i64,
    item_id: i64,
    old: i32,
    new: i32,
    count: i32,
) -> Result<MovePlan, BoardError> {
    if new < 0 || new >= count {
        return Err(BoardError::InvalidPosition {
            position: new,
            max: count - 1,
        });
    }
    if old == new {
        return Ok(MovePlan::noop());
    }
    let shift = if new > old {
        ShiftRange {
            scope_id,
            start: old + 1,
            end: Some(new),
            delta: -1,
            exclude: Some(item_id),
        }
    } else {
        ShiftRange {
            scope_id,
            start: new,
            end: Some(old - 1),
            delta: 1,
            exclude: Some(item_id),
        }
    };
    Ok(MovePlan {
        shifts: vec![shift],
        placement: Some(Placement {
            item_id,
            scope_id,
            position: new,
        }),
    })
}

/// Plan a move from one scope to another.
///
/// `target_count` is the target's live count before insertion, so
/// `target_position == target_count` appends.
pub fn plan_across(
    item_id: i64,
    source_scope: i64,
    source_position: i32,
    target_scope: i64,
    target_position: i32,
    target_count: i32,
) -> Result<MovePlan, BoardError> {
    if target_position < 0 || target_position > target_count {
        return Err(BoardError::InvalidPosition {
            position: target_position,
            max: target_count,
        });
    }
    Ok(MovePlan {
        shifts: vec![
            ShiftRange {
                scope_id: source_scope,
                start: source_position + 1,
                end: None,
                delta: -1,
                exclude: Some(item_id),
            },
            ShiftRange {
                scope_id: target_scope,
                start: target_position,
                end: None,
                delta: 1,
                exclude: Some(item_id),
            },
        ],
        placement: Some(Placement {
            item_id,
            scope_id: target_scope,
            position: target_position,
        }),
    })
}

/// Plan closing the gap left by removing the item at `position`.
pub fn plan_remove(item_id: i64, scope_id: i64, position: i32) -> MovePlan {
    MovePlan {
        shifts: vec![ShiftRange {
            scope_id,
            start: position + 1,
            end: None,
            delta: -1,
            exclude: Some(item_id),
        }],
        placement: None,
    }
}

// ── Integrity ─────────────────────────────────────────────────────────

/// Result of checking one sequence against the contiguity invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContiguityReport {
    pub scope_id: i64,
    pub count: usize,
    /// Positions in `0..count` that no item holds.
    pub missing: Vec<i32>,
    /// Positions held by more than one item.
    pub duplicates: Vec<i32>,
    /// Positions outside `0..count`.
    pub out_of_range: Vec<i32>,
}

impl ContiguityReport {
    pub fn is_contiguous(&self) -> bool {
        self.missing.is_empty() && self.duplicates.is_empty() && self.out_of_range.is_empty()
    }
}

/// Check `(id, position)` pairs of one scope.
pub fn check_contiguity(scope_id: i64, positions: &[(i64, i32)]) -> ContiguityReport {
    let count = positions.len();
    let mut seen = vec![0u32; count];
    let mut out_of_range = Vec::new();
    for &(_, position) in positions {
        match usize::try_from(position) {
            Ok(p) if p < count => seen[p] += 1,
            _ => out_of_range.push(position),
        }
    }
    let missing = seen
        .iter()
        .enumerate()
        .filter(|(_, n)| **n == 0)
        .map(|(p, _)| p as i32)
        .collect();
    let duplicates = seen
        .iter()
        .enumerate()
        .filter(|(_, n)| **n > 1)
        .map(|(p, _)| p as i32)
        .collect();
    out_of_range.sort_unstable();
    ContiguityReport {
        scope_id,
        count,
        missing,
        duplicates,
        out_of_range,
    }
}

/// Renumber to `0..n` keeping `(position, id)` order; returns only the
/// assignments that differ from the current position.
pub fn renumber(positions: &[(i64, i32)]) -> Vec<(i64, i32)> {
    let mut ordered = positions.to_vec();
    ordered.sort_by_key(|&(id, position)| (position, id));
    ordered
        .into_iter()
        .enumerate()
        .filter(|(i, (_, position))| *i as i32 != *position)
        .map(|(i, (id, _))| (id, i as i32))
        .collect()
}

// ── Requests and outcomes ─────────────────────────────────────────────

/// A request to put a card at `position` in `column_id`.
///
/// `expected_*` carry the caller's view of where the card currently is; a
/// mismatch means the caller is stale and nothing is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub card_id: i64,
    pub column_id: i64,
    pub position: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_column_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_position: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub card: Card,
    pub from_column_id: i64,
    pub from_position: i32,
    /// Rows written, zero for a no-op.
    pub writes: usize,
}

impl MoveOutcome {
    pub fn changed(&self) -> bool {
        self.writes > 0
    }
}

/// How a removed card leaves its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    Archive,
    Delete,
}

// ── Reorderer ─────────────────────────────────────────────────────────

/// Applies plans to the store, one transaction per operation.
#[derive(Clone)]
pub struct Reorderer {
    checker: Arc<dyn PermissionChecker>,
}

impl Reorderer {
    pub fn new(checker: Arc<dyn PermissionChecker>) -> Self {
        Self { checker }
    }

    fn ensure_can_mutate(
        &self,
        conn: &Connection,
        user_id: &str,
        column_id: i64,
    ) -> Result<(), BoardError> {
        if self.checker.can_mutate_column(conn, user_id, column_id)? {
            Ok(())
        } else {
            tracing::info!(user_id, column_id, "Column mutation denied");
            Err(BoardError::PermissionDenied {
                user_id: user_id.to_string(),
                column_id,
            })
        }
    }

    /// Permission check for edits that do not touch positions.
    pub fn authorize(&self, db: &BoardDb, user_id: &str, column_id: i64) -> Result<(), BoardError> {
        db.transaction(|conn| {
            load_column(conn, column_id)?;
            self.ensure_can_mutate(conn, user_id, column_id)
        })
    }

    /// Add a card at the end of `column_id`.
    pub fn append(
        &self,
        db: &BoardDb,
        user_id: &str,
        column_id: i64,
        title: &str,
        description: &str,
    ) -> Result<Card, BoardError> {
        db.transaction(|conn| {
            load_column(conn, column_id)?;
            self.ensure_can_mutate(conn, user_id, column_id)?;
            let position = db::max_position(conn, Sequence::Cards, column_id)?.map_or(0, |m| m + 1);
            let id = db::insert_card(conn, column_id, title, description, position)?;
            tracing::debug!(card_id = id, column_id, position, "Appended card");
            load_card(conn, id)
        })
    }

    /// Move a card inside `column_id` from `old_position` to `new_position`.
    ///
    /// The card must currently sit at `old_position` in `column_id`;
    /// otherwise the caller's view is stale and `ConcurrencyConflict` is
    /// returned.
    pub fn move_within_column(
        &self,
        db: &BoardDb,
        user_id: &str,
        column_id: i64,
        card_id: i64,
        old_position: i32,
        new_position: i32,
    ) -> Result<MoveOutcome, BoardError> {
        self.move_card(
            db,
            user_id,
            &MoveRequest {
                card_id,
                column_id,
                position: new_position,
                expected_column_id: Some(column_id),
                expected_position: Some(old_position),
            },
        )
    }

    /// Move a card from `source_column_id`/`source_position` to
    /// `target_column_id`/`target_position`.
    pub fn move_across_columns(
        &self,
        db: &BoardDb,
        user_id: &str,
        card_id: i64,
        source_column_id: i64,
        source_position: i32,
        target_column_id: i64,
        target_position: i32,
    ) -> Result<MoveOutcome, BoardError> {
        self.move_card(
            db,
            user_id,
            &MoveRequest {
                card_id,
                column_id: target_column_id,
                position: target_position,
                expected_column_id: Some(source_column_id),
                expected_position: Some(source_position),
            },
        )
    }

    /// Put a card at the requested column and position, choosing between a
    /// no-op, an in-column move and a cross-column move.
    pub fn move_card(
        &self,
        db: &BoardDb,
        user_id: &str,
        req: &MoveRequest,
    ) -> Result<MoveOutcome, BoardError> {
        db.transaction(|conn| {
            let card = load_live_card(conn, req.card_id)?;
            let source = load_column(conn, card.column_id)?;
            let target = if req.column_id == source.id {
                source.clone()
            } else {
                load_column(conn, req.column_id)?
            };

            let stale = req.expected_column_id.is_some_and(|c| c != card.column_id)
                || req.expected_position.is_some_and(|p| p != card.position);
            if stale {
                tracing::debug!(
                    card_id = card.id,
                    column_id = card.column_id,
                    position = card.position,
                    "Rejected move from stale view"
                );
                return Err(BoardError::ConcurrencyConflict { card_id: card.id });
            }
            if source.project_id != target.project_id {
                return Err(BoardError::CrossProjectMove {
                    card_id: card.id,
                    column_id: target.id,
                });
            }

            self.ensure_can_mutate(conn, user_id, source.id)?;
            if target.id != source.id {
                self.ensure_can_mutate(conn, user_id, target.id)?;
            }

            let plan = if target.id == source.id {
                let count = db::sequence_len(conn, Sequence::Cards, source.id)?;
                plan_within(source.id, card.id, card.position, req.position, count)?
            } else {
                let target_count = db::sequence_len(conn, Sequence::Cards, target.id)?;
                plan_across(
                    card.id,
                    source.id,
                    card.position,
                    target.id,
                    req.position,
                    target_count,
                )?
            };

            if plan.is_noop() {
                tracing::trace!(card_id = card.id, "Move is a no-op");
                return Ok(MoveOutcome {
                    from_column_id: card.column_id,
                    from_position: card.position,
                    card,
                    writes: 0,
                });
            }

            let writes = db::apply_plan(conn, Sequence::Cards, &plan)?;
            tracing::debug!(
                card_id = card.id,
                from_column = source.id,
                from_position = card.position,
                to_column = target.id,
                to_position = req.position,
                writes,
                "Moved card"
            );
            Ok(MoveOutcome {
                from_column_id: card.column_id,
                from_position: card.position,
                card: load_card(conn, card.id)?,
                writes,
            })
        })
    }

    /// Remove the card at `position` of `column_id` and close the gap.
    pub fn remove(
        &self,
        db: &BoardDb,
        user_id: &str,
        card_id: i64,
        column_id: i64,
        position: i32,
        mode: RemoveMode,
    ) -> Result<Card, BoardError> {
        db.transaction(|conn| {
            let card = load_live_card(conn, card_id)?;
            load_column(conn, column_id)?;
            if card.column_id != column_id || card.position != position {
                return Err(BoardError::ConcurrencyConflict { card_id });
            }
            self.remove_in(conn, user_id, card, mode)
        })
    }

    /// Archive a card wherever it currently is.
    pub fn archive(&self, db: &BoardDb, user_id: &str, card_id: i64) -> Result<Card, BoardError> {
        db.transaction(|conn| {
            let card = load_live_card(conn, card_id)?;
            self.remove_in(conn, user_id, card, RemoveMode::Archive)
        })
    }

    /// Delete a card wherever it currently is.
    pub fn delete(&self, db: &BoardDb, user_id: &str, card_id: i64) -> Result<Card, BoardError> {
        db.transaction(|conn| {
            let card = load_card(conn, card_id)?;
            if card.archived {
                // Archived cards hold no live position, so there is no gap.
                self.ensure_can_mutate(conn, user_id, card.column_id)?;
                db::delete_card_row(conn, card.id)?;
                return Ok(card);
            }
            self.remove_in(conn, user_id, card, RemoveMode::Delete)
        })
    }

    fn remove_in(
        &self,
        conn: &Connection,
        user_id: &str,
        mut card: Card,
        mode: RemoveMode,
    ) -> Result<Card, BoardError> {
        self.ensure_can_mutate(conn, user_id, card.column_id)?;
        let plan = plan_remove(card.id, card.column_id, card.position);
        let shifted = db::apply_plan(conn, Sequence::Cards, &plan)?;
        match mode {
            RemoveMode::Archive => {
                db::set_card_archived(conn, card.id, true, card.position)?;
                card = load_card(conn, card.id)?;
            }
            RemoveMode::Delete => {
                db::delete_card_row(conn, card.id)?;
            }
        }
        tracing::debug!(card_id = card.id, column_id = card.column_id, ?mode, shifted, "Removed card");
        Ok(card)
    }

    /// Bring an archived card back at the end of its column.
    pub fn restore(&self, db: &BoardDb, user_id: &str, card_id: i64) -> Result<Card, BoardError> {
        db.transaction(|conn| {
            let card = load_card(conn, card_id)?;
            if !card.archived {
                return Ok(card);
            }
            self.ensure_can_mutate(conn, user_id, card.column_id)?;
            let position =
                db::max_position(conn, Sequence::Cards, card.column_id)?.map_or(0, |m| m + 1);
            db::set_card_archived(conn, card.id, false, position)?;
            tracing::debug!(card_id, position, "Restored card");
            load_card(conn, card.id)
        })
    }

    /// Add a column at the end of a project's board.
    pub fn append_column(
        &self,
        db: &BoardDb,
        user_id: &str,
        project_id: i64,
        name: &str,
    ) -> Result<Column, BoardError> {
        db.transaction(|conn| {
            if !db::project_exists(conn, project_id)? {
                return Err(BoardError::ProjectNotFound { id: project_id });
            }
            if db::member_role_for_project(conn, project_id, user_id)?.is_none()
                && !self.checker.allows_non_members()
            {
                // Non-members do not learn that the project exists.
                return Err(BoardError::ProjectNotFound { id: project_id });
            }
            let position =
                db::max_position(conn, Sequence::Columns, project_id)?.map_or(0, |m| m + 1);
            let id = db::insert_column(conn, project_id, name, position)?;
            self.ensure_can_mutate(conn, user_id, id)?;
            load_column(conn, id)
        })
    }

    /// Reorder a column among its project's columns.
    pub fn move_column(
        &self,
        db: &BoardDb,
        user_id: &str,
        column_id: i64,
        new_position: i32,
    ) -> Result<Column, BoardError> {
        db.transaction(|conn| {
            let column = load_column(conn, column_id)?;
            self.ensure_can_mutate(conn, user_id, column.id)?;
            let count = db::sequence_len(conn, Sequence::Columns, column.project_id)?;
            let plan = plan_within(column.project_id, column.id, column.position, new_position, count)?;
            if !plan.is_noop() {
                let writes = db::apply_plan(conn, Sequence::Columns, &plan)?;
                tracing::debug!(column_id, new_position, writes, "Moved column");
            }
            load_column(conn, column.id)
        })
    }

    /// Check a column's card positions against the contiguity invariant.
    pub fn check_column(&self, db: &BoardDb, column_id: i64) -> Result<ContiguityReport, BoardError> {
        db.transaction(|conn| {
            load_column(conn, column_id)?;
            let positions = db::sequence_positions(conn, Sequence::Cards, column_id)?;
            Ok(check_contiguity(column_id, &positions))
        })
    }

    /// Renumber a damaged column to `0..count`. Returns rows rewritten.
    pub fn reindex_column(&self, db: &BoardDb, column_id: i64) -> Result<usize, BoardError> {
        db.transaction(|conn| {
            load_column(conn, column_id)?;
            let positions = db::sequence_positions(conn, Sequence::Cards, column_id)?;
            let assignments = renumber(&positions);
            let written = db::rewrite_positions(conn, Sequence::Cards, column_id, &assignments)?;
            if written > 0 {
                tracing::warn!(column_id, written, "Reindexed column positions");
            }
            Ok(written)
        })
    }
}

fn load_column(conn: &Connection, id: i64) -> Result<Column, BoardError> {
    db::fetch_column(conn, id)?.ok_or(BoardError::ColumnNotFound { id })
}

fn load_card(conn: &Connection, id: i64) -> Result<Card, BoardError> {
    db::fetch_card(conn, id)?.ok_or(BoardError::CardNotFound { id })
}

/// Archived cards are outside every sequence and cannot be moved.
fn load_live_card(conn: &Connection, id: i64) -> Result<Card, BoardError> {
    match db::fetch_card(conn, id)? {
        Some(card) if !card.archived => Ok(card),
        _ => Err(BoardError::CardNotFound { id }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
