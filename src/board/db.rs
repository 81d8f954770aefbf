use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use super::models::*;
use super::reorder::MovePlan;
use crate::errors::BoardError;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads. The mutex also serializes every
/// transaction issued by this process.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R, BoardError>
    where
        F: FnOnce(&BoardDb) -> Result<R, BoardError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| BoardError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Used at startup, from the
    /// CLI and in tests; never from a request handler.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, BoardDb>, BoardError> {
        self.inner.lock().map_err(|_| BoardError::LockPoisoned)
    }
}

/// Which positioned table a `MovePlan` is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    /// Cards ordered within a column; archived cards are outside the sequence.
    Cards,
    /// Columns ordered within a project.
    Columns,
}

impl Sequence {
    fn shift_sql(&self) -> &'static str {
        match self {
            Self::Cards => {
                "UPDATE cards SET position = position + ?1, updated_at = datetime('now')
                 WHERE column_id = ?2 AND archived = 0 AND position >= ?3
                   AND (?4 IS NULL OR position <= ?4)
                   AND (?5 IS NULL OR id != ?5)"
            }
            Self::Columns => {
                "UPDATE board_columns SET position = position + ?1
                 WHERE project_id = ?2 AND position >= ?3
                   AND (?4 IS NULL OR position <= ?4)
                   AND (?5 IS NULL OR id != ?5)"
            }
        }
    }

    fn place_sql(&self) -> &'static str {
        match self {
            Self::Cards => {
                "UPDATE cards SET column_id = ?1, position = ?2, updated_at = datetime('now') WHERE id = ?3"
            }
            Self::Columns => {
                "UPDATE board_columns SET project_id = ?1, position = ?2 WHERE id = ?3"
            }
        }
    }

    fn positions_sql(&self) -> &'static str {
        match self {
            Self::Cards => {
                "SELECT id, position FROM cards WHERE column_id = ?1 AND archived = 0 ORDER BY position, id"
            }
            Self::Columns => {
                "SELECT id, position FROM board_columns WHERE project_id = ?1 ORDER BY position, id"
            }
        }
    }
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS project_members (
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    user_id TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'member',
                    added_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (project_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS board_columns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    position INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS cards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    column_id INTEGER NOT NULL REFERENCES board_columns(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    position INTEGER NOT NULL DEFAULT 0,
                    archived INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS activity (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    card_id INTEGER,
                    actor TEXT NOT NULL,
                    action TEXT NOT NULL,
                    detail TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_columns_project ON board_columns(project_id, position);
                CREATE INDEX IF NOT EXISTS idx_cards_column ON cards(column_id, archived, position);
                CREATE INDEX IF NOT EXISTS idx_activity_project ON activity(project_id, id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken before the first read, so the counts and
    /// positions `f` observes cannot change underneath it. Returning an
    /// error drops the transaction, which rolls every statement back.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, BoardError>,
    ) -> Result<R, BoardError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Project CRUD ──────────────────────────────────────────────────

    /// Create a project and make `owner` its first member.
    pub fn create_project(&self, name: &str, owner: &str) -> Result<Project> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute("INSERT INTO projects (name) VALUES (?1)", params![name])
            .context("Failed to insert project")?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO project_members (project_id, user_id, role) VALUES (?1, ?2, 'owner')",
            params![id, owner],
        )
        .context("Failed to insert project owner")?;
        tx.commit().context("Failed to commit project")?;
        self.get_project(id)?
            .context("Project not found after insert")
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM projects ORDER BY id")
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map([], project_from_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    /// Projects where `user_id` holds any role.
    pub fn list_projects_for_user(&self, user_id: &str) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.id, p.name, p.created_at FROM projects p
                 JOIN project_members m ON m.project_id = p.id
                 WHERE m.user_id = ?1 ORDER BY p.id",
            )
            .context("Failed to prepare list_projects_for_user")?;
        let rows = stmt
            .query_map(params![user_id], project_from_row)
            .context("Failed to query projects for user")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, name, created_at FROM projects WHERE id = ?1",
                params![id],
                project_from_row,
            )
            .optional()
            .context("Failed to query project")
    }

    // ── Members ───────────────────────────────────────────────────────

    /// Add a member or change the role of an existing one.
    pub fn add_member(
        &self,
        project_id: i64,
        user_id: &str,
        role: MemberRole,
    ) -> Result<ProjectMember> {
        self.conn
            .execute(
                "INSERT INTO project_members (project_id, user_id, role) VALUES (?1, ?2, ?3)
                 ON CONFLICT(project_id, user_id) DO UPDATE SET role = excluded.role",
                params![project_id, user_id, role.as_str()],
            )
            .context("Failed to upsert project member")?;
        self.list_members(project_id)?
            .into_iter()
            .find(|m| m.user_id == user_id)
            .context("Member not found after insert")
    }

    pub fn list_members(&self, project_id: i64) -> Result<Vec<ProjectMember>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT project_id, user_id, role, added_at FROM project_members
                 WHERE project_id = ?1 ORDER BY added_at, user_id",
            )
            .context("Failed to prepare list_members")?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(MemberRow {
                    project_id: row.get(0)?,
                    user_id: row.get(1)?,
                    role: row.get(2)?,
                    added_at: row.get(3)?,
                })
            })
            .context("Failed to query members")?;
        let mut members = Vec::new();
        for row in rows {
            let r = row.context("Failed to read member row")?;
            members.push(r.into_member()?);
        }
        Ok(members)
    }

    pub fn member_role(&self, project_id: i64, user_id: &str) -> Result<Option<MemberRole>> {
        let role = member_role_for_project(&self.conn, project_id, user_id)
            .context("Failed to query member role")?;
        role.map(|r| {
            MemberRole::from_str(&r)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Failed to parse member role")
        })
        .transpose()
    }

    // ── Columns ───────────────────────────────────────────────────────

    pub fn list_columns(&self, project_id: i64) -> Result<Vec<Column>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, name, position, created_at FROM board_columns
                 WHERE project_id = ?1 ORDER BY position, id",
            )
            .context("Failed to prepare list_columns")?;
        let rows = stmt
            .query_map(params![project_id], column_from_row)
            .context("Failed to query columns")?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.context("Failed to read column row")?);
        }
        Ok(columns)
    }

    pub fn get_column(&self, id: i64) -> Result<Option<Column>> {
        fetch_column(&self.conn, id).context("Failed to query column")
    }

    /// Every column id, optionally limited to one project.
    pub fn column_ids(&self, project_id: Option<i64>) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM board_columns WHERE (?1 IS NULL OR project_id = ?1)
                 ORDER BY project_id, position, id",
            )
            .context("Failed to prepare column_ids")?;
        let rows = stmt
            .query_map(params![project_id], |row| row.get(0))
            .context("Failed to query column ids")?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.context("Failed to read column id")?);
        }
        Ok(ids)
    }

    // ── Cards ─────────────────────────────────────────────────────────

    /// Fetch a card, archived or not.
    pub fn get_card(&self, id: i64) -> Result<Option<Card>> {
        fetch_card(&self.conn, id).context("Failed to query card")
    }

    /// Live cards of a column in board order.
    pub fn list_cards(&self, column_id: i64) -> Result<Vec<Card>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, column_id, title, description, position, archived, created_at, updated_at
                 FROM cards WHERE column_id = ?1 AND archived = 0 ORDER BY position, id",
            )
            .context("Failed to prepare list_cards")?;
        let rows = stmt
            .query_map(params![column_id], card_from_row)
            .context("Failed to query cards")?;
        let mut cards = Vec::new();
        for row in rows {
            cards.push(row.context("Failed to read card row")?);
        }
        Ok(cards)
    }

    /// Edit a card's payload. Position and column are owned by the reorderer.
    pub fn update_card(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Card> {
        // Use unchecked_transaction so all updates are atomic.
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(t) = title {
            tx.execute(
                "UPDATE cards SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![t, id],
            )
            .context("Failed to update card title")?;
        }
        if let Some(d) = description {
            tx.execute(
                "UPDATE cards SET description = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![d, id],
            )
            .context("Failed to update card description")?;
        }

        tx.commit().context("Failed to commit card update")?;
        self.get_card(id)?.context("Card not found after update")
    }

    /// Live positions of `scope_id`'s sequence as `(id, position)` pairs,
    /// ordered by position then id.
    pub fn positions(&self, sequence: Sequence, scope_id: i64) -> Result<Vec<(i64, i32)>> {
        sequence_positions(&self.conn, sequence, scope_id).context("Failed to read positions")
    }

    // ── Board view ────────────────────────────────────────────────────

    pub fn get_board(&self, project_id: i64) -> Result<BoardView, BoardError> {
        let project = self
            .get_project(project_id)?
            .ok_or(BoardError::ProjectNotFound { id: project_id })?;

        let mut columns = Vec::new();
        for column in self.list_columns(project_id)? {
            let cards = self.list_cards(column.id)?;
            columns.push(ColumnView { column, cards });
        }

        Ok(BoardView { project, columns })
    }

    // ── Activity ──────────────────────────────────────────────────────

    pub fn record_activity(&self, entry: &NewActivity) -> Result<Activity> {
        let detail =
            serde_json::to_string(&entry.detail).context("Failed to serialize activity detail")?;
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO activity (project_id, card_id, actor, action, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.project_id,
                    entry.card_id,
                    entry.actor,
                    entry.action.as_str(),
                    detail,
                    created_at
                ],
            )
            .context("Failed to insert activity")?;
        let id = self.conn.last_insert_rowid();
        Ok(Activity {
            id,
            project_id: entry.project_id,
            card_id: entry.card_id,
            actor: entry.actor.clone(),
            action: entry.action,
            detail: entry.detail.clone(),
            created_at,
        })
    }

    /// Most recent activity first.
    pub fn list_activity(&self, project_id: i64, limit: i64) -> Result<Vec<Activity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, card_id, actor, action, detail, created_at
                 FROM activity WHERE project_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .context("Failed to prepare list_activity")?;
        let rows = stmt
            .query_map(params![project_id, limit], |row| {
                Ok(ActivityRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    card_id: row.get(2)?,
                    actor: row.get(3)?,
                    action: row.get(4)?,
                    detail: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .context("Failed to query activity")?;
        let mut entries = Vec::new();
        for row in rows {
            let r = row.context("Failed to read activity row")?;
            entries.push(r.into_activity()?);
        }
        Ok(entries)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Statement helpers ─────────────────────────────────────────────────
//
// These take a bare `Connection` so the reorderer can run them inside the
// transaction opened by `BoardDb::transaction`.

pub(crate) fn fetch_card(conn: &Connection, id: i64) -> rusqlite::Result<Option<Card>> {
    conn.query_row(
        "SELECT id, column_id, title, description, position, archived, created_at, updated_at
         FROM cards WHERE id = ?1",
        params![id],
        card_from_row,
    )
    .optional()
}

pub(crate) fn fetch_column(conn: &Connection, id: i64) -> rusqlite::Result<Option<Column>> {
    conn.query_row(
        "SELECT id, project_id, name, position, created_at FROM board_columns WHERE id = ?1",
        params![id],
        column_from_row,
    )
    .optional()
}

pub(crate) fn project_exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

pub(crate) fn member_role_for_project(
    conn: &Connection,
    project_id: i64,
    user_id: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT role FROM project_members WHERE project_id = ?1 AND user_id = ?2",
        params![project_id, user_id],
        |row| row.get(0),
    )
    .optional()
}

/// Number of live items in a sequence.
pub(crate) fn sequence_len(
    conn: &Connection,
    sequence: Sequence,
    scope_id: i64,
) -> rusqlite::Result<i32> {
    let sql = match sequence {
        Sequence::Cards => "SELECT COUNT(*) FROM cards WHERE column_id = ?1 AND archived = 0",
        Sequence::Columns => "SELECT COUNT(*) FROM board_columns WHERE project_id = ?1",
    };
    conn.query_row(sql, params![scope_id], |row| row.get(0))
}

/// Highest live position in a sequence, `None` when it is empty.
pub(crate) fn max_position(
    conn: &Connection,
    sequence: Sequence,
    scope_id: i64,
) -> rusqlite::Result<Option<i32>> {
    let sql = match sequence {
        Sequence::Cards => "SELECT MAX(position) FROM cards WHERE column_id = ?1 AND archived = 0",
        Sequence::Columns => "SELECT MAX(position) FROM board_columns WHERE project_id = ?1",
    };
    conn.query_row(sql, params![scope_id], |row| row.get(0))
}

pub(crate) fn sequence_positions(
    conn: &Connection,
    sequence: Sequence,
    scope_id: i64,
) -> rusqlite::Result<Vec<(i64, i32)>> {
    let mut stmt = conn.prepare(sequence.positions_sql())?;
    let rows = stmt.query_map(params![scope_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

pub(crate) fn insert_card(
    conn: &Connection,
    column_id: i64,
    title: &str,
    description: &str,
    position: i32,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO cards (column_id, title, description, position) VALUES (?1, ?2, ?3, ?4)",
        params![column_id, title, description, position],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn insert_column(
    conn: &Connection,
    project_id: i64,
    name: &str,
    position: i32,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO board_columns (project_id, name, position) VALUES (?1, ?2, ?3)",
        params![project_id, name, position],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn set_card_archived(
    conn: &Connection,
    id: i64,
    archived: bool,
    position: i32,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE cards SET archived = ?1, position = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![archived, position, id],
    )
}

pub(crate) fn delete_card_row(conn: &Connection, id: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM cards WHERE id = ?1", params![id])
}

/// Execute a plan's shift-range updates and final placement.
/// Returns the number of rows written.
pub(crate) fn apply_plan(
    conn: &Connection,
    sequence: Sequence,
    plan: &MovePlan,
) -> rusqlite::Result<usize> {
    let mut written = 0;
    for shift in &plan.shifts {
        written += conn.execute(
            sequence.shift_sql(),
            params![
                shift.delta,
                shift.scope_id,
                shift.start,
                shift.end,
                shift.exclude
            ],
        )?;
    }
    if let Some(placement) = &plan.placement {
        written += conn.execute(
            sequence.place_sql(),
            params![placement.scope_id, placement.position, placement.item_id],
        )?;
    }
    Ok(written)
}

/// Overwrite positions wholesale. Only used to repair damaged sequences.
pub(crate) fn rewrite_positions(
    conn: &Connection,
    sequence: Sequence,
    scope_id: i64,
    assignments: &[(i64, i32)],
) -> rusqlite::Result<usize> {
    let mut written = 0;
    for (id, position) in assignments {
        written += conn.execute(
            sequence.place_sql(),
            params![scope_id, position, id],
        )?;
    }
    Ok(written)
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn column_from_row(row: &Row<'_>) -> rusqlite::Result<Column> {
    Ok(Column {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        position: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        column_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        position: row.get(4)?,
        archived: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Intermediate row struct for reading members before parsing the role.
struct MemberRow {
    project_id: i64,
    user_id: String,
    role: String,
    added_at: String,
}

impl MemberRow {
    fn into_member(self) -> Result<ProjectMember> {
        let role = MemberRole::from_str(&self.role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse member role")?;
        Ok(ProjectMember {
            project_id: self.project_id,
            user_id: self.user_id,
            role,
            added_at: self.added_at,
        })
    }
}

/// Intermediate row struct for activity; `action` and `detail` are stored as text.
struct ActivityRow {
    id: i64,
    project_id: i64,
    card_id: Option<i64>,
    actor: String,
    action: String,
    detail: String,
    created_at: String,
}

impl ActivityRow {
    fn into_activity(self) -> Result<Activity> {
        let action = ActivityAction::from_str(&self.action)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse activity action")?;
        let detail =
            serde_json::from_str(&self.detail).context("Failed to parse activity detail JSON")?;
        Ok(Activity {
            id: self.id,
            project_id: self.project_id,
            card_id: self.card_id,
            actor: self.actor,
            action,
            detail,
            created_at: self.created_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
