//! Who may rearrange which column.
//!
//! The reorderer never decides access itself; it asks a `PermissionChecker`
//! with the connection of the transaction it is running in, so the check
//! sees the same snapshot as the move.

use std::str::FromStr;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use super::models::MemberRole;

pub trait PermissionChecker: Send + Sync {
    /// May `user_id` add, move or remove cards in `column_id`?
    fn can_mutate_column(
        &self,
        conn: &Connection,
        user_id: &str,
        column_id: i64,
    ) -> rusqlite::Result<bool>;

    /// Whether users outside a project's member list may touch it at all.
    fn allows_non_members(&self) -> bool {
        false
    }
}

/// Grants mutation to owners and members of the column's project.
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipChecker;

impl PermissionChecker for MembershipChecker {
    fn can_mutate_column(
        &self,
        conn: &Connection,
        user_id: &str,
        column_id: i64,
    ) -> rusqlite::Result<bool> {
        let role: Option<String> = conn
            .query_row(
                "SELECT m.role FROM project_members m
                 JOIN board_columns c ON c.project_id = m.project_id
                 WHERE c.id = ?1 AND m.user_id = ?2",
                params![column_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(role
            .and_then(|r| MemberRole::from_str(&r).ok())
            .is_some_and(|r| r.can_mutate()))
    }
}

/// Open boards: any identified user may change anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn can_mutate_column(&self, _: &Connection, _: &str, _: i64) -> rusqlite::Result<bool> {
        Ok(true)
    }

    fn allows_non_members(&self) -> bool {
        true
    }
}

/// Configured access model, `[permissions] mode` in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    #[default]
    Members,
    Open,
}

impl PermissionMode {
    pub fn checker(self) -> Arc<dyn PermissionChecker> {
        match self {
            Self::Members => Arc::new(MembershipChecker),
            Self::Open => Arc::new(AllowAll),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Members => "members",
            Self::Open => "open",
        }
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "members" => Ok(Self::Members),
            "open" => Ok(Self::Open),
            _ => Err(format!(
                "Invalid permission mode '{}' (expected 'members' or 'open')",
                s
            )),
        }
    }
}
