use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
    Viewer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }

    /// Viewers can read a board but not rearrange it.
    pub fn can_mutate(&self) -> bool {
        !matches!(self, Self::Viewer)
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "member" => Ok(Self::Member),
            "viewer" => Ok(Self::Viewer),
            _ => Err(format!("Invalid member role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectMember {
    pub project_id: i64,
    pub user_id: String,
    pub role: MemberRole,
    pub added_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub position: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: i64,
    pub column_id: i64,
    pub title: String,
    pub description: String,
    pub position: i32,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    CardCreated,
    CardUpdated,
    CardMoved,
    CardArchived,
    CardRestored,
    CardDeleted,
    ColumnCreated,
    ColumnMoved,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CardCreated => "card_created",
            Self::CardUpdated => "card_updated",
            Self::CardMoved => "card_moved",
            Self::CardArchived => "card_archived",
            Self::CardRestored => "card_restored",
            Self::CardDeleted => "card_deleted",
            Self::ColumnCreated => "column_created",
            Self::ColumnMoved => "column_moved",
        }
    }
}

impl FromStr for ActivityAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card_created" => Ok(Self::CardCreated),
            "card_updated" => Ok(Self::CardUpdated),
            "card_moved" => Ok(Self::CardMoved),
            "card_archived" => Ok(Self::CardArchived),
            "card_restored" => Ok(Self::CardRestored),
            "card_deleted" => Ok(Self::CardDeleted),
            "column_created" => Ok(Self::ColumnCreated),
            "column_moved" => Ok(Self::ColumnMoved),
            _ => Err(format!("Invalid activity action: {}", s)),
        }
    }
}

/// One row of the best-effort activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub project_id: i64,
    pub card_id: Option<i64>,
    pub actor: String,
    pub action: ActivityAction,
    pub detail: serde_json::Value,
    pub created_at: String,
}

/// Activity row before it has been written.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub project_id: i64,
    pub card_id: Option<i64>,
    pub actor: String,
    pub action: ActivityAction,
    pub detail: serde_json::Value,
}

// API view types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub project: Project,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    #[serde(flatten)]
    pub column: Column,
    pub cards: Vec<Card>,
}

impl BoardView {
    pub fn column(&self, column_id: i64) -> Option<&ColumnView> {
        self.columns.iter().find(|c| c.column.id == column_id)
    }

    /// Locate a live card anywhere on the board.
    pub fn find_card(&self, card_id: i64) -> Option<&Card> {
        self.columns
            .iter()
            .flat_map(|c| c.cards.iter())
            .find(|card| card.id == card_id)
    }

    /// Titles of the cards in `column_id`, in board order.
    pub fn titles(&self, column_id: i64) -> Vec<String> {
        self.column(column_id)
            .map(|c| c.cards.iter().map(|card| card.title.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_role_round_trips_through_str() {
        for role in [MemberRole::Owner, MemberRole::Member, MemberRole::Viewer] {
            assert_eq!(MemberRole::from_str(role.as_str()).unwrap(), role);
        }
        assert!(MemberRole::from_str("admin").is_err());
    }

    #[test]
    fn only_viewers_are_read_only() {
        assert!(MemberRole::Owner.can_mutate());
        assert!(MemberRole::Member.can_mutate());
        assert!(!MemberRole::Viewer.can_mutate());
    }

    #[test]
    fn column_view_flattens_column_fields() {
        let view = ColumnView {
            column: Column {
                id: 3,
                project_id: 1,
                name: "Doing".into(),
                position: 1,
                created_at: "2024-01-01".into(),
            },
            cards: vec![],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["name"], "Doing");
        assert!(json["cards"].as_array().unwrap().is_empty());
    }

    #[test]
    fn activity_action_serializes_snake_case() {
        let json = serde_json::to_string(&ActivityAction::CardMoved).unwrap();
        assert_eq!(json, "\"card_moved\"");
        assert_eq!(
            ActivityAction::from_str("column_moved").unwrap(),
            ActivityAction::ColumnMoved
        );
    }
}
