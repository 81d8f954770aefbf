//! HTTP client for the board API plus an optimistic local cache.
//!
//! `OptimisticBoard` applies a move to its cached `BoardView` right away,
//! using the same `MovePlan` the server will run, then sends it. If the
//! server rejects the move for any reason the cache is thrown away and the
//! board is fetched again; a local undo is never attempted.
//!
//! `MoveCoalescer` sits in front of it during a drag: every hover records a
//! destination, and only the latest destination per card is sent on flush.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::board::api::USER_HEADER;
use crate::board::models::{BoardView, Card, Column, Project};
use crate::board::reorder::{self, MovePlan};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Card {card_id} is not on the cached board")]
    UnknownCard { card_id: i64 },

    #[error("Column {column_id} is not on the cached board")]
    UnknownColumn { column_id: i64 },

    #[error("Move rejected locally: {0}")]
    Rejected(String),

    /// The move failed and the board could not be fetched again.
    #[error("Move failed ({rejected}) and the board could not be refetched: {refetch}")]
    RefetchFailed {
        rejected: Box<ClientError>,
        refetch: Box<ClientError>,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::RefetchFailed { rejected, .. } => rejected.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct MoveBody {
    column_id: i64,
    position: i32,
    expected_column_id: Option<i64>,
    expected_position: Option<i32>,
}

// ── REST client ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BoardClient {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl BoardClient {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn non-2xx responses into `ClientError::Api` with the server's
    /// `{"error": ...}` message.
    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }
        let message = resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v["error"].as_str().map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .post(self.url(path))
            .header(USER_HEADER, &self.user_id)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn board(&self, project_id: i64) -> Result<BoardView, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/projects/{}/board", project_id)))
            .header(USER_HEADER, &self.user_id)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn create_project(&self, name: &str) -> Result<Project, ClientError> {
        self.post("/api/projects", &serde_json::json!({ "name": name }))
            .await
    }

    pub async fn create_column(&self, project_id: i64, name: &str) -> Result<Column, ClientError> {
        self.post(
            &format!("/api/projects/{}/columns", project_id),
            &serde_json::json!({ "name": name }),
        )
        .await
    }

    pub async fn create_card(&self, column_id: i64, title: &str) -> Result<Card, ClientError> {
        self.post(
            &format!("/api/columns/{}/cards", column_id),
            &serde_json::json!({ "title": title }),
        )
        .await
    }

    /// Send one move. `expected` is where the caller believes the card is.
    pub async fn move_card(
        &self,
        card_id: i64,
        column_id: i64,
        position: i32,
        expected: Option<(i64, i32)>,
    ) -> Result<Card, ClientError> {
        let body = MoveBody {
            column_id,
            position,
            expected_column_id: expected.map(|(c, _)| c),
            expected_position: expected.map(|(_, p)| p),
        };
        let resp = self
            .http
            .patch(self.url(&format!("/api/cards/{}/move", card_id)))
            .header(USER_HEADER, &self.user_id)
            .json(&body)
            .send()
            .await?;
        Self::decode(resp).await
    }
}

// ── Optimistic cache ──────────────────────────────────────────────────

/// How a move through the cache ended.
#[derive(Debug)]
pub enum MoveStatus {
    /// The server accepted the move; the cache already matches it.
    Confirmed(Card),
    /// The cache was a no-op for this move; nothing was sent.
    Unchanged,
    /// The server refused the move and the board was fetched again.
    Refetched(ClientError),
}

pub struct OptimisticBoard {
    client: BoardClient,
    project_id: i64,
    view: BoardView,
}

impl OptimisticBoard {
    pub async fn load(client: BoardClient, project_id: i64) -> Result<Self, ClientError> {
        let view = client.board(project_id).await?;
        Ok(Self {
            client,
            project_id,
            view,
        })
    }

    pub fn view(&self) -> &BoardView {
        &self.view
    }

    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        self.view = self.client.board(self.project_id).await?;
        Ok(())
    }

    /// Plan a move against the cached board, exactly as the server would.
    pub fn plan(&self, card_id: i64, column_id: i64, position: i32) -> Result<MovePlan, ClientError> {
        let card = self
            .view
            .find_card(card_id)
            .ok_or(ClientError::UnknownCard { card_id })?;
        let target = self
            .view
            .column(column_id)
            .ok_or(ClientError::UnknownColumn { column_id })?;
        let plan = if card.column_id == column_id {
            reorder::plan_within(
                column_id,
                card_id,
                card.position,
                position,
                target.cards.len() as i32,
            )
        } else {
            reorder::plan_across(
                card_id,
                card.column_id,
                card.position,
                column_id,
                position,
                target.cards.len() as i32,
            )
        };
        plan.map_err(|e| ClientError::Rejected(e.to_string()))
    }

    /// Apply the move locally, then send it. On server rejection the local
    /// state is replaced by a fresh fetch. If that fetch fails too, the
    /// cache goes back to its state before the move and both errors are
    /// returned as `RefetchFailed`.
    pub async fn move_card(
        &mut self,
        card_id: i64,
        column_id: i64,
        position: i32,
    ) -> Result<MoveStatus, ClientError> {
        let plan = self.plan(card_id, column_id, position)?;
        if plan.is_noop() {
            return Ok(MoveStatus::Unchanged);
        }
        let expected = self
            .view
            .find_card(card_id)
            .map(|c| (c.column_id, c.position));
        let confirmed = self.view.clone();
        apply_to_view(&mut self.view, &plan);

        match self
            .client
            .move_card(card_id, column_id, position, expected)
            .await
        {
            Ok(card) => Ok(MoveStatus::Confirmed(card)),
            Err(err) => {
                tracing::debug!(card_id, error = %err, "Move rejected, refetching board");
                match self.refresh().await {
                    Ok(()) => Ok(MoveStatus::Refetched(err)),
                    Err(refetch) => {
                        tracing::warn!(card_id, error = %refetch, "Refetch failed, dropping unconfirmed move");
                        self.view = confirmed;
                        Err(ClientError::RefetchFailed {
                            rejected: Box::new(err),
                            refetch: Box::new(refetch),
                        })
                    }
                }
            }
        }
    }
}

/// Run `plan` against every card of the view and regroup by column.
pub fn apply_to_view(view: &mut BoardView, plan: &MovePlan) {
    let mut cards: Vec<Card> = view
        .columns
        .iter_mut()
        .flat_map(|c| std::mem::take(&mut c.cards))
        .collect();
    plan.apply(&mut cards);
    for column in &mut view.columns {
        let id = column.column.id;
        column.cards = cards.iter().filter(|c| c.column_id == id).cloned().collect();
        column.cards.sort_by_key(|c| (c.position, c.id));
    }
}

// ── Drag coalescing ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMove {
    pub card_id: i64,
    pub column_id: i64,
    pub position: i32,
}

/// Keeps only the latest destination per card until flushed.
#[derive(Debug, Default)]
pub struct MoveCoalescer {
    pending: Vec<PendingMove>,
    last_recorded: Option<Instant>,
}

impl MoveCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, card_id: i64, column_id: i64, position: i32) {
        let next = PendingMove {
            card_id,
            column_id,
            position,
        };
        match self.pending.iter_mut().find(|m| m.card_id == card_id) {
            Some(existing) => *existing = next,
            None => self.pending.push(next),
        }
        self.last_recorded = Some(Instant::now());
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True once nothing has been recorded for `quiet`.
    pub fn is_settled(&self, quiet: Duration) -> bool {
        self.last_recorded
            .is_some_and(|at| !self.pending.is_empty() && at.elapsed() >= quiet)
    }

    pub fn drain(&mut self) -> Vec<PendingMove> {
        self.last_recorded = None;
        std::mem::take(&mut self.pending)
    }

    /// Send every pending destination through the optimistic board.
    ///
    /// Stops at the first error. The failing move is dropped; moves not yet
    /// sent stay queued for the next flush.
    pub async fn flush(&mut self, board: &mut OptimisticBoard) -> Result<Vec<MoveStatus>, ClientError> {
        let mut queue = self.drain().into_iter();
        let mut results = Vec::new();
        while let Some(m) = queue.next() {
            match board.move_card(m.card_id, m.column_id, m.position).await {
                Ok(status) => results.push(status),
                Err(err) => {
                    self.pending.extend(queue);
                    if !self.pending.is_empty() {
                        self.last_recorded = Some(Instant::now());
                    }
                    return Err(err);
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::board::api::AppState;
    use crate::board::db::{BoardDb, DbHandle};
    use crate::board::permissions::PermissionMode;
    use crate::board::server::build_router;

    /// Serve a fresh in-memory board on an ephemeral port.
    async fn spawn_server() -> String {
        let db = BoardDb::new_in_memory().unwrap();
        let state = Arc::new(AppState::new(DbHandle::new(db), PermissionMode::Members));
        let app = build_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Project with columns A (X, Y, Z) and B (empty).
    async fn seed(client: &BoardClient) -> (i64, i64, i64) {
        let project = client.create_project("client-test").await.unwrap();
        let a = client.create_column(project.id, "A").await.unwrap();
        let b = client.create_column(project.id, "B").await.unwrap();
        for title in ["X", "Y", "Z"] {
            client.create_card(a.id, title).await.unwrap();
        }
        (project.id, a.id, b.id)
    }

    fn card_id(view: &BoardView, column_id: i64, title: &str) -> i64 {
        view.column(column_id)
            .unwrap()
            .cards
            .iter()
            .find(|c| c.title == title)
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_optimistic_move_matches_server() {
        let base = spawn_server().await;
        let client = BoardClient::new(&base, "alice");
        let (project, a, b) = seed(&client).await;
        let mut board = OptimisticBoard::load(client.clone(), project).await.unwrap();

        let x = card_id(board.view(), a, "X");
        let status = board.move_card(x, a, 2).await.unwrap();
        assert!(matches!(status, MoveStatus::Confirmed(_)));
        assert_eq!(board.view().titles(a), vec!["Y", "Z", "X"]);

        let z = card_id(board.view(), a, "Z");
        board.move_card(z, b, 0).await.unwrap();
        assert_eq!(board.view().titles(a), vec!["Y", "X"]);
        assert_eq!(board.view().titles(b), vec!["Z"]);

        let server = client.board(project).await.unwrap();
        for column in [a, b] {
            assert_eq!(board.view().titles(column), server.titles(column));
            let local: Vec<i32> = board.view().column(column).unwrap().cards.iter().map(|c| c.position).collect();
            let remote: Vec<i32> = server.column(column).unwrap().cards.iter().map(|c| c.position).collect();
            assert_eq!(local, remote);
        }
    }

    #[tokio::test]
    async fn test_stale_cache_refetches_on_conflict() {
        let base = spawn_server().await;
        let alice = BoardClient::new(&base, "alice");
        let (project, a, _) = seed(&alice).await;
        let mut stale = OptimisticBoard::load(alice.clone(), project).await.unwrap();
        let mut fresh = OptimisticBoard::load(alice.clone(), project).await.unwrap();

        let x = card_id(fresh.view(), a, "X");
        fresh.move_card(x, a, 2).await.unwrap();

        // The stale cache still thinks X is at 0.
        let status = stale.move_card(x, a, 1).await.unwrap();
        match status {
            MoveStatus::Refetched(err) => assert_eq!(err.status(), Some(409)),
            other => panic!("Expected Refetched, got {:?}", other),
        }
        assert_eq!(stale.view().titles(a), vec!["Y", "Z", "X"]);
    }

    #[tokio::test]
    async fn test_forbidden_move_refetches_server_state() {
        let base = spawn_server().await;
        let alice = BoardClient::new(&base, "alice");
        let (project, a, _) = seed(&alice).await;
        let mallory = BoardClient::new(&base, "mallory");
        let mut board = OptimisticBoard::load(mallory, project).await.unwrap();

        let x = card_id(board.view(), a, "X");
        let status = board.move_card(x, a, 2).await.unwrap();
        assert!(matches!(status, MoveStatus::Refetched(ref e) if e.status() == Some(403)));
        assert_eq!(board.view().titles(a), vec!["X", "Y", "Z"]);
    }

    #[tokio::test]
    async fn test_noop_and_out_of_range_send_nothing() {
        let base = spawn_server().await;
        let client = BoardClient::new(&base, "alice");
        let (project, a, _) = seed(&client).await;
        let mut board = OptimisticBoard::load(client, project).await.unwrap();
        let y = card_id(board.view(), a, "Y");

        assert!(matches!(board.move_card(y, a, 1).await.unwrap(), MoveStatus::Unchanged));
        assert!(matches!(
            board.move_card(y, a, 3).await,
            Err(ClientError::Rejected(_))
        ));
        assert_eq!(board.view().titles(a), vec!["X", "Y", "Z"]);
    }

    #[tokio::test]
    async fn test_coalescer_sends_last_destination_only() {
        let base = spawn_server().await;
        let client = BoardClient::new(&base, "alice");
        let (project, a, b) = seed(&client).await;
        let mut board = OptimisticBoard::load(client.clone(), project).await.unwrap();
        let x = card_id(board.view(), a, "X");

        let mut coalescer = MoveCoalescer::new();
        coalescer.record(x, a, 1);
        coalescer.record(x, b, 0);
        coalescer.record(x, a, 2);
        assert_eq!(coalescer.len(), 1);

        let results = coalescer.flush(&mut board).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(coalescer.is_empty());
        assert_eq!(board.view().titles(a), vec!["Y", "Z", "X"]);

        let activity: Vec<serde_json::Value> = reqwest::get(format!(
            "{}/api/projects/{}/activity",
            base, project
        ))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
        let moves = activity.iter().filter(|e| e["action"] == "card_moved").count();
        assert_eq!(moves, 1);
    }

    #[test]
    fn test_coalescer_settles_after_quiet_period() {
        let mut coalescer = MoveCoalescer::new();
        assert!(!coalescer.is_settled(Duration::ZERO));
        coalescer.record(1, 2, 0);
        coalescer.record(3, 2, 1);
        assert!(coalescer.is_settled(Duration::ZERO));
        assert!(!coalescer.is_settled(Duration::from_secs(3600)));
        let drained = coalescer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].card_id, 1);
        assert!(!coalescer.is_settled(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_unreachable_server_restores_confirmed_view() {
        let base = spawn_server().await;
        let client = BoardClient::new(&base, "alice");
        let (project, a, _) = seed(&client).await;
        let loaded = OptimisticBoard::load(client.clone(), project).await.unwrap();
        let x = card_id(loaded.view(), a, "X");

        let mut board = OptimisticBoard {
            client: BoardClient::new("http://127.0.0.1:1", "alice"),
            project_id: project,
            view: loaded.view().clone(),
        };
        let err = board.move_card(x, a, 2).await.unwrap_err();
        match err {
            ClientError::RefetchFailed { rejected, refetch } => {
                assert!(matches!(*rejected, ClientError::Transport(_)));
                assert!(matches!(*refetch, ClientError::Transport(_)));
            }
            other => panic!("Expected RefetchFailed, got {:?}", other),
        }
        assert_eq!(board.view().titles(a), vec!["X", "Y", "Z"]);

        let server = client.board(project).await.unwrap();
        assert_eq!(server.titles(a), vec!["X", "Y", "Z"]);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_unsent_moves() {
        let base = spawn_server().await;
        let client = BoardClient::new(&base, "alice");
        let (project, a, b) = seed(&client).await;
        let mut board = OptimisticBoard::load(client, project).await.unwrap();
        let x = card_id(board.view(), a, "X");
        let y = card_id(board.view(), a, "Y");

        let mut coalescer = MoveCoalescer::new();
        coalescer.record(x, a, 10);
        coalescer.record(y, b, 0);

        let err = coalescer.flush(&mut board).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
        assert_eq!(coalescer.len(), 1);
        assert_eq!(board.view().titles(a), vec!["X", "Y", "Z"]);

        let results = coalescer.flush(&mut board).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(coalescer.is_empty());
        assert_eq!(board.view().titles(b), vec!["Y"]);
    }
}
