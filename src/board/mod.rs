//! Team kanban board back-end.
//!
//! ## Overview
//!
//! Projects own ordered columns; columns own ordered cards. Every card
//! position change (append, move inside a column, move across columns,
//! archive, delete, restore) runs as one SQLite transaction that opens or
//! closes a gap with shift-range updates, so each column's live positions
//! stay exactly `0..count`.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │ (client) │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ Reorderer::move_card()                 │
//!                       │         v                                        │
//!                       │  reorder.rs  (MovePlan, Reorderer)               │
//!                       │         │                                        │
//!                       │         │ PermissionChecker::can_mutate_column() │
//!                       │         v                                        │
//!                       │  permissions.rs                                  │
//!                       │         │                                        │
//!                       │         │ apply_plan() in BEGIN IMMEDIATE        │
//!                       │         v                                        │
//!                       │  db.rs  (BoardDb, DbHandle)                      │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module        | Responsibility                                          |
//! |---------------|---------------------------------------------------------|
//! | `models`      | Shared types: `Project`, `Column`, `Card`, `BoardView`  |
//! | `ws`          | `WsMessage` enum + `broadcast_message()` helper         |
//!
//! ## Typical Request Flow (drag a card to another column)
//!
//! 1. `PATCH /api/cards/{id}/move` → `api::move_card()`
//! 2. `Reorderer::move_card()` takes the write lock, re-reads the card,
//!    checks `expected_*` against it and asks the permission checker
//!    about both columns.
//! 3. `plan_across()` yields two shift ranges plus the placement;
//!    `db::apply_plan()` runs them and the transaction commits.
//! 4. After commit, `CardMoved` is broadcast over `/ws` and an activity
//!    row is written. Neither can fail the request.

pub mod api;
pub mod db;
pub mod models;
pub mod permissions;
pub mod reorder;
pub mod server;
pub mod ws;
