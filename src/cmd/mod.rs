//! CLI command implementations.
//!
//! | Module   | Commands handled             |
//! |----------|------------------------------|
//! | `serve`  | `Serve`, `Init`              |
//! | `board`  | `Board`, `Check`, `Reindex`  |
//! | `config` | `Config`                     |

pub mod board;
pub mod config;
pub mod serve;

pub use board::{cmd_board, cmd_check, cmd_reindex};
pub use config::cmd_config;
pub use serve::{cmd_init, cmd_serve};
