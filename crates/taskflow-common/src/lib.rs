//! Shared board domain for taskflow: task/column models, rank keys and the
//! in-memory board cache. Nothing in this crate performs I/O.

pub mod board;
pub mod models;
pub mod rank;

pub use board::{BoardCache, ColumnSnapshot, adjusted_index};
pub use models::{Column, SelectOption, Status, StatusId, Task, TaskId, parse_id, rank_order};
pub use rank::{DEFAULT_KEY, RankError, key_between};
