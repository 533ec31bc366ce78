pub mod api;
pub mod board;
pub mod config;
pub mod errors;
pub mod logging;
pub mod reference;
pub mod session;

pub use taskflow_common as common;
