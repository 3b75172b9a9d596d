//! CLI command implementations.

pub mod key;
pub mod replay;

pub use key::print_key;
pub use replay::{replay_log, ReplayOptions};
