//! Chat streaming and the interactive REPL.

pub mod history;
pub mod multiline;
pub mod repl;
pub mod stream;

pub use history::{History, MAX_HISTORY_LENGTH};
