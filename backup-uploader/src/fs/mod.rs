//! Local file system helpers.

pub mod collector;

pub use collector::{collect_files, CollectOptions};
