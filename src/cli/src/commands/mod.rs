//! Subcommand implementations.

pub mod apply;
pub mod settings;
pub mod show;
pub mod stats;
pub mod stream;
pub mod trace;
