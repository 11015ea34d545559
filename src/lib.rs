//! Synced lyrics with ruby readings for Chinese, Japanese and Korean lines.

pub mod annotate;
pub mod config;
pub mod event;
pub mod lyrics;
pub mod player;
pub mod script;
pub mod server;
pub mod session;
pub mod sync;
pub mod tui;
