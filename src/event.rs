use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lyrics::Ticks;

/// Events a bound player pushes to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TimeUpdate {
        position: Duration,
    },
    PlaybackStart {
        item: NowPlayingItem,
    },
    PlaybackStop {
        /// Media type of the next queued item, if any.
        next_media_type: Option<String>,
    },
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NowPlayingItem {
    pub id: String,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub run_time_ticks: Option<Ticks>,
}

impl NowPlayingItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Snapshot of a player.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub item: Option<NowPlayingItem>,
    pub position: Duration,
    pub paused: bool,
}

/// User input the view forwards to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewInput {
    /// Positive deltas scroll down.
    Wheel {
        delta: i16,
    },
    TouchMove,
    ArrowUp,
    ArrowDown,
    /// Click on a line, or activation of the focused line when `None`.
    Activate(Option<usize>),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    NoPlayer,
    PlaybackEnded,
    LoadFailed,
    UserQuit,
}
