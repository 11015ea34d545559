use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::Context;
use log::{info, warn};
use tokio::task::JoinHandle;

use super::{Player, Subscribers};
use crate::{
    event::{PlayerEvent, PlayerState},
    lyrics::Ticks,
    server::{MediaServer, SessionInfo},
};

#[derive(Debug, Default)]
struct RemoteState {
    session_id: Option<String>,
    next_media_type: Option<String>,
    player: PlayerState,
}

/// Follows a playing session on the media server by polling it.
#[derive(Debug)]
pub struct RemotePlayer {
    server: MediaServer,
    device: Option<String>,
    ticks_per_millisecond: Ticks,
    state: Mutex<RemoteState>,
    subscribers: Subscribers,
}

fn pick_session<'a>(sessions: &'a [SessionInfo], device: Option<&str>) -> Option<&'a SessionInfo> {
    sessions.iter().find(|session| {
        session.now_playing_item.is_some()
            && device.map_or(true, |device| session.device_name.eq_ignore_ascii_case(device))
    })
}

impl RemotePlayer {
    pub fn new(
        server: MediaServer,
        device: Option<String>,
        ticks_per_millisecond: Ticks,
    ) -> Arc<Self> {
        Arc::new(Self {
            server,
            device,
            ticks_per_millisecond: ticks_per_millisecond.max(1),
            state: Mutex::new(RemoteState::default()),
            subscribers: Subscribers::default(),
        })
    }

    /// Fetches the sessions once and publishes whatever changed.
    pub async fn poll(&self) -> anyhow::Result<()> {
        let sessions = self.server.sessions().await?;
        let session = pick_session(&sessions, self.device.as_deref());
        for event in self.observe(session) {
            self.subscribers.publish(event);
        }
        Ok(())
    }

    fn observe(&self, session: Option<&SessionInfo>) -> Vec<PlayerEvent> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut events = Vec::new();
        match session.and_then(|it| it.now_playing_item.as_ref().map(|item| (it, item))) {
            Some((session, item)) => {
                let previous = state.player.item.as_ref().map(|it| it.id.as_str());
                if previous != Some(item.id.as_str()) {
                    info!("{} started playing {}", session.device_name, item.id);
                    events.push(PlayerEvent::PlaybackStart { item: item.clone() });
                }
                let ticks = session.play_state.position_ticks.unwrap_or(0).max(0);
                let position = Duration::from_millis((ticks / self.ticks_per_millisecond) as u64);
                events.push(PlayerEvent::TimeUpdate { position });
                state.session_id = Some(session.id.clone());
                state.next_media_type = session.next_media_type.clone();
                state.player = PlayerState {
                    item: Some(item.clone()),
                    position,
                    paused: session.play_state.is_paused,
                };
            }
            None => {
                if state.player.item.is_some() {
                    info!("Playback stopped");
                    events.push(PlayerEvent::PlaybackStop {
                        next_media_type: state.next_media_type.take(),
                    });
                }
                *state = RemoteState::default();
            }
        }
        events
    }

    pub fn spawn(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let player = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = player.poll().await {
                    warn!("Failed to poll sessions: {err:#}");
                }
            }
        })
    }

    fn session_id(&self) -> anyhow::Result<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .session_id
            .clone()
            .context("No session is playing")
    }
}

#[async_trait::async_trait]
impl Player for RemotePlayer {
    fn id(&self) -> &str {
        self.device.as_deref().unwrap_or("remote")
    }

    fn subscribe(&self) -> flume::Receiver<PlayerEvent> {
        self.subscribers.subscribe()
    }

    fn state(&self) -> PlayerState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .player
            .clone()
    }

    async fn seek(&self, position: Ticks) -> anyhow::Result<()> {
        let session_id = self.session_id()?;
        self.server.seek(&session_id, position).await
    }

    async fn unpause(&self) -> anyhow::Result<()> {
        let session_id = self.session_id()?;
        self.server.unpause(&session_id).await
    }
}
