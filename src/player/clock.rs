use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use log::info;
use tokio::{task::JoinHandle, time::Instant};

use super::{Player, Subscribers};
use crate::{
    event::{NowPlayingItem, PlayerEvent, PlayerState},
    lyrics::Ticks,
};

#[derive(Debug)]
struct ClockState {
    anchor: Instant,
    base: Duration,
    paused: bool,
    finished: bool,
}

/// Plays one local item against the wall clock.
#[derive(Debug)]
pub struct ClockPlayer {
    item: NowPlayingItem,
    duration: Duration,
    ticks_per_millisecond: Ticks,
    state: Mutex<ClockState>,
    subscribers: Subscribers,
}

impl ClockPlayer {
    pub fn new(
        item: NowPlayingItem,
        duration: Duration,
        ticks_per_millisecond: Ticks,
    ) -> Arc<Self> {
        Arc::new(Self {
            item,
            duration,
            ticks_per_millisecond: ticks_per_millisecond.max(1),
            state: Mutex::new(ClockState {
                anchor: Instant::now(),
                base: Duration::ZERO,
                paused: false,
                finished: false,
            }),
            subscribers: Subscribers::default(),
        })
    }

    pub fn position(&self) -> Duration {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::position_of(&state).min(self.duration)
    }

    fn position_of(state: &ClockState) -> Duration {
        if state.paused {
            state.base
        } else {
            state.base + state.anchor.elapsed()
        }
    }

    pub fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.paused == paused {
            return;
        }
        state.base = Self::position_of(&state);
        state.anchor = Instant::now();
        state.paused = paused;
    }

    /// Publishes a start event, then the position every `tick` until the
    /// item ends.
    pub fn spawn(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let player = Arc::clone(self);
        tokio::spawn(async move {
            player.subscribers.publish(PlayerEvent::PlaybackStart {
                item: player.item.clone(),
            });
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                let position = player.position();
                player
                    .subscribers
                    .publish(PlayerEvent::TimeUpdate { position });
                if position >= player.duration {
                    break;
                }
            }
            player
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .finished = true;
            info!("Finished playing {}", player.item.id);
            player.subscribers.publish(PlayerEvent::PlaybackStop {
                next_media_type: None,
            });
        })
    }
}

#[async_trait::async_trait]
impl Player for ClockPlayer {
    fn id(&self) -> &str {
        "clock"
    }

    fn subscribe(&self) -> flume::Receiver<PlayerEvent> {
        self.subscribers.subscribe()
    }

    fn state(&self) -> PlayerState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        PlayerState {
            item: (!state.finished).then(|| self.item.clone()),
            position: Self::position_of(&state).min(self.duration),
            paused: state.paused,
        }
    }

    async fn seek(&self, position: Ticks) -> anyhow::Result<()> {
        let millis = (position / self.ticks_per_millisecond).max(0) as u64;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.base = Duration::from_millis(millis).min(self.duration);
        state.anchor = Instant::now();
        Ok(())
    }

    async fn unpause(&self) -> anyhow::Result<()> {
        self.set_paused(false);
        Ok(())
    }
}
