pub mod clock;
pub mod remote;

use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    event::{PlayerEvent, PlayerState},
    lyrics::Ticks,
};

pub use clock::ClockPlayer;
pub use remote::RemotePlayer;

/// A playback source the lyrics session can bind to.
#[async_trait::async_trait]
pub trait Player: Send + Sync {
    /// Stable identity, used to tell rebinding apart from binding anew.
    fn id(&self) -> &str;

    /// New event stream. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> flume::Receiver<PlayerEvent>;

    fn state(&self) -> PlayerState;

    async fn seek(&self, position: Ticks) -> anyhow::Result<()>;

    async fn unpause(&self) -> anyhow::Result<()>;
}

/// Knows which player is current.
pub trait PlaybackManager: Send + Sync {
    fn current_player(&self) -> Option<Arc<dyn Player>>;

    /// Fires whenever the current player is replaced.
    fn subscribe_changes(&self) -> flume::Receiver<()>;
}

/// Manager over one player at a time, current while it has an item.
pub struct SinglePlayer {
    player: Mutex<Arc<dyn Player>>,
    changes: Subscribers<()>,
}

impl SinglePlayer {
    pub fn new(player: Arc<dyn Player>) -> Self {
        Self {
            player: Mutex::new(player),
            changes: Subscribers::default(),
        }
    }

    /// Swaps in another player and tells everyone watching for changes.
    pub fn replace(&self, player: Arc<dyn Player>) {
        *self.player.lock().unwrap_or_else(PoisonError::into_inner) = player;
        self.changes.publish(());
    }
}

impl PlaybackManager for SinglePlayer {
    fn current_player(&self) -> Option<Arc<dyn Player>> {
        let player = self.player.lock().unwrap_or_else(PoisonError::into_inner);
        player.state().item.is_some().then(|| Arc::clone(&player))
    }

    fn subscribe_changes(&self) -> flume::Receiver<()> {
        self.changes.subscribe()
    }
}

/// Fans events out to every live subscriber.
#[derive(Debug)]
pub struct Subscribers<T = PlayerEvent> {
    senders: Mutex<Vec<flume::Sender<T>>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> Subscribers<T> {
    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Sends to everyone still listening and forgets the rest.
    pub fn publish(&self, event: T) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| !tx.is_disconnected());
        senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
