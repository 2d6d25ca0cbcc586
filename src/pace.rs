//! Pausing a transfer without closing the connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::MIN_PAUSE_POLL_INTERVAL;

/// External signal saying whether byte delivery should be held back.
///
/// Implementations may be slow to ask (a cache round trip, say); a
/// transfer samples it through a [`PaceGate`] at most once per interval.
#[async_trait]
pub trait PaceSource: Send + Sync {
    async fn is_paused(&self) -> bool;
}

/// The source used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverPaused;

#[async_trait]
impl PaceSource for NeverPaused {
    async fn is_paused(&self) -> bool {
        false
    }
}

#[async_trait]
impl PaceSource for AtomicBool {
    async fn is_paused(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

#[async_trait]
impl PaceSource for watch::Receiver<bool> {
    async fn is_paused(&self) -> bool {
        *self.borrow()
    }
}

#[async_trait]
impl<P: PaceSource + ?Sized> PaceSource for Arc<P> {
    async fn is_paused(&self) -> bool {
        (**self).is_paused().await
    }
}

/// Per-transfer cache of the pacing signal.
///
/// The first call always asks the source; afterwards the last answer is
/// reused until `interval` has passed.
pub struct PaceGate {
    source: Option<Arc<dyn PaceSource>>,
    interval: Duration,
    sampled_at: Option<Instant>,
    paused: bool,
}

impl std::fmt::Debug for PaceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaceGate")
            .field("paced", &self.source.is_some())
            .field("interval", &self.interval)
            .field("paused", &self.paused)
            .finish()
    }
}

impl PaceGate {
    /// Gate over `source`, sampled at most once per `interval`. The interval
    /// never drops below [`MIN_PAUSE_POLL_INTERVAL`].
    pub fn new(source: Arc<dyn PaceSource>, interval: Duration) -> Self {
        let interval = interval.max(MIN_PAUSE_POLL_INTERVAL);
        PaceGate { source: Some(source), interval, sampled_at: None, paused: false }
    }

    /// A gate that never pauses and never asks anything.
    pub fn unpaced() -> Self {
        PaceGate { source: None, interval: Duration::ZERO, sampled_at: None, paused: false }
    }

    pub async fn is_paused(&mut self) -> bool {
        let Some(source) = &self.source else {
            return false;
        };

        let due = self.sampled_at.map_or(true, |at| at.elapsed() >= self.interval);
        if due {
            let paused = source.is_paused().await;
            if paused != self.paused {
                debug!(paused, "pacing signal changed");
            }
            self.paused = paused;
            self.sampled_at = Some(Instant::now());
        }
        self.paused
    }
}
