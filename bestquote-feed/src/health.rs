//! Liveness of the streaming feeds, shared with the poller.

use crate::event::FeedKind;
use std::sync::atomic::{AtomicU8, Ordering};

const NOT_RUNNING: u8 = 0;
const DOWN: u8 = 1;
const UP: u8 = 2;

/// Connection state of one stream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// No task runs this feed.
    NotRunning,
    /// The task runs but is not connected.
    Down,
    /// Connected and receiving frames.
    Up,
}

/// Per-kind stream health, updated by feed tasks.
#[derive(Debug, Default)]
pub struct FeedHealth {
    depth: AtomicU8,
    ticker: AtomicU8,
}

impl FeedHealth {
    /// Creates health with no feeds running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: FeedKind) -> &AtomicU8 {
        match kind {
            FeedKind::Depth => &self.depth,
            FeedKind::BookTicker => &self.ticker,
        }
    }

    /// Marks a feed as started but not yet connected.
    pub fn register(&self, kind: FeedKind) {
        self.slot(kind).store(DOWN, Ordering::Release);
    }

    /// Marks a feed as connected.
    pub fn set_up(&self, kind: FeedKind) {
        self.slot(kind).store(UP, Ordering::Release);
    }

    /// Marks a feed as disconnected.
    pub fn set_down(&self, kind: FeedKind) {
        self.slot(kind).store(DOWN, Ordering::Release);
    }

    /// Marks a feed as stopped.
    pub fn deregister(&self, kind: FeedKind) {
        self.slot(kind).store(NOT_RUNNING, Ordering::Release);
    }

    /// Returns the state of one feed.
    #[must_use]
    pub fn state(&self, kind: FeedKind) -> FeedState {
        match self.slot(kind).load(Ordering::Acquire) {
            UP => FeedState::Up,
            DOWN => FeedState::Down,
            _ => FeedState::NotRunning,
        }
    }

    /// Returns true if the feed is connected.
    #[must_use]
    pub fn is_healthy(&self, kind: FeedKind) -> bool {
        self.state(kind) == FeedState::Up
    }

    /// Returns true if at least one stream runs and every running stream is up.
    #[must_use]
    pub fn streams_healthy(&self) -> bool {
        let states = [self.state(FeedKind::Depth), self.state(FeedKind::BookTicker)];
        states.iter().any(|s| *s != FeedState::NotRunning)
            && states.iter().all(|s| *s != FeedState::Down)
    }
}
