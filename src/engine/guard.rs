//! Runaway restart detection.
//!
//! A producer whose identity changes on every cycle, or a watch key that
//! never settles, makes the binding layer restart the engine forever. The
//! guard counts automatic restarts in a rolling window and turns an
//! excessive rate into a fatal [`EngineError`].

use super::error::EngineError;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Limits for [`RestartGuard`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartGuardConfig {
    /// Restarts tolerated inside one window
    pub limit: usize,
    pub window: Duration,
}

impl Default for RestartGuardConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(1),
        }
    }
}

/// Rolling-window restart counter.
#[derive(Clone, Debug)]
pub struct RestartGuard {
    config: RestartGuardConfig,
    recent: VecDeque<Instant>,
}

impl RestartGuard {
    pub fn new(config: RestartGuardConfig) -> Self {
        Self {
            config,
            recent: VecDeque::new(),
        }
    }

    pub fn config(&self) -> RestartGuardConfig {
        self.config
    }

    /// Record a restart at `now`.
    ///
    /// Fails once more than `limit` restarts fall inside the window ending at
    /// `now`.
    pub fn record(&mut self, now: Instant) -> Result<(), EngineError> {
        while let Some(oldest) = self.recent.front() {
            if now.saturating_duration_since(*oldest) > self.config.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.push_back(now);

        if self.recent.len() > self.config.limit {
            return Err(EngineError::RunawayRestarts {
                restarts: self.recent.len(),
                window: self.config.window,
            });
        }
        Ok(())
    }

    /// Restarts currently inside the window.
    pub fn recent(&self) -> usize {
        self.recent.len()
    }
}
