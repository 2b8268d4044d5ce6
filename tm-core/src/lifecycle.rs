//! App lifecycle (foreground/background) signal.
//!
//! The mobile shell reports platform app-state transitions here; the
//! connection manager watches the channel to reconnect on foregrounding
//! and to suppress automatic reconnect scheduling while backgrounded.

use tokio::sync::watch;

/// Coarse application lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleState {
    /// App is active and visible.
    Foreground,
    /// App is backgrounded; the socket stays open but no new automatic
    /// reconnect attempts are scheduled.
    Background,
}

/// Publisher/observer for lifecycle transitions.
pub struct AppLifecycle {
    tx: watch::Sender<AppLifecycleState>,
}

impl AppLifecycle {
    /// Create a lifecycle signal starting in the foreground state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AppLifecycleState::Foreground);
        Self { tx }
    }

    /// Report a platform app-state transition.
    pub fn set_state(&self, state: AppLifecycleState) {
        let _ = self.tx.send(state);
    }

    /// Current state.
    pub fn state(&self) -> AppLifecycleState {
        *self.tx.borrow()
    }

    /// Whether the app is currently foregrounded.
    pub fn is_foreground(&self) -> bool {
        self.state() == AppLifecycleState::Foreground
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<AppLifecycleState> {
        self.tx.subscribe()
    }
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transitions_observed() {
        let lifecycle = AppLifecycle::new();
        assert!(lifecycle.is_foreground());

        let mut rx = lifecycle.subscribe();
        lifecycle.set_state(AppLifecycleState::Background);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AppLifecycleState::Background);
        assert!(!lifecycle.is_foreground());

        lifecycle.set_state(AppLifecycleState::Foreground);
        rx.changed().await.unwrap();
        assert!(lifecycle.is_foreground());
    }
}
