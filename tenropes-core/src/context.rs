use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::models::ChannelId;

#[derive(Debug, Default)]
struct ContextState {
    active_channel: Option<ChannelId>,
    notifications_refused: bool,
}

/// Client-wide state shared by the application shell and the channel sessions it opens:
/// which channel is on screen, and whether the user already refused notifications.
///
/// Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    state: Arc<Mutex<ContextState>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_channel(&self) -> Option<ChannelId> {
        self.state().active_channel
    }

    pub fn set_active_channel(&self, channel: Option<ChannelId>) {
        debug!("active channel set to {:?}", channel);
        self.state().active_channel = channel;
    }

    /// Clears the active channel, but only if `channel` is still the one on screen.
    pub fn leave_channel(&self, channel: ChannelId) {
        let mut state = self.state();
        if state.active_channel == Some(channel) {
            debug!("leaving channel {channel}");
            state.active_channel = None;
        }
    }

    pub fn notifications_refused(&self) -> bool {
        self.state().notifications_refused
    }

    pub fn mark_notifications_refused(&self) {
        self.state().notifications_refused = true;
    }

    /// Whether a notification for a message in `incoming` should be shown.
    /// Messages for the channel already on screen are not announced.
    pub fn should_alert(&self, incoming: Option<ChannelId>) -> bool {
        let state = self.state();
        !state.notifications_refused && state.active_channel != incoming
    }
}
