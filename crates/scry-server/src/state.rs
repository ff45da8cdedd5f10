//! Shared application state.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use crate::events::{BoardChanged, EVENT_BUFFER};
use scry_board::{BoardStore, ExecutionSession, SessionOutcome, ShareId};
use scry_render::Rasterizer;

/// Shared state across all request handlers.
///
/// Cloned for each request; everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    session: ExecutionSession,
    rasterizer: Rasterizer,
    /// Base URL for view links, without a trailing slash.
    public_url: Arc<str>,
    /// Bearer token for the RPC surface; `None` leaves it open.
    auth_token: Option<Arc<str>>,
    events: broadcast::Sender<BoardChanged>,
}

impl AppState {
    pub fn new(
        session: ExecutionSession,
        rasterizer: Rasterizer,
        public_url: &str,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            session,
            rasterizer,
            public_url: public_url.trim_end_matches('/').into(),
            auth_token: auth_token.filter(|t| !t.is_empty()).map(Into::into),
            events: broadcast::channel(EVENT_BUFFER).0,
        }
    }

    pub fn session(&self) -> &ExecutionSession {
        &self.session
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        self.session.store()
    }

    pub fn rasterizer(&self) -> &Rasterizer {
        &self.rasterizer
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Announce a committed execution to subscribed viewers.
    pub fn publish(&self, outcome: &SessionOutcome) {
        let changed = BoardChanged::from(outcome);
        match self.events.send(changed) {
            Ok(receivers) => trace!(receivers, "Board change published"),
            Err(_) => trace!("No viewers subscribed"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardChanged> {
        self.events.subscribe()
    }

    /// Public link to a board's composed view.
    pub fn view_url(&self, share_id: &ShareId) -> String {
        format!("{}/view/{share_id}", self.public_url)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("public_url", &self.public_url)
            .field("auth", &self.auth_token.is_some())
            .field("rasterizer", &self.rasterizer)
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}
