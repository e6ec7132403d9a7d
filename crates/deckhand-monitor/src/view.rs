//! Render adapter: turns raw session state into a display-ready view model.
//!
//! Decoding escape sequences on every state change is wasteful for long
//! logs, so the adapter memoizes decoded lines keyed by their raw text and
//! carries the cache across renders. Lines that fall out of the buffer drop
//! out of the cache on the next render.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ansi::{self, Segment};
use crate::session::{ConnectionState, SessionState};
use crate::status::StatusSnapshot;

/// Vertical slack, in pixels, within which the viewport still counts as
/// pinned to the tail.
const FOLLOW_TAIL_SLACK_PX: f64 = 24.0;

/// Connection indicator shown next to the log viewport.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionBadge {
    Connecting,
    Live,
    Disconnected,
}

impl ConnectionBadge {
    /// Maps the session connection state onto a badge.
    pub fn from_connection(connection: ConnectionState) -> Self {
        match connection {
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Open => Self::Live,
            ConnectionState::Idle | ConnectionState::Closed => Self::Disconnected,
        }
    }

    /// Returns the badge caption.
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Live => "Live",
            Self::Disconnected => "Disconnected",
        }
    }
}

/// Scroll geometry of the log viewport, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportMetrics {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl ViewportMetrics {
    /// True when the viewport sits within the follow slack of the bottom.
    ///
    /// An empty viewport counts as near the tail, so new sessions follow
    /// output until the user scrolls away.
    pub fn is_near_tail(&self) -> bool {
        self.content_height - (self.scroll_top + self.viewport_height) <= FOLLOW_TAIL_SLACK_PX
    }
}

/// Display-ready projection of one session state.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewModel {
    pub badge: ConnectionBadge,
    /// Styled segments per visible line, oldest first.
    pub lines: Vec<Arc<[Segment]>>,
    pub line_count: usize,
    /// Whether the viewport should stick to the newest line.
    pub follow_tail: bool,
    pub status: Option<StatusSnapshot>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Stateful projection from [`SessionState`] to [`ViewModel`].
///
/// Hold one adapter per rendered session; the decode cache is keyed by raw
/// line text and shared across consecutive renders.
#[derive(Default)]
pub struct RenderAdapter {
    cache: HashMap<String, Arc<[Segment]>>,
}

impl RenderAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Projects the session state onto a view model, reusing decoded lines
    /// from the previous render where the raw text is unchanged.
    pub fn render(&mut self, state: &SessionState, viewport: ViewportMetrics) -> ViewModel {
        let mut next_cache = HashMap::with_capacity(state.lines.len());
        let mut lines = Vec::with_capacity(state.lines.len());
        for raw in &state.lines {
            let decoded = if let Some(found) = next_cache.get(raw) {
                Arc::clone(found)
            } else if let Some(found) = self.cache.get(raw) {
                Arc::clone(found)
            } else {
                Arc::from(ansi::decode(raw))
            };
            next_cache.insert(raw.clone(), Arc::clone(&decoded));
            lines.push(decoded);
        }
        self.cache = next_cache;

        ViewModel {
            badge: ConnectionBadge::from_connection(state.connection),
            line_count: lines.len(),
            lines,
            follow_tail: viewport.is_near_tail(),
            status: state.status.clone(),
            is_loading: state.is_loading,
            error: state.error.clone(),
        }
    }
}
