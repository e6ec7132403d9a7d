//! Real-time deployment and application monitoring for a self-hosted panel.
//!
//! A [`Monitor`] opens per-subject [`session::MonitorSession`]s that first
//! look up the stored outcome of a finished run, then follow the live
//! WebSocket stream with reconnect backoff until the subject reaches a
//! terminal state. [`view::RenderAdapter`] turns session state into a
//! display-ready view model with ANSI-styled log lines.
//!
//! # Following a deployment
//!
//! ```no_run
//! use deckhand_monitor::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), MonitorError> {
//! deckhand_monitor::init_observability();
//!
//! let monitor = Monitor::from_env()?;
//! let mut session = monitor.session(Subject::deployment("dep-42"));
//! session.start();
//!
//! let mut state = session.state();
//! let mut renderer = RenderAdapter::new();
//! while state.changed().await.is_ok() {
//!     let view = renderer.render(&state.borrow_and_update(), ViewportMetrics::default());
//!     println!("[{}] {} lines", view.badge.label(), view.line_count);
//!     if view.status.as_ref().is_some_and(|s| s.status.is_terminal()) {
//!         break;
//!     }
//! }
//! session.stop();
//! # Ok(())
//! # }
//! ```

/// Escape-code decoding into styled text segments.
pub mod ansi;
/// Reconnect backoff policy.
pub mod backoff;
/// Public error types used by the monitor API.
pub mod errors;
/// Wire frame classification into stream events.
pub mod event;
/// Monitor entry point and builder.
pub mod monitor;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Remote panel backend over REST and WebSocket.
pub mod remote;
/// Per-subject streaming session and its driver.
pub mod session;
/// Deployment lifecycle states and status snapshots.
pub mod status;
/// Monitorable subjects and their stream channels.
pub mod subject;
/// Backend contract between sessions and transports.
pub mod transport;
/// Render adapter producing display-ready view models.
pub mod view;

pub use ansi::{AnsiColor, Segment, TextStyle, decode};
pub use backoff::ReconnectPolicy;
pub use errors::{ClassifyError, MonitorError, SessionError, TransportError};
pub use event::{StreamEvent, classify};
pub use monitor::{Monitor, MonitorBuilder};
pub use observability::init_observability;
pub use remote::{RemoteBackend, RemoteConfig};
pub use session::{
    ConnectionState, MonitorOptions, MonitorSession, SessionEvent, SessionMode, SessionState,
};
pub use status::{DeployState, StatusSnapshot};
pub use subject::{StreamKind, Subject};
pub use transport::{FinishedRecord, FrameStream, HistoricalOutcome, LiveFeed, MonitorBackend};
pub use view::{ConnectionBadge, RenderAdapter, ViewModel, ViewportMetrics};
