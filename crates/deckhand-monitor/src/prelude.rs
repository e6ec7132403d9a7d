//! Common imports for typical monitor usage.
//!
//! This module intentionally exports the types most application code touches
//! so examples and consumers need fewer import lines.
pub use crate::{
    ConnectionBadge, ConnectionState, DeployState, Monitor, MonitorBuilder, MonitorError,
    MonitorOptions, MonitorSession, RenderAdapter, SessionError, SessionEvent, SessionMode,
    SessionState, StatusSnapshot, StreamKind, Subject, ViewModel, ViewportMetrics,
};
