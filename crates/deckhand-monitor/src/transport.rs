use std::pin::Pin;

use crate::errors::TransportError;
use crate::status::StatusSnapshot;
use crate::subject::Subject;

/// Raw text frames produced by a live stream connection.
///
/// The stream ends (`None`) on an orderly server close; read failures
/// surface as `Err` items.
pub type FrameStream =
    Pin<Box<dyn futures::Stream<Item = Result<String, TransportError>> + Send + 'static>>;

/// Open live connection returned by [`MonitorBackend::connect`].
pub struct LiveFeed {
    /// Inbound wire frames, one classified message per item.
    pub frames: FrameStream,
}

/// Stored outcome for a subject that already finished.
#[derive(Clone, Debug, PartialEq)]
pub struct FinishedRecord {
    /// Terminal status the subject ended with.
    pub status: StatusSnapshot,
    /// Full captured output, newline-joined.
    pub logs: String,
}

/// Result of the one-shot history lookup performed before going live.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoricalOutcome {
    /// The subject already reached a terminal state; no live stream is
    /// needed.
    Finished(FinishedRecord),
    /// The subject is still running and the session should go live.
    InProgress,
}

/// Backend seam used by monitor sessions: one history lookup plus one live
/// connection per attempt.
///
/// Implemented by [`crate::remote::RemoteBackend`] in production and by
/// scripted fakes in tests.
#[async_trait::async_trait]
pub trait MonitorBackend: Send + Sync {
    /// Fetches the stored outcome for `subject`, or
    /// [`HistoricalOutcome::InProgress`] when it has not finished yet.
    async fn fetch_finished(&self, subject: &Subject) -> Result<HistoricalOutcome, TransportError>;

    /// Opens a live frame stream for `subject`.
    async fn connect(&self, subject: &Subject) -> Result<LiveFeed, TransportError>;
}
