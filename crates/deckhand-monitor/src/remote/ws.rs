//! Live frame feed over the panel's WebSocket endpoint.

use futures::StreamExt as _;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::config::RemoteConfig;
use crate::errors::TransportError;
use crate::subject::Subject;
use crate::transport::LiveFeed;

/// Opens the live stream for a subject.
///
/// Text messages flow through as frames; ping/pong and binary traffic are
/// absorbed here, and a close handshake or connection drop ends the feed.
pub(super) async fn connect(
    config: &RemoteConfig,
    subject: &Subject,
) -> Result<LiveFeed, TransportError> {
    let url = config.stream_url(subject);
    let (socket, _response) = connect_async(url.as_str())
        .await
        .map_err(|err| TransportError::io(err.to_string()))?;
    debug!(subject = %subject, "websocket stream opened");

    let frames = futures::stream::try_unfold(socket, |mut socket| async move {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some((text.to_string(), socket))),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(TransportError::io(err.to_string())),
                None => return Ok(None),
            }
        }
    });

    Ok(LiveFeed {
        frames: Box::pin(frames),
    })
}
