//! Per-connection request handling.
//!
//! Each accepted connection is served exactly once: parse one request, send
//! the acknowledgement, close. A request that fails to parse gets no
//! response at all; the connection is simply closed.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{Instrument, debug, info, warn};

use crate::request::{ParseError, ParseLimits, Request, parse_request};
use crate::response::{Response, WriteError};
use crate::transport::Connection;

/// Per-connection behaviour, shared read-only by every handler.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub limits: ParseLimits,
    /// Bound on the whole parse phase. `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
}

/// Why a connection ended without a response being delivered.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("timed out after {0:?} waiting for request")]
    TimedOut(Duration),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Serve one connection and close it.
///
/// Outcomes are logged, never returned.
pub async fn handle<C: Connection>(conn: C, settings: &ConnectionSettings) {
    let connection_id = uuid::Uuid::new_v4();
    let peer = conn
        .remote_address()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let span = tracing::info_span!("connection", %connection_id, %peer);

    async move {
        info!("Connection accepted");

        let mut stream = BufReader::new(conn);
        let result = serve(&mut stream, settings).await;

        match result {
            Ok(request) => {
                info!(
                    method = request.method(),
                    path = request.path(),
                    body_len = request.body().len(),
                    "Acknowledged request"
                );
                if !request.body().is_empty() {
                    debug!(body = %String::from_utf8_lossy(request.body()), "Request body");
                }
            }
            Err(HandlerError::Write(e)) => warn!(error = %e, "Error sending response"),
            Err(e) => warn!(error = %e, "Dropping connection without response"),
        }

        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "Error closing connection");
        }
    }
    .instrument(span)
    .await
}

/// Parse one request from `stream` and answer it.
///
/// Nothing is written unless the request parses completely.
pub async fn serve<S>(
    stream: &mut S,
    settings: &ConnectionSettings,
) -> Result<Request, HandlerError>
where
    S: tokio::io::AsyncBufRead + AsyncRead + AsyncWrite + Unpin,
{
    let request = match settings.read_timeout {
        Some(limit) => tokio::time::timeout(limit, parse_request(stream, &settings.limits))
            .await
            .map_err(|_| HandlerError::TimedOut(limit))??,
        None => parse_request(stream, &settings.limits).await?,
    };

    debug!(
        method = request.method(),
        path = request.path(),
        headers = request.headers().len(),
        "Parsed request"
    );

    // The response never depends on the request.
    let response = Response::acknowledgement()?;
    response.write_to(stream).await?;

    Ok(request)
}
