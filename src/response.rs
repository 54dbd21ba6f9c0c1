//! Hand-built HTTP response writer.

use bytes::Bytes;
use serde::Serialize;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const STATUS_LINE: &str = "HTTP/1.1 200 OK";

/// Acknowledgement sent for every parsed request
#[derive(Debug, Clone, Serialize)]
pub struct Acknowledgement {
    pub status: &'static str,
    pub message: &'static str,
}

impl Default for Acknowledgement {
    fn default() -> Self {
        Self {
            status: "success",
            message: "Request acknowledged by Nitro Enclave",
        }
    }
}

/// Failure while sending a response. The connection is closed regardless.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to serialize response body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to send response: {0}")]
    Io(#[from] io::Error),
}

/// A `200 OK` response with a JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    content_type: &'static str,
    body: Bytes,
}

impl Response {
    /// Serialize `value` as the response body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, WriteError> {
        let body = serde_json::to_vec(value)?;
        Ok(Self {
            content_type: "application/json",
            body: Bytes::from(body),
        })
    }

    /// The fixed acknowledgement response.
    pub fn acknowledgement() -> Result<Self, WriteError> {
        Self::json(&Acknowledgement::default())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Serialize to wire format.
    ///
    /// `Content-Length` is always the exact byte length of the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            STATUS_LINE,
            self.content_type,
            self.body.len()
        );

        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Write the response and flush. Does not close the stream.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), WriteError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}
