//! Client for the lending desk.
//!
//! Every call returns a [`Response`]: transport failures (timeout, refused
//! connection, garbled reply) are reported as a failure response rather than
//! as an error, so callers only ever inspect one shape.

use std::time::Duration;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{read_frame, write_frame, FrameError};
use crate::{
    config::ClientConfig,
    models::{Request, Response},
};

/// Replies larger than this are treated as a protocol error
const DEFAULT_MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Timeout: el servidor no respondió a tiempo.")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Error de conexión: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Error inesperado: {0}")]
    Protocol(String),
}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(e) => ClientError::Connection(e),
            FrameError::TooLarge(limit) => {
                ClientError::Protocol(format!("respuesta mayor que {} bytes", limit))
            }
        }
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

pub struct LibraryClient {
    address: String,
    timeout: Duration,
    max_response_bytes: usize,
    connection: Option<Connection>,
}

impl LibraryClient {
    /// Client for the service at `address` (`host:port`). Connects lazily.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            connection: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.server_address(), config.timeout())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn loan_by_isbn(&mut self, isbn: &str, borrower: &str) -> Response {
        self.send_request(Request::loan_by_isbn(isbn, borrower)).await
    }

    pub async fn loan_by_title(&mut self, title: &str, borrower: &str) -> Response {
        self.send_request(Request::loan_by_title(title, borrower)).await
    }

    pub async fn query_by_isbn(&mut self, isbn: &str) -> Response {
        self.send_request(Request::query_by_isbn(isbn)).await
    }

    pub async fn return_by_isbn(&mut self, isbn: &str) -> Response {
        self.send_request(Request::return_by_isbn(isbn)).await
    }

    /// Send one request and wait for its reply.
    ///
    /// On any failure the connection is dropped, so the next call starts
    /// from a fresh channel instead of one left mid-exchange.
    pub async fn send_request(&mut self, request: Request) -> Response {
        let action = request.action();

        match self.exchange(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%action, address = %self.address, "Request failed: {}", e);
                self.connection = None;
                Response::transport_failure(e.to_string())
            }
        }
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response, ClientError> {
        let payload =
            serde_json::to_vec(request).map_err(|e| ClientError::Protocol(e.to_string()))?;

        let limit = self.timeout;
        let max_bytes = self.max_response_bytes;
        let connection = self.connect().await?;

        timeout(limit, write_frame(&mut connection.writer, &payload)).await??;

        let frame = timeout(limit, read_frame(&mut connection.reader, max_bytes))
            .await??
            .ok_or_else(|| ClientError::Protocol("conexión cerrada por el servidor".to_string()))?;

        serde_json::from_slice(&frame).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    async fn connect(&mut self) -> Result<&mut Connection, ClientError> {
        if self.connection.is_none() {
            let stream = timeout(self.timeout, TcpStream::connect(&self.address)).await??;
            tracing::debug!("Connected to {}", self.address);

            let (reader, writer) = stream.into_split();
            self.connection = Some(Connection {
                reader: BufReader::new(reader),
                writer,
            });
        }

        self.connection
            .as_mut()
            .ok_or_else(|| ClientError::Protocol("sin conexión".to_string()))
    }
}
