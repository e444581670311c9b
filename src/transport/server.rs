//! Service loop.
//!
//! Connections are accepted in the background and each one is served as a
//! strict request/reply channel. Every request goes through a single queue
//! consumed by one loop, so exactly one request is dispatched at a time:
//!
//! `Idle -> Receiving -> Dispatching -> Replying -> Idle`, and `Stopped` once
//! shutdown is requested.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use super::{encode_response, read_frame, write_frame, FrameError};
use crate::{
    error::{AppError, AppResult},
    models::{Request, Response},
    services::LendingService,
};

/// Requests waiting for the loop; connections block once it is full
const QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Receiving,
    Dispatching,
    Replying,
    Stopped,
}

/// One request travelling from a connection to the loop and back
struct Exchange {
    id: Uuid,
    peer: SocketAddr,
    payload: Vec<u8>,
    reply: oneshot::Sender<Vec<u8>>,
}

pub struct Server {
    listener: TcpListener,
    service: Arc<LendingService>,
    max_request_bytes: usize,
}

impl Server {
    /// Bind the reply endpoint
    pub async fn bind(
        address: &str,
        service: Arc<LendingService>,
        max_request_bytes: usize,
    ) -> AppResult<Self> {
        let listener = TcpListener::bind(address).await?;
        tracing::info!("Service listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            service,
            max_request_bytes,
        })
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until `shutdown` completes, then release the endpoint
    pub async fn run<F>(self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            service,
            max_request_bytes,
        } = self;

        let (queue, mut incoming) = mpsc::channel::<Exchange>(QUEUE_DEPTH);
        let acceptor = tokio::spawn(accept_loop(listener, queue, max_request_bytes));
        tokio::pin!(shutdown);

        let mut state = LoopState::Idle;
        loop {
            transition(&mut state, LoopState::Receiving);
            let exchange = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                next = incoming.recv() => match next {
                    Some(exchange) => exchange,
                    None => {
                        tracing::error!("Request queue closed unexpectedly");
                        break;
                    }
                },
            };

            let span = tracing::info_span!(
                "exchange",
                request_id = %exchange.id,
                peer = %exchange.peer,
                action = tracing::field::Empty
            );

            transition(&mut state, LoopState::Dispatching);
            let response = process(&service, &exchange.payload)
                .instrument(span.clone())
                .await;

            transition(&mut state, LoopState::Replying);
            span.in_scope(|| {
                tracing::info!(
                    "Reply sent: {}",
                    if response.is_ok() { "OK" } else { "ERROR" }
                );
            });
            if exchange.reply.send(encode_response(&response)).is_err() {
                tracing::warn!(peer = %exchange.peer, "Client left before the reply was sent");
            }

            transition(&mut state, LoopState::Idle);
        }

        // Dropping the acceptor closes the listener and every open connection
        acceptor.abort();
        if let Err(e) = acceptor.await {
            if !e.is_cancelled() {
                tracing::error!("Acceptor task failed: {}", e);
            }
        }

        transition(&mut state, LoopState::Stopped);
        tracing::info!("Service stopped");
        Ok(())
    }
}

fn transition(state: &mut LoopState, next: LoopState) {
    tracing::trace!(from = ?*state, to = ?next, "Service loop state");
    *state = next;
}

/// Decode and dispatch one payload. Never fails: every path yields a reply.
pub async fn process(service: &Arc<LendingService>, payload: &[u8]) -> Response {
    let request = match Request::decode(payload) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Rejected request: {}", e);
            return e.into_response(None);
        }
    };

    let action = request.action();
    tracing::Span::current().record("action", tracing::field::display(action));
    tracing::info!("Request received");

    // Run on its own task so that a panic turns into a reply instead of
    // taking the loop down
    let service = service.clone();
    let handled = tokio::spawn(async move { service.handle(request).await }.in_current_span());

    match handled.await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => e.into_response(Some(action)),
        Err(e) => AppError::Internal(e.to_string()).into_response(Some(action)),
    }
}

async fn accept_loop(listener: TcpListener, queue: mpsc::Sender<Exchange>, max_request_bytes: usize) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("Connection from {}", peer);
                    connections.spawn(serve_connection(stream, peer, queue.clone(), max_request_bytes));
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    queue: mpsc::Sender<Exchange>,
    max_request_bytes: usize,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let payload = match read_frame(&mut reader, max_request_bytes).await {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(FrameError::TooLarge(limit)) => {
                tracing::warn!("Request from {} exceeds {} bytes, closing", peer, limit);
                let reply = encode_response(&Response::invalid_request());
                if let Err(e) = write_frame(&mut writer, &reply).await {
                    tracing::debug!("Failed to reply to {}: {}", peer, e);
                }
                break;
            }
            Err(FrameError::Io(e)) => {
                tracing::debug!("Read from {} failed: {}", peer, e);
                break;
            }
        };

        let (reply, replied) = oneshot::channel();
        let exchange = Exchange {
            id: Uuid::new_v4(),
            peer,
            payload,
            reply,
        };

        if queue.send(exchange).await.is_err() {
            break;
        }
        let Ok(encoded) = replied.await else {
            break;
        };

        if let Err(e) = write_frame(&mut writer, &encoded).await {
            tracing::debug!("Write to {} failed: {}", peer, e);
            break;
        }
    }

    tracing::debug!("Connection from {} closed", peer);
}
