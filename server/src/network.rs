//! Server network layer handling WebSocket connections
//!
//! Each accepted TCP stream is authenticated during the WebSocket handshake,
//! then split into a writer task that drains the connection's outbox and a
//! read loop that feeds decoded requests to the [`Game`].

use crate::auth::{extract_token, Claims};
use crate::error::ServerError;
use crate::game::Game;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{decode, ClientMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, StatusCode};
use tokio_tungstenite::tungstenite::Message;

/// Interval between keepalive pings on an idle connection
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// WebSocket front end for a [`Game`]
pub struct Server {
    listener: TcpListener,
    game: Arc<Game>,
}

impl Server {
    pub async fn bind(addr: &str, game: Arc<Game>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        info!("Server listening on {}", addr);
        Ok(Self { listener, game })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Bind)
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let game = Arc::clone(&self.game);
                    tokio::spawn(handle_connection(stream, addr, game));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

fn reject(status: StatusCode, reason: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason));
    *response.status_mut() = status;
    response
}

/// Runs the handshake, refusing it unless the credential verifies and
/// there is room for another connection.
async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    game: &Game,
) -> Option<(tokio_tungstenite::WebSocketStream<TcpStream>, Claims)> {
    let mut claims = None;

    let callback = |request: &Request, response: Response| {
        if game.is_full() {
            warn!("Refusing {}: server full", addr);
            return Err(reject(
                StatusCode::SERVICE_UNAVAILABLE,
                "server full".to_string(),
            ));
        }

        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = extract_token(authorization, request.uri().query());

        match game.authenticate(token.as_deref()) {
            Ok(verified) => {
                claims = Some(verified);
                Ok(response)
            }
            Err(e) => {
                warn!("Refusing {}: {}", addr, e);
                Err(reject(StatusCode::UNAUTHORIZED, e.to_string()))
            }
        }
    };

    let accepted = accept_hdr_async(stream, callback).await;
    match accepted {
        Ok(ws) => claims.map(|claims| (ws, claims)),
        Err(e) => {
            debug!("Handshake with {} failed: {}", addr, e);
            None
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, game: Arc<Game>) {
    let Some((ws, claims)) = handshake(stream, addr, &game).await else {
        return;
    };

    let (outbox, mut frames) = mpsc::unbounded_channel::<Arc<str>>();
    let id = match game.join(claims, outbox).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Dropping connection from {}: {}", addr, e);
            return;
        }
    };
    info!("Client {} connected from {}", id, addr);

    let (mut write, mut read) = ws.split();

    let writer = tokio::spawn(async move {
        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.tick().await;

        loop {
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    if write.send(Message::text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    if write.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = write.close().await;
    });

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match decode::<ClientMessage>(text.as_str()) {
                Ok(request) => {
                    if let Err(e) = game.handle_message(id, request).await {
                        warn!("Request from client {} failed: {}", id, e);
                        game.report_error(id, &e);
                    }
                }
                Err(e) => warn!("Malformed message from client {}: {}", id, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Read error on client {}: {}", id, e);
                break;
            }
        }
    }

    game.disconnect(id);
    writer.abort();
    info!("Client {} disconnected", id);
}
