use crate::error::ClientError;
use crate::game::ClientGameState;
use crate::input::{parse_command, Command, HELP};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{decode, encode, ClientMessage, Face, ServerMessage, TOKEN_QUERY_PARAM};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings, built from command-line arguments by the binary.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the server, e.g. `ws://127.0.0.1:4000`
    pub server_url: String,
    /// Bearer credential presented during the handshake
    pub token: String,
    /// Send the token as a query parameter instead of a header
    pub token_in_query: bool,
    /// Start with the auto-clicker running if an auto-click tier is owned
    pub auto_click: bool,
    /// Seed for block selection; random when unset
    pub seed: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:4000".to_string(),
            token: String::new(),
            token_in_query: false,
            auto_click: true,
            seed: None,
        }
    }
}

pub struct Client {
    write: SplitSink<Socket, Message>,
    read: SplitStream<Socket>,
    state: ClientGameState,
    rng: StdRng,
    auto_click: bool,
    auto_timer: Option<(Duration, Interval)>,
    leaderboard_requested: bool,
}

impl Client {
    /// Opens the WebSocket and presents the credential. The server refuses
    /// the handshake outright when the credential does not verify.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let url = if config.token_in_query {
            with_query_token(&config.server_url, &config.token)
        } else {
            config.server_url.clone()
        };

        let mut request = url.as_str().into_client_request()?;
        if !config.token_in_query {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);
        }

        let (socket, _) = connect_async(request).await?;
        info!("Connected to {}", config.server_url);

        let (write, read) = socket.split();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            write,
            read,
            state: ClientGameState::new(),
            rng,
            auto_click: config.auto_click,
            auto_timer: None,
            leaderboard_requested: false,
        })
    }

    pub fn state(&self) -> &ClientGameState {
        &self.state
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let text = encode(message)?;
        self.write.send(Message::text(text)).await?;
        Ok(())
    }

    /// Waits for the next server push, applies it to the local mirror and
    /// returns it. `Ok(None)` means the server closed the connection.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        while let Some(frame) = self.read.next().await {
            match frame? {
                Message::Text(text) => {
                    let message: ServerMessage = decode(text.as_str())?;
                    self.state.apply(message.clone());
                    return Ok(Some(message));
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    /// One click: reports the base point and removes a block. Returns false
    /// when there is nothing left to break.
    pub async fn click(&mut self, target: Option<(Face, usize, usize)>) -> Result<bool, ClientError> {
        let target = match target {
            Some((face, row, col)) if self.state.is_present(face, row, col) => Some((face, row, col)),
            Some(_) => None,
            None => self.state.random_block(&mut self.rng),
        };
        let Some((face, row, col)) = target else {
            return Ok(false);
        };

        self.state.predict_removal(face, row, col);
        self.send(&ClientMessage::RemoveBlock { face, row, col }).await?;
        self.send(&ClientMessage::UpdatePoints { points: 1 }).await?;
        Ok(true)
    }

    /// Keeps the auto-click timer in step with the fastest owned tier.
    fn sync_auto_timer(&mut self) {
        let wanted = if self.auto_click {
            self.state.auto_click_interval()
        } else {
            None
        };

        match (wanted, &self.auto_timer) {
            (Some(period), Some((current, _))) if *current == period => {}
            (Some(period), _) => {
                info!("Auto-clicker running every {:?}", period);
                let mut timer = interval(period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.auto_timer = Some((period, timer));
            }
            (None, Some(_)) => {
                info!("Auto-clicker stopped");
                self.auto_timer = None;
            }
            (None, None) => {}
        }
    }

    fn show(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::CubeStateUpdate(_) | ServerMessage::CurrentLayer(_) => {
                debug!("{}", self.state.status_line());
            }
            ServerMessage::UserData(_) => println!("{}", self.state.status_line()),
            ServerMessage::LeaderboardUpdate(_) if self.leaderboard_requested => {
                self.leaderboard_requested = false;
                for line in self.state.leaderboard_lines() {
                    println!("{}", line);
                }
            }
            ServerMessage::LeaderboardUpdate(entries) => {
                debug!("Leaderboard updated ({} entries)", entries.len())
            }
            ServerMessage::Error { reason } => println!("server error: {}", reason),
        }
    }

    /// Runs one typed command. Returns false when the player quits.
    async fn execute(&mut self, command: Command) -> Result<bool, ClientError> {
        match command {
            Command::Click(target) => {
                if !self.click(target).await? {
                    println!("nothing to break there");
                }
            }
            Command::Buy(upgrade) => {
                self.send(&ClientMessage::PurchaseUpgrade {
                    upgrade: upgrade.id().to_string(),
                })
                .await?
            }
            Command::Nuke => self.send(&ClientMessage::NukeLayer).await?,
            Command::Leaderboard => {
                self.leaderboard_requested = true;
                self.send(&ClientMessage::RequestLeaderboard).await?;
            }
            Command::Rename(name) => self.send(&ClientMessage::UpdateUsername(name)).await?,
            Command::Auto(enabled) => {
                self.auto_click = enabled;
                if enabled && self.state.auto_click_interval().is_none() {
                    println!("no auto-clicker owned yet");
                }
            }
            Command::Status => println!("{}", self.state.status_line()),
            Command::Shop => {
                for line in self.state.shop_lines() {
                    println!("{}", line);
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Interactive loop over server pushes, stdin commands and auto-clicks.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);

        loop {
            self.sync_auto_timer();

            tokio::select! {
                frame = self.read.next() => {
                    let Some(frame) = frame else {
                        return Err(ClientError::Closed);
                    };
                    match frame? {
                        Message::Text(text) => match decode::<ServerMessage>(text.as_str()) {
                            Ok(message) => {
                                self.state.apply(message.clone());
                                self.show(&message);
                            }
                            Err(e) => warn!("Ignoring malformed server message: {}", e),
                        },
                        Message::Close(_) => return Err(ClientError::Closed),
                        _ => {}
                    }
                }

                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    match parse_command(&line) {
                        Ok(Some(command)) => {
                            if !self.execute(command).await? {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    }
                }

                _ = next_tick(&mut self.auto_timer) => {
                    self.click(None).await?;
                }
            }
        }

        let _ = self.write.close().await;
        Ok(())
    }
}

/// Appends the token as a query parameter. A bare `ws://host:port` gets a
/// `/` path first, since the handshake needs a request path.
fn with_query_token(server_url: &str, token: &str) -> String {
    let authority_start = server_url.find("://").map_or(0, |i| i + 3);
    let rest = &server_url[authority_start..];
    let path_start = rest.find(['/', '?', '#']).map_or(server_url.len(), |i| authority_start + i);

    let mut url = server_url.to_string();
    if !server_url[path_start..].starts_with('/') {
        url.insert(path_start, '/');
    }

    let (base, fragment) = match url.find('#') {
        Some(i) => url.split_at(i),
        None => (url.as_str(), ""),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}{}", base, separator, TOKEN_QUERY_PARAM, token, fragment)
}

async fn next_tick(timer: &mut Option<(Duration, Interval)>) {
    match timer {
        Some((_, timer)) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_token_adds_missing_path() {
        assert_eq!(
            with_query_token("ws://127.0.0.1:4000", "bob-token"),
            "ws://127.0.0.1:4000/?token=bob-token"
        );
    }

    #[test]
    fn test_query_token_keeps_existing_path_and_query() {
        assert_eq!(
            with_query_token("ws://example.com/game", "t"),
            "ws://example.com/game?token=t"
        );
        assert_eq!(
            with_query_token("ws://example.com/?room=1", "t"),
            "ws://example.com/?room=1&token=t"
        );
        assert_eq!(
            with_query_token("ws://example.com?room=1", "t"),
            "ws://example.com/?room=1&token=t"
        );
    }

    #[test]
    fn test_query_token_request_is_valid() {
        let url = with_query_token("ws://127.0.0.1:4000", "bob-token");
        let request = url.as_str().into_client_request().unwrap();
        assert_eq!(request.uri().path(), "/");
        assert_eq!(request.uri().query(), Some("token=bob-token"));
    }
}
