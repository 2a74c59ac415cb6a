//! Integration tests for the networked game
//!
//! These tests start a real server on a loopback port and talk to it through
//! the client library and raw WebSocket connections.

use client::error::ClientError;
use client::network::{Client, ClientConfig};
use futures_util::{SinkExt, StreamExt};
use server::auth::{Claims, StaticTokenVerifier};
use server::config::ServerConfig;
use server::game::Game;
use server::network::Server;
use server::store::{MemoryCubeStore, MemoryUserStore, UserStore};
use shared::{decode, encode, ClientMessage, Face, ServerMessage, Upgrade};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};

struct TestServer {
    url: String,
    game: Arc<Game>,
    users: Arc<MemoryUserStore>,
}

async fn start_server(config: ServerConfig) -> TestServer {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..config
    };
    let verifier = StaticTokenVerifier::new()
        .with_token("alice-token", Claims::new("alice"))
        .with_token("bob-token", Claims::new("bob"));
    let users = Arc::new(MemoryUserStore::new());

    let game = Arc::new(Game::new(
        config.clone(),
        Arc::new(verifier),
        users.clone(),
        Arc::new(MemoryCubeStore::new()),
    ));
    let server = Server::bind(&config.bind_addr, Arc::clone(&game))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    TestServer {
        url: format!("ws://{}", addr),
        game,
        users,
    }
}

fn small_config(grid_size: usize) -> ServerConfig {
    ServerConfig {
        grid_size,
        ..ServerConfig::default()
    }
}

fn client_config(url: &str, token: &str) -> ClientConfig {
    ClientConfig {
        server_url: url.to_string(),
        token: token.to_string(),
        seed: Some(42),
        ..ClientConfig::default()
    }
}

async fn connect(url: &str, token: &str) -> Client {
    Client::connect(&client_config(url, token)).await.unwrap()
}

async fn next(client: &mut Client) -> ServerMessage {
    timeout(Duration::from_secs(5), client.recv())
        .await
        .expect("timed out waiting for server")
        .unwrap()
        .expect("connection closed")
}

/// Reads until a message satisfies `pred`, returning it.
async fn wait_for<F>(client: &mut Client, pred: F) -> ServerMessage
where
    F: Fn(&ServerMessage) -> bool,
{
    loop {
        let message = next(client).await;
        if pred(&message) {
            return message;
        }
    }
}

/// Connects and consumes the three initial pushes.
async fn join(url: &str, token: &str) -> Client {
    let mut client = connect(url, token).await;
    for _ in 0..3 {
        next(&mut client).await;
    }
    client
}

/// CONNECTION AND AUTHENTICATION TESTS
mod connection_tests {
    use super::*;

    fn refused_status(result: Result<Client, ClientError>) -> StatusCode {
        match result {
            Err(ClientError::WebSocket(tungstenite::Error::Http(response))) => response.status(),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("handshake should have been refused"),
        }
    }

    #[tokio::test]
    async fn unknown_token_is_refused() {
        let server = start_server(small_config(2)).await;
        let result = Client::connect(&client_config(&server.url, "forged")).await;
        assert_eq!(refused_status(result), StatusCode::UNAUTHORIZED);
        assert_eq!(server.game.connection_count(), 0);
    }

    #[tokio::test]
    async fn missing_token_is_refused() {
        let server = start_server(small_config(2)).await;
        let result = tokio_tungstenite::connect_async(server.url.as_str()).await;
        match result {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED)
            }
            other => panic!("expected refusal, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn initial_push_order() {
        let server = start_server(small_config(2)).await;
        let mut client = connect(&server.url, "alice-token").await;

        match next(&mut client).await {
            ServerMessage::CubeStateUpdate(snapshot) => {
                assert_eq!(snapshot.layers.len(), 2);
                assert_eq!(snapshot.current_layer, 1);
                assert_eq!(snapshot.layers[0].remaining_blocks(), 24);
            }
            other => panic!("expected cube state first, got {:?}", other),
        }
        assert_eq!(next(&mut client).await, ServerMessage::CurrentLayer(1));
        match next(&mut client).await {
            ServerMessage::UserData(data) => {
                assert_eq!(data.points, 0);
                assert!(data.owned_upgrades.is_empty());
            }
            other => panic!("expected user data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn token_in_query_parameter() {
        let server = start_server(small_config(2)).await;
        let config = ClientConfig {
            token_in_query: true,
            ..client_config(&server.url, "bob-token")
        };
        let mut client = Client::connect(&config).await.unwrap();
        assert!(matches!(
            next(&mut client).await,
            ServerMessage::CubeStateUpdate(_)
        ));
        assert_eq!(server.game.connection_count(), 1);
    }

    #[tokio::test]
    async fn full_server_refuses_with_503() {
        let server = start_server(ServerConfig {
            max_clients: 1,
            ..small_config(2)
        })
        .await;

        let _alice = join(&server.url, "alice-token").await;
        let result = Client::connect(&client_config(&server.url, "bob-token")).await;
        assert_eq!(refused_status(result), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn disconnect_releases_connection() {
        let server = start_server(small_config(2)).await;
        let client = join(&server.url, "alice-token").await;
        assert_eq!(server.game.connection_count(), 1);

        drop(client);
        for _ in 0..50 {
            if server.game.connection_count() == 0 {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("connection was never released");
    }
}

/// GAMEPLAY OVER THE WIRE
mod gameplay_tests {
    use super::*;

    #[tokio::test]
    async fn removal_is_broadcast_and_points_are_private() {
        let server = start_server(small_config(2)).await;
        let mut alice = join(&server.url, "alice-token").await;
        let mut bob = join(&server.url, "bob-token").await;

        assert!(alice.click(Some((Face::Front, 0, 0))).await.unwrap());

        wait_for(&mut bob, |m| {
            matches!(m, ServerMessage::CubeStateUpdate(s) if s.layers[0].front.get(0, 0) == Some(false))
        })
        .await;
        wait_for(&mut alice, |m| {
            matches!(m, ServerMessage::UserData(data) if data.points == 1)
        })
        .await;

        let board = wait_for(&mut bob, |m| {
            matches!(m, ServerMessage::LeaderboardUpdate(entries) if !entries.is_empty())
        })
        .await;
        if let ServerMessage::LeaderboardUpdate(entries) = board {
            assert_eq!(entries[0].id, "alice");
            assert_eq!(entries[0].points, 1);
        }
        assert_eq!(bob.state().user.points, 0);
    }

    #[tokio::test]
    async fn clearing_layer_promotes_for_everyone() {
        let server = start_server(small_config(1)).await;
        let mut alice = join(&server.url, "alice-token").await;
        let mut bob = join(&server.url, "bob-token").await;

        for _ in 0..6 {
            assert!(alice.click(None).await.unwrap());
        }
        assert!(!alice.click(None).await.unwrap());

        for client in [&mut alice, &mut bob] {
            wait_for(client, |m| {
                matches!(m, ServerMessage::CubeStateUpdate(s) if s.current_layer == 2)
            })
            .await;
            assert_eq!(client.state().current_layer, 2);
            assert_eq!(client.state().remaining_blocks(), 6);
        }
    }

    #[tokio::test]
    async fn purchase_applies_multiplier_server_side() {
        let server = start_server(small_config(2)).await;
        let mut record = server.users.load_or_create("alice").unwrap();
        record.points = 60;
        server.users.save(&record).unwrap();

        let mut alice = join(&server.url, "alice-token").await;
        assert_eq!(alice.state().user.points, 60);

        alice
            .send(&ClientMessage::PurchaseUpgrade {
                upgrade: "double".to_string(),
            })
            .await
            .unwrap();
        wait_for(&mut alice, |m| {
            matches!(m, ServerMessage::UserData(d) if d.owned_upgrades.contains(&Upgrade::Double))
        })
        .await;
        assert_eq!(alice.state().user.points, 10);

        alice.click(None).await.unwrap();
        wait_for(&mut alice, |m| {
            matches!(m, ServerMessage::UserData(d) if d.points == 12)
        })
        .await;
    }

    #[tokio::test]
    async fn unaffordable_purchase_is_a_no_op_reply() {
        let server = start_server(small_config(2)).await;
        let mut alice = join(&server.url, "alice-token").await;

        alice
            .send(&ClientMessage::PurchaseUpgrade {
                upgrade: "nuker".to_string(),
            })
            .await
            .unwrap();
        match next(&mut alice).await {
            ServerMessage::UserData(data) => {
                assert_eq!(data.points, 0);
                assert!(data.owned_upgrades.is_empty());
            }
            other => panic!("expected user data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_frames_do_not_drop_the_connection() {
        let server = start_server(small_config(2)).await;

        let mut request = server.url.as_str().into_client_request().unwrap();
        request
            .headers_mut()
            .insert("authorization", "Bearer alice-token".parse().unwrap());
        let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

        socket.send(Message::text("not json".to_string())).await.unwrap();
        socket
            .send(Message::text(
                r#"{"event":"removeBlock","data":{"face":"inside","row":0,"col":0}}"#.to_string(),
            ))
            .await
            .unwrap();
        socket
            .send(Message::text(encode(&ClientMessage::RequestLeaderboard).unwrap()))
            .await
            .unwrap();

        let leaderboard = timeout(Duration::from_secs(5), async {
            while let Some(frame) = socket.next().await {
                if let Message::Text(text) = frame.unwrap() {
                    let message: ServerMessage = decode(text.as_str()).unwrap();
                    if let ServerMessage::LeaderboardUpdate(entries) = message {
                        return entries;
                    }
                }
            }
            panic!("connection closed");
        })
        .await
        .unwrap();

        assert_eq!(leaderboard.len(), 1);
        assert_eq!(leaderboard[0].username.as_deref(), Some("Anonymous"));
    }

    #[tokio::test]
    async fn username_change_shows_on_leaderboard() {
        let server = start_server(small_config(2)).await;
        let mut alice = join(&server.url, "alice-token").await;

        alice
            .send(&ClientMessage::UpdateUsername("Digger".to_string()))
            .await
            .unwrap();
        alice
            .send(&ClientMessage::RequestLeaderboard)
            .await
            .unwrap();

        wait_for(&mut alice, |m| {
            matches!(m, ServerMessage::LeaderboardUpdate(entries)
                if entries.first().and_then(|e| e.username.as_deref()) == Some("Digger"))
        })
        .await;
    }
}
