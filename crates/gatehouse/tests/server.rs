//! End-to-end tests: a real server on `127.0.0.1:0` and real
//! `tokio-tungstenite` clients.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::{SinkExt, StreamExt};
use gatehouse::auth::{ManualClock, TokenCodec, TokenConfig};
use gatehouse::prelude::*;
use http::StatusCode;
use http::header::{AUTHORIZATION, ORIGIN};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const SECRET: &str = "verylongsecretkeyforjwt1234567890";

fn token_config() -> TokenConfig {
    TokenConfig::new(SECRET, Duration::from_secs(60)).expect("valid config")
}

fn config() -> ServerConfig {
    let mut config = ServerConfig::new(token_config());
    config.bind_addr = "127.0.0.1:0".into();
    config
}

struct TestServer {
    addr: String,
    handle: ServerHandle,
    codec: Arc<TokenCodec>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), GatehouseError>>,
}

async fn start(config: ServerConfig) -> TestServer {
    let server = GatehouseServer::builder(config)
        .build()
        .await
        .expect("server should bind");
    let addr = server.local_addr().expect("local addr").to_string();
    let handle = server.handle();
    let codec = Arc::clone(server.token_codec());
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run_until(async move {
        let _ = stopped.await;
    }));
    TestServer {
        addr,
        handle,
        codec,
        stop,
        task,
    }
}

async fn connect(
    addr: &str,
    path: &str,
    authorization: Option<&str>,
    origin: Option<&str>,
) -> Result<ClientWs, tungstenite::Error> {
    let mut request = format!("ws://{addr}{path}")
        .into_client_request()
        .expect("valid url");
    if let Some(value) = authorization {
        request
            .headers_mut()
            .insert(AUTHORIZATION, value.parse().expect("header value"));
    }
    if let Some(value) = origin {
        request
            .headers_mut()
            .insert(ORIGIN, value.parse().expect("header value"));
    }
    tokio_tungstenite::connect_async(request)
        .await
        .map(|(ws, _)| ws)
}

async fn connect_as(server: &TestServer, subject: &str) -> ClientWs {
    let token = server.codec.issue(subject).expect("issue");
    connect(&server.addr, "/ws", Some(&format!("Bearer {token}")), None)
        .await
        .expect("upgrade should succeed")
}

fn refusal_status(result: Result<ClientWs, tungstenite::Error>) -> StatusCode {
    match result {
        Err(tungstenite::Error::Http(response)) => response.status(),
        Err(other) => panic!("expected an HTTP refusal, got {other:?}"),
        Ok(_) => panic!("expected the upgrade to be refused"),
    }
}

/// Next data frame from the server, skipping control frames.
async fn next_message(client: &mut ClientWs) -> Message {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("server should answer in time")
            .expect("stream should be open")
            .expect("frame should decode");
        if msg.is_text() || msg.is_binary() {
            return msg;
        }
    }
}

async fn round_trip(client: &mut ClientWs, text: &str) -> String {
    client
        .send(Message::Text(text.to_owned().into()))
        .await
        .expect("send");
    next_message(client)
        .await
        .into_text()
        .expect("text reply")
        .as_str()
        .to_owned()
}

/// Polls `condition` until it holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_valid_bearer_registers_echoes_and_releases_on_close() {
    let server = start(config()).await;
    let mut client = connect_as(&server, "alice").await;

    // The reply proves the message loop is running, and registration
    // finishes before the loop starts.
    assert_eq!(round_trip(&mut client, "hello").await, "Echo: hello");
    assert!(server.handle.is_connected("alice"));
    assert_eq!(server.handle.registry().len(), 1);

    client.close(None).await.expect("close");

    assert!(
        eventually(|| !server.handle.is_connected("alice")).await,
        "entry should be released after close"
    );
}

#[tokio::test]
async fn test_wrong_scheme_is_refused_and_registry_untouched() {
    let server = start(config()).await;

    let result = connect(&server.addr, "/ws", Some("Token abc"), None).await;

    assert_eq!(refusal_status(result), StatusCode::UNAUTHORIZED);
    assert!(server.handle.registry().is_empty());
}

#[tokio::test]
async fn test_missing_header_is_refused() {
    let server = start(config()).await;

    let result = connect(&server.addr, "/ws", None, None).await;

    assert_eq!(refusal_status(result), StatusCode::UNAUTHORIZED);
    assert!(server.handle.registry().is_empty());
}

#[tokio::test]
async fn test_expired_token_is_refused() {
    let server = start(config()).await;
    let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 60 * 60);
    let stale = TokenCodec::with_clock(
        &token_config(),
        ManualClock::new(two_hours_ago),
    )
    .issue("alice")
    .unwrap();

    let result = connect(
        &server.addr,
        "/ws",
        Some(&format!("Bearer {stale}")),
        None,
    )
    .await;

    assert_eq!(refusal_status(result), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_refused() {
    let server = start(config()).await;
    let foreign = TokenCodec::new(
        &TokenConfig::new("y".repeat(48), Duration::from_secs(60)).unwrap(),
    )
    .issue("alice")
    .unwrap();

    let result = connect(
        &server.addr,
        "/ws",
        Some(&format!("Bearer {foreign}")),
        None,
    )
    .await;

    assert_eq!(refusal_status(result), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let server = start(config()).await;
    let token = server.codec.issue("alice").unwrap();

    let result = connect(
        &server.addr,
        "/elsewhere",
        Some(&format!("Bearer {token}")),
        None,
    )
    .await;

    assert_eq!(refusal_status(result), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disallowed_origin_is_forbidden() {
    let mut config = config();
    config.allowed_origins =
        gatehouse::AllowedOrigins::parse("https://game.example");
    let server = start(config).await;
    let token = server.codec.issue("alice").unwrap();
    let bearer = format!("Bearer {token}");

    let refused = connect(
        &server.addr,
        "/ws",
        Some(&bearer),
        Some("https://evil.example"),
    )
    .await;
    assert_eq!(refusal_status(refused), StatusCode::FORBIDDEN);

    let admitted = connect(
        &server.addr,
        "/ws",
        Some(&bearer),
        Some("https://game.example"),
    )
    .await;
    assert!(admitted.is_ok());
}

// =========================================================================
// Sessions
// =========================================================================

#[tokio::test]
async fn test_second_connection_takes_over_and_survives_first_close() {
    let server = start(config()).await;

    let mut first = connect_as(&server, "alice").await;
    assert_eq!(round_trip(&mut first, "one").await, "Echo: one");

    let mut second = connect_as(&server, "alice").await;
    assert_eq!(round_trip(&mut second, "two").await, "Echo: two");

    first.close(None).await.expect("close");
    // Give the first connection's task time to run its release.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(server.handle.is_connected("alice"));
    server
        .handle
        .send_to("alice", &Frame::Text("still here".into()))
        .await
        .expect("second connection should be reachable");
    let msg = next_message(&mut second).await;
    assert_eq!(msg.into_text().unwrap().as_str(), "still here");
}

#[tokio::test]
async fn test_send_to_reaches_only_the_addressed_identity() {
    let server = start(config()).await;
    let mut alice = connect_as(&server, "alice").await;
    let mut bob = connect_as(&server, "bob").await;
    round_trip(&mut alice, "ready").await;
    round_trip(&mut bob, "ready").await;

    server
        .handle
        .send_to("bob", &Frame::Binary(vec![7, 7]))
        .await
        .expect("bob is connected");

    let msg = next_message(&mut bob).await;
    assert_eq!(msg.into_data().as_ref(), &[7, 7]);

    // Alice got nothing: her next message is the echo of what she sends.
    assert_eq!(round_trip(&mut alice, "ping").await, "Echo: ping");
}

#[tokio::test]
async fn test_send_to_unknown_identity_is_not_connected() {
    let server = start(config()).await;

    let err = server
        .handle
        .send_to("nobody", &Frame::Text("hi".into()))
        .await
        .expect_err("nobody is connected");

    assert!(matches!(
        err,
        GatehouseError::NotConnected(ref who) if who == "nobody"
    ));
}

#[tokio::test]
async fn test_binary_frames_echo_unchanged() {
    let server = start(config()).await;
    let mut client = connect_as(&server, "alice").await;

    client
        .send(Message::Binary(vec![1, 2, 3].into()))
        .await
        .unwrap();

    let msg = next_message(&mut client).await;
    assert_eq!(msg.into_data().as_ref(), &[1, 2, 3]);
}

#[tokio::test]
async fn test_idle_connection_is_closed_and_released() {
    let mut config = config();
    config.idle_timeout = Some(Duration::from_millis(100));
    let server = start(config).await;
    let mut client = connect_as(&server, "alice").await;
    round_trip(&mut client, "hi").await;

    // Stay silent; the server should hang up on its own.
    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(msg)) = client.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;

    assert!(ended.is_ok(), "server should close an idle connection");
    assert!(eventually(|| !server.handle.is_connected("alice")).await);
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn test_run_until_returns_after_shutdown_signal() {
    let server = start(config()).await;
    let mut client = connect_as(&server, "alice").await;
    round_trip(&mut client, "hi").await;

    server.stop.send(()).expect("server still running");
    let result = tokio::time::timeout(Duration::from_secs(2), server.task)
        .await
        .expect("server should stop in time")
        .expect("task should not panic");

    assert!(result.is_ok());
}
