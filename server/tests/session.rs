//! End to end tests for the per connection session loop.
//!
//! Each test starts a real server on an OS assigned port and talks to it
//! with the raw packet channel, so every byte goes through TCP.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use protocol::{Packet, TcpReceiver, TcpSender, TypingStatus, UserStatus, MAX_NAME_LEN, MAX_PAYLOAD};
use wirechat_server::{Registry, ServerListener};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

async fn start_server() -> (SocketAddr, Registry) {
    let listener = ServerListener::bind("127.0.0.1:0").await.expect("should bind");
    let addr = listener.local_addr().unwrap();
    let registry = listener.registry();
    listener.spawn();
    (addr, registry)
}

async fn connect(addr: SocketAddr) -> (TcpReceiver, TcpSender) {
    protocol::split(TcpStream::connect(addr).await.expect("client should connect"))
}

async fn recv(rx: &mut TcpReceiver) -> Packet {
    timeout(WAIT, rx.next())
        .await
        .expect("timed out waiting for packet")
        .expect("receive should succeed")
        .expect("stream should still be open")
}

async fn assert_silent(rx: &mut TcpReceiver) {
    if let Ok(got) = timeout(QUIET, rx.next()).await {
        panic!("expected nothing, got {:?}", got.map_err(|e| e.to_string()));
    }
}

async fn assert_closed(rx: &mut TcpReceiver) {
    match timeout(WAIT, rx.next()).await.expect("server should close the connection") {
        Ok(None) | Err(_) => {}
        Ok(Some(p)) => panic!("expected end of stream, got {}", p),
    }
}

async fn wait_for_clients(registry: &Registry, count: usize) {
    timeout(WAIT, async {
        while registry.len().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached expected size");
}

fn status(name: &str, status: UserStatus) -> Packet {
    Packet::UserStatusWasUpdated { name: name.into(), status }
}

/// Logs in and consumes the reply plus the own LOGGED_IN broadcast.
async fn login(rx: &mut TcpReceiver, tx: &TcpSender, name: Option<&str>) -> String {
    tx.send(Packet::Login { name: name.map(str::to_owned) }).await.unwrap();

    let assigned = match recv(rx).await {
        Packet::LoginResponse { success: true, message } => message,
        other => panic!("login failed: {}", other),
    };
    assert_eq!(recv(rx).await, status(&assigned, UserStatus::LoggedIn));
    assigned
}

#[tokio::test]
async fn test_name_claiming() {
    let (addr, _registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    let (mut b_rx, b_tx) = connect(addr).await;

    assert_eq!(login(&mut a_rx, &a_tx, Some("Alice")).await, "Alice");

    // no name requested and Alice is taken, so the pool hands out Bob
    assert_eq!(login(&mut b_rx, &b_tx, None).await, "Bob");
    assert_eq!(recv(&mut a_rx).await, status("Bob", UserStatus::LoggedIn));

    b_tx.send(Packet::Login { name: Some("Alice".into()) }).await.unwrap();
    assert_eq!(
        recv(&mut b_rx).await,
        Packet::LoginResponse { success: false, message: "Name taken.".into() }
    );

    // a failed login is invisible to everyone else
    assert_silent(&mut a_rx).await;
}

#[tokio::test]
async fn test_failed_login_can_be_retried() {
    let (addr, _registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    let (mut b_rx, b_tx) = connect(addr).await;

    login(&mut a_rx, &a_tx, Some("Dana")).await;

    b_tx.send(Packet::Login { name: Some("Dana".into()) }).await.unwrap();
    assert!(matches!(recv(&mut b_rx).await, Packet::LoginResponse { success: false, .. }));

    assert_eq!(login(&mut b_rx, &b_tx, Some("Eve")).await, "Eve");
    assert_eq!(recv(&mut a_rx).await, status("Eve", UserStatus::LoggedIn));
}

#[tokio::test]
async fn test_message_broadcast_reaches_logged_in_only() {
    let (addr, registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    let (mut b_rx, b_tx) = connect(addr).await;
    let (mut c_rx, _c_tx) = connect(addr).await;
    wait_for_clients(&registry, 3).await;

    let a_name = login(&mut a_rx, &a_tx, None).await;
    let b_name = login(&mut b_rx, &b_tx, None).await;
    assert_eq!(recv(&mut a_rx).await, status(&b_name, UserStatus::LoggedIn));

    a_tx.send(Packet::SubmitMessage { message: "hi".into() }).await.unwrap();

    let expected = Packet::UserWroteMessage { name: a_name, message: "hi".into() };
    assert_eq!(recv(&mut a_rx).await, expected);
    assert_eq!(recv(&mut b_rx).await, expected);
    assert_silent(&mut c_rx).await;
}

#[tokio::test]
async fn test_batched_pings_are_ignored() {
    let (addr, _registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    let name = login(&mut a_rx, &a_tx, Some("Pinger")).await;

    a_tx.send_batch(vec![
        Packet::Ping,
        Packet::SubmitMessage { message: "Banana".into() },
        Packet::Ping,
    ])
    .await
    .unwrap();

    assert_eq!(recv(&mut a_rx).await, Packet::UserWroteMessage { name, message: "Banana".into() });
    assert_silent(&mut a_rx).await;
}

#[tokio::test]
async fn test_submit_before_login_disconnects() {
    let (addr, registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    let (mut c_rx, c_tx) = connect(addr).await;
    login(&mut a_rx, &a_tx, Some("Alice")).await;

    c_tx.send(Packet::SubmitMessage { message: "sneaky".into() }).await.unwrap();

    assert_closed(&mut c_rx).await;
    wait_for_clients(&registry, 1).await;
    // neither the message nor a logout reaches anyone
    assert_silent(&mut a_rx).await;
}

#[tokio::test]
async fn test_status_before_login_disconnects() {
    let (addr, _registry) = start_server().await;
    let (mut c_rx, c_tx) = connect(addr).await;

    c_tx.send(Packet::SubmitUserStatus { status: TypingStatus::Typing }).await.unwrap();
    assert_closed(&mut c_rx).await;
}

#[tokio::test]
async fn test_typing_status_is_relayed() {
    let (addr, _registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    let (mut b_rx, b_tx) = connect(addr).await;
    login(&mut a_rx, &a_tx, Some("Alice")).await;
    login(&mut b_rx, &b_tx, Some("Bob")).await;
    recv(&mut a_rx).await; // Bob logged in

    b_tx.send(Packet::SubmitUserStatus { status: TypingStatus::Typing }).await.unwrap();
    assert_eq!(recv(&mut a_rx).await, status("Bob", UserStatus::Typing));
    assert_eq!(recv(&mut b_rx).await, status("Bob", UserStatus::Typing));

    b_tx.send(Packet::SubmitUserStatus { status: TypingStatus::NotTyping }).await.unwrap();
    assert_eq!(recv(&mut a_rx).await, status("Bob", UserStatus::NotTyping));
}

#[tokio::test]
async fn test_logout_broadcast_only_if_logged_in() {
    let (addr, registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    login(&mut a_rx, &a_tx, Some("Alice")).await;

    // unauthenticated connection comes and goes silently
    let (c_rx, c_tx) = connect(addr).await;
    wait_for_clients(&registry, 2).await;
    drop(c_tx);
    drop(c_rx);
    wait_for_clients(&registry, 1).await;
    assert_silent(&mut a_rx).await;

    let (mut b_rx, b_tx) = connect(addr).await;
    let b_name = login(&mut b_rx, &b_tx, None).await;
    assert_eq!(recv(&mut a_rx).await, status(&b_name, UserStatus::LoggedIn));

    drop(b_tx);
    drop(b_rx);
    assert_eq!(recv(&mut a_rx).await, status(&b_name, UserStatus::LoggedOut));
}

#[tokio::test]
async fn test_name_is_released_on_disconnect() {
    let (addr, registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    login(&mut a_rx, &a_tx, Some("Alice")).await;

    drop(a_tx);
    drop(a_rx);
    wait_for_clients(&registry, 0).await;

    let (mut b_rx, b_tx) = connect(addr).await;
    assert_eq!(login(&mut b_rx, &b_tx, Some("Alice")).await, "Alice");
}

#[tokio::test]
async fn test_unknown_packet_type_disconnects() {
    let (addr, registry) = start_server().await;
    let mut raw = TcpStream::connect(addr).await.unwrap();
    wait_for_clients(&registry, 1).await;

    raw.write_all(&[0, 99]).await.unwrap();

    let (mut rx, _tx) = protocol::split(raw);
    assert_closed(&mut rx).await;
    wait_for_clients(&registry, 0).await;
}

#[tokio::test]
async fn test_server_only_packet_disconnects() {
    let (addr, _registry) = start_server().await;
    let (mut rx, tx) = connect(addr).await;

    tx.send(Packet::UserWroteMessage { name: "Mallory".into(), message: "spoof".into() })
        .await
        .unwrap();
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_oversized_relay_disconnects_sender_only() {
    let (addr, _registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    let (mut b_rx, b_tx) = connect(addr).await;
    login(&mut a_rx, &a_tx, Some("Alice")).await;
    login(&mut b_rx, &b_tx, Some("Bob")).await;
    recv(&mut a_rx).await; // Bob logged in

    // fits on its own, but not once prefixed with the author's name
    b_tx.send(Packet::SubmitMessage { message: "z".repeat(255) }).await.unwrap();

    assert_closed(&mut b_rx).await;
    assert_eq!(recv(&mut a_rx).await, status("Bob", UserStatus::LoggedOut));
}

#[tokio::test]
async fn test_overlong_name_is_refused_and_connection_kept() {
    let (addr, _registry) = start_server().await;
    let (mut a_rx, a_tx) = connect(addr).await;
    let (mut b_rx, b_tx) = connect(addr).await;
    login(&mut a_rx, &a_tx, Some("Alice")).await;

    // a valid string field, but too long to ever be framed alongside a flag or message
    b_tx.send(Packet::Login { name: Some("n".repeat(MAX_PAYLOAD)) }).await.unwrap();
    assert_eq!(
        recv(&mut b_rx).await,
        Packet::LoginResponse { success: false, message: "Name too long.".into() }
    );
    assert_silent(&mut a_rx).await;

    let longest = "n".repeat(MAX_NAME_LEN);
    assert_eq!(login(&mut b_rx, &b_tx, Some(longest.as_str())).await, longest);
    assert_eq!(recv(&mut a_rx).await, status(&longest, UserStatus::LoggedIn));

    // the largest message that still fits next to the name is relayed
    let message = "m".repeat(MAX_PAYLOAD - 1 - MAX_NAME_LEN);
    b_tx.send(Packet::SubmitMessage { message: message.clone() }).await.unwrap();
    let expected = Packet::UserWroteMessage { name: longest, message };
    assert_eq!(recv(&mut a_rx).await, expected);
    assert_eq!(recv(&mut b_rx).await, expected);
}
