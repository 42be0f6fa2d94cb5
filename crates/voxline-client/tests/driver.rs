//! The tokio driver against bare loopback sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use voxline_api_types::{NORMAL_CLOSURE, TEARDOWN_REASON};
use voxline_client::{
    Backoff, ClientConfig, ConnectionState, Endpoint, RealtimeClient, RealtimeHandle, StaleTracker,
};

async fn listen() -> (TcpListener, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let endpoint = Endpoint::parse(&format!("http://{addr}")).expect("endpoint");
    (listener, endpoint)
}

fn spawn_client(endpoint: Endpoint, config: ClientConfig) -> RealtimeHandle {
    RealtimeClient::spawn(endpoint, config, Arc::new(StaleTracker::new()))
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_a_scheduled_reconnect() {
    let (listener, endpoint) = listen().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let server = tokio::spawn({
        let accepted = accepted.clone();
        async move {
            // Drop every socket before the upgrade so each attempt fails.
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        }
    });

    let config = ClientConfig {
        backoff: Backoff {
            base: Duration::from_secs(30),
            cap: Duration::from_secs(60),
            max_attempts: 5,
        },
        ..ClientConfig::default()
    };
    let handle = spawn_client(endpoint, config);
    handle.open("secret").expect("open");

    let mut diagnostics = handle.diagnostics();
    let scheduled = diagnostics
        .wait_for(|current| current.connection.state == ConnectionState::ReconnectScheduled)
        .await
        .expect("driver running")
        .clone();
    assert_eq!(scheduled.connection.reconnect_attempts, 1);

    handle.teardown().await;
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(
        diagnostics.borrow().connection.state,
        ConnectionState::Closed
    );
    server.abort();
}

#[tokio::test]
async fn teardown_while_connecting_closes_normally_after_handshake() {
    let (listener, endpoint) = listen().await;
    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let (proceed_tx, proceed_rx) = oneshot::channel::<()>();
    let (close_tx, close_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let _ = accepted_tx.send(());
        // Hold the upgrade until the client has already been torn down.
        let _ = proceed_rx.await;
        let mut socket = accept_async(stream).await.expect("handshake");
        while let Some(frame) = socket.next().await {
            if let Ok(Message::Close(frame)) = frame {
                let _ = close_tx.send(
                    frame.map(|frame| (u16::from(frame.code), frame.reason.as_str().to_owned())),
                );
                return;
            }
        }
    });

    let handle = spawn_client(endpoint, ClientConfig::default());
    handle.open("secret").expect("open");
    accepted_rx.recv().await.expect("client dialed");
    assert_eq!(
        handle.diagnostics().borrow().connection.state,
        ConnectionState::Connecting
    );

    handle.teardown().await;
    proceed_tx.send(()).expect("server waiting");

    let close = tokio::time::timeout(Duration::from_secs(5), close_rx)
        .await
        .expect("close frame in time")
        .expect("server saw close");
    assert_eq!(close, Some((NORMAL_CLOSURE, TEARDOWN_REASON.to_owned())));
    server.await.expect("server task");
}
