//! Tokio driver for [`SyncClient`].
//!
//! One task owns the client core and consumes a single event queue fed by the
//! handle and by transport tasks. Timers are plain tokio primitives armed and
//! released according to the effects the core emits.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, warn};
use url::Url;
use voxline_api_types::NotificationPayload;

use crate::connection::{Effect, TransportEvent, TransportId};
use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::router::ReadCache;
use crate::sync::{ClientConfig, ClientEvent, Diagnostics, SyncClient};

/// Frames queued for one transport's writer.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

pub struct RealtimeClient;

impl RealtimeClient {
    /// Spawn the driver on the current runtime. The connection stays idle until
    /// [`RealtimeHandle::open`] is called.
    pub fn spawn(
        endpoint: Endpoint,
        config: ClientConfig,
        cache: Arc<dyn ReadCache>,
    ) -> RealtimeHandle {
        let core = SyncClient::new(endpoint, config, cache);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(false);
        let (diagnostics_tx, diagnostics_rx) = watch::channel(core.diagnostics());
        let (notifications_tx, notifications_rx) = watch::channel(Vec::new());

        let driver = Driver {
            core,
            config,
            events_tx: events_tx.clone(),
            transports: HashMap::new(),
            heartbeat: None,
            reconnect: None,
            connected: connected_tx,
            diagnostics: diagnostics_tx,
            notifications: notifications_tx,
        };
        let task = tokio::spawn(driver.run(events_rx));

        RealtimeHandle {
            events: events_tx,
            connected: connected_rx,
            diagnostics: diagnostics_rx,
            notifications: notifications_rx,
            task: Some(task),
        }
    }
}

/// Owned handle to a running client. Dropping it requests teardown.
pub struct RealtimeHandle {
    events: mpsc::UnboundedSender<ClientEvent>,
    connected: watch::Receiver<bool>,
    diagnostics: watch::Receiver<Diagnostics>,
    notifications: watch::Receiver<Vec<NotificationPayload>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeHandle {
    pub fn open(&self, credential: impl Into<String>) -> Result<(), ClientError> {
        self.push(ClientEvent::Open {
            credential: credential.into(),
        })
    }

    pub fn subscribe(&self, channel: impl Into<String>) -> Result<(), ClientError> {
        self.push(ClientEvent::Subscribe(channel.into()))
    }

    pub fn unsubscribe(&self, channel: impl Into<String>) -> Result<(), ClientError> {
        self.push(ClientEvent::Unsubscribe(channel.into()))
    }

    pub fn dismiss(&self, notification_id: impl Into<String>) -> Result<(), ClientError> {
        self.push(ClientEvent::Dismiss(notification_id.into()))
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn diagnostics(&self) -> watch::Receiver<Diagnostics> {
        self.diagnostics.clone()
    }

    pub fn notifications(&self) -> watch::Receiver<Vec<NotificationPayload>> {
        self.notifications.clone()
    }

    /// Tear the connection down and wait for the driver to finish.
    pub async fn teardown(mut self) {
        let _ = self.events.send(ClientEvent::Teardown);
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(target = "voxline_client::runtime", error = %err, "driver task failed");
        }
    }

    fn push(&self, event: ClientEvent) -> Result<(), ClientError> {
        self.events
            .send(event)
            .map_err(|_| ClientError::DriverStopped)
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.events.send(ClientEvent::Teardown);
        }
    }
}

struct Driver {
    core: SyncClient,
    config: ClientConfig,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    transports: HashMap<TransportId, mpsc::UnboundedSender<Outbound>>,
    heartbeat: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
    connected: watch::Sender<bool>,
    diagnostics: watch::Sender<Diagnostics>,
    notifications: watch::Sender<Vec<NotificationPayload>>,
}

impl Driver {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<ClientEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => event,
                    None => ClientEvent::Teardown,
                },
                () = tick(&mut self.heartbeat) => ClientEvent::HeartbeatTick,
                () = sleep(&mut self.reconnect) => ClientEvent::ReconnectDue,
            };

            self.apply(event);
            if self.core.is_closed() {
                break;
            }
        }
        debug!(target = "voxline_client::runtime", "driver stopped");
    }

    fn apply(&mut self, event: ClientEvent) {
        if event == ClientEvent::ReconnectDue {
            self.reconnect = None;
        }
        if let ClientEvent::Transport {
            id,
            event: TransportEvent::Closed { .. } | TransportEvent::Error(_),
        } = &event
        {
            self.transports.remove(id);
        }

        let effects = self.core.handle(event, OffsetDateTime::now_utc());
        for effect in effects {
            self.execute(effect);
        }
        self.publish();
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Connect { id, url } => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.transports.insert(id, tx);
                tokio::spawn(run_transport(id, url, rx, self.events_tx.clone()));
            }
            Effect::Send { id, message } => {
                let Some(tx) = self.transports.get(&id) else {
                    return;
                };
                match message.encode() {
                    Ok(text) => {
                        let _ = tx.send(Outbound::Text(text));
                    }
                    Err(err) => {
                        warn!(target = "voxline_client::runtime", error = %err, "failed to encode message");
                    }
                }
            }
            Effect::Close { id, code, reason } => {
                if let Some(tx) = self.transports.remove(&id) {
                    let _ = tx.send(Outbound::Close { code, reason });
                }
            }
            Effect::StartHeartbeat => {
                let period = self.config.heartbeat;
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(interval);
            }
            Effect::StopHeartbeat => self.heartbeat = None,
            Effect::ScheduleReconnect(delay) => {
                self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
            }
            Effect::CancelReconnect => self.reconnect = None,
            Effect::Connectivity(up) => {
                self.connected.send_replace(up);
            }
        }
    }

    fn publish(&self) {
        let diagnostics = self.core.diagnostics();
        self.diagnostics.send_if_modified(|current| {
            if *current == diagnostics {
                return false;
            }
            *current = diagnostics;
            true
        });
        let notifications = self.core.notifications();
        self.notifications.send_if_modified(|current| {
            if *current == notifications {
                return false;
            }
            *current = notifications;
            true
        });
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Own one socket: report its lifecycle on the shared queue and write whatever
/// the driver queues for it. A close requested by the driver ends the task
/// without reporting back, since the core has already moved on.
async fn run_transport(
    id: TransportId,
    url: Url,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ClientEvent>,
) {
    let report = |event: TransportEvent| {
        let _ = events.send(ClientEvent::Transport { id, event });
    };

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            report(TransportEvent::Error(err.to_string()));
            return;
        }
    };
    report(TransportEvent::Opened);

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = sink.send(Message::Text(text.into())).await {
                        report(TransportEvent::Error(err.to_string()));
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let _ = sink.close().await;
                    return;
                }
                None => {
                    let _ = sink.close().await;
                    return;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => report(TransportEvent::Text(text.as_str().to_owned())),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                        None => (None, String::new()),
                    };
                    report(TransportEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    report(TransportEvent::Error(err.to_string()));
                    return;
                }
                None => {
                    report(TransportEvent::Closed { code: None, reason: String::new() });
                    return;
                }
            },
        }
    }
}
