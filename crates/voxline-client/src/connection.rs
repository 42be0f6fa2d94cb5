//! Lifecycle of one logical realtime connection.
//!
//! [`ConnectionManager`] is a synchronous state machine: callers feed it
//! commands and transport events, and it answers with [`Effect`]s for a driver
//! to execute. Every transport it asks for carries a fresh [`TransportId`];
//! events from any transport other than the current one are dropped, which is
//! how a superseded socket is kept from disturbing its replacement.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;
use voxline_api_types::{ClientMessage, NORMAL_CLOSURE, TEARDOWN_REASON};

use crate::backoff::Backoff;
use crate::endpoint::Endpoint;

const SUPERSEDED_REASON: &str = "superseded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Failed,
    ReconnectScheduled,
    Closed,
}

/// Work the driver performs on behalf of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Connect { id: TransportId, url: Url },
    Send { id: TransportId, message: ClientMessage },
    Close { id: TransportId, code: u16, reason: String },
    StartHeartbeat,
    StopHeartbeat,
    ScheduleReconnect(Duration),
    CancelReconnect,
    Connectivity(bool),
}

/// Terminal or informational events reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Text(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub connected: bool,
    pub failures: u32,
    pub reconnect_attempts: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_connected_at: Option<OffsetDateTime>,
    pub exhausted: bool,
}

#[derive(Debug)]
pub struct ConnectionManager {
    endpoint: Endpoint,
    backoff: Backoff,
    credential: Option<String>,
    state: ConnectionState,
    current: Option<TransportId>,
    next_id: u64,
    failures: u32,
    reconnect_attempts: u64,
    successful_opens: u64,
    last_connected_at: Option<OffsetDateTime>,
    heartbeat_active: bool,
    reconnect_pending: bool,
    exhausted: bool,
}

impl ConnectionManager {
    pub fn new(endpoint: Endpoint, backoff: Backoff) -> Self {
        Self {
            endpoint,
            backoff,
            credential: None,
            state: ConnectionState::Idle,
            current: None,
            next_id: 0,
            failures: 0,
            reconnect_attempts: 0,
            successful_opens: 0,
            last_connected_at: None,
            heartbeat_active: false,
            reconnect_pending: false,
            exhausted: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn current(&self) -> Option<TransportId> {
        self.current
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn successful_opens(&self) -> u64 {
        self.successful_opens
    }

    /// True while a heartbeat or reconnect timer is armed.
    pub fn timers_pending(&self) -> bool {
        self.heartbeat_active || self.reconnect_pending
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            connected: self.is_open(),
            failures: self.failures,
            reconnect_attempts: self.reconnect_attempts,
            last_connected_at: self.last_connected_at,
            exhausted: self.exhausted,
        }
    }

    /// Start a fresh connection cycle. Any prior transport is closed, pending
    /// timers are cancelled and the failure counter starts over.
    pub fn open(&mut self, credential: &str) -> Vec<Effect> {
        if self.state == ConnectionState::Closed {
            debug!(target = "voxline_client::connection", "open after teardown ignored");
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.release(&mut effects, SUPERSEDED_REASON);
        self.credential = Some(credential.to_owned());
        self.failures = 0;
        self.exhausted = false;
        self.connect(&mut effects);
        effects
    }

    /// The reconnect timer fired.
    pub fn reconnect_due(&mut self) -> Vec<Effect> {
        if !self.reconnect_pending || self.state != ConnectionState::ReconnectScheduled {
            return Vec::new();
        }
        self.reconnect_pending = false;
        let mut effects = Vec::new();
        self.connect(&mut effects);
        effects
    }

    /// A ping for the live transport, if there is one.
    pub fn heartbeat(&self) -> Option<Effect> {
        self.send(ClientMessage::Ping)
    }

    pub fn send(&self, message: ClientMessage) -> Option<Effect> {
        match (self.state, self.current) {
            (ConnectionState::Open, Some(id)) => Some(Effect::Send { id, message }),
            _ => None,
        }
    }

    pub fn on_transport(
        &mut self,
        id: TransportId,
        event: &TransportEvent,
        now: OffsetDateTime,
    ) -> Vec<Effect> {
        if self.current != Some(id) {
            debug!(
                target = "voxline_client::connection",
                transport = %id,
                "event from stale transport ignored"
            );
            return Vec::new();
        }

        match event {
            TransportEvent::Opened => self.on_opened(id, now),
            TransportEvent::Text(_) => Vec::new(),
            TransportEvent::Closed { code, reason } => {
                debug!(
                    target = "voxline_client::connection",
                    transport = %id,
                    code = ?code,
                    reason = %reason,
                    "transport closed"
                );
                self.on_lost(*code)
            }
            TransportEvent::Error(detail) => {
                warn!(
                    target = "voxline_client::connection",
                    transport = %id,
                    error = %detail,
                    "transport error"
                );
                self.on_lost(None)
            }
        }
    }

    /// Release every resource and move to `Closed`. Safe to call repeatedly.
    pub fn teardown(&mut self) -> Vec<Effect> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.release(&mut effects, TEARDOWN_REASON);
        self.state = ConnectionState::Closed;
        effects
    }

    fn on_opened(&mut self, id: TransportId, now: OffsetDateTime) -> Vec<Effect> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        self.state = ConnectionState::Open;
        self.failures = 0;
        self.exhausted = false;
        self.successful_opens += 1;
        self.last_connected_at = Some(now);
        self.heartbeat_active = true;
        info!(
            target = "voxline_client::connection",
            transport = %id,
            opens = self.successful_opens,
            "realtime connection open"
        );
        vec![Effect::StartHeartbeat, Effect::Connectivity(true)]
    }

    fn on_lost(&mut self, code: Option<u16>) -> Vec<Effect> {
        let mut effects = Vec::new();
        let was_open = self.is_open();
        self.current = None;
        if self.heartbeat_active {
            self.heartbeat_active = false;
            effects.push(Effect::StopHeartbeat);
        }
        if was_open {
            effects.push(Effect::Connectivity(false));
        }
        self.state = ConnectionState::Failed;

        if code == Some(NORMAL_CLOSURE) {
            info!(
                target = "voxline_client::connection",
                "connection closed normally, not reconnecting"
            );
            return effects;
        }

        if self.backoff.allows(self.failures) {
            let delay = self.backoff.delay(self.failures);
            self.failures += 1;
            self.reconnect_attempts += 1;
            self.reconnect_pending = true;
            self.state = ConnectionState::ReconnectScheduled;
            info!(
                target = "voxline_client::connection",
                attempt = self.failures,
                delay_ms = delay.as_millis() as u64,
                "reconnect scheduled"
            );
            effects.push(Effect::ScheduleReconnect(delay));
        } else {
            self.exhausted = true;
            warn!(
                target = "voxline_client::connection",
                failures = self.failures,
                "reconnect attempts exhausted"
            );
        }
        effects
    }

    fn connect(&mut self, effects: &mut Vec<Effect>) {
        let Some(credential) = self.credential.as_deref() else {
            return;
        };
        let id = TransportId(self.next_id);
        self.next_id += 1;
        self.current = Some(id);
        self.state = ConnectionState::Connecting;
        effects.push(Effect::Connect {
            id,
            url: self.endpoint.with_token(credential),
        });
    }

    fn release(&mut self, effects: &mut Vec<Effect>, reason: &str) {
        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(Effect::CancelReconnect);
        }
        if self.heartbeat_active {
            self.heartbeat_active = false;
            effects.push(Effect::StopHeartbeat);
        }
        let was_open = self.is_open();
        if let Some(id) = self.current.take() {
            effects.push(Effect::Close {
                id,
                code: NORMAL_CLOSURE,
                reason: reason.to_owned(),
            });
        }
        if was_open {
            effects.push(Effect::Connectivity(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        let endpoint = Endpoint::parse("http://localhost:8080").expect("endpoint");
        ConnectionManager::new(endpoint, Backoff::default())
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }

    fn connect_id(effects: &[Effect]) -> TransportId {
        effects
            .iter()
            .find_map(|effect| match effect {
                Effect::Connect { id, .. } => Some(*id),
                _ => None,
            })
            .expect("connect effect")
    }

    fn abnormal() -> TransportEvent {
        TransportEvent::Closed {
            code: Some(1006),
            reason: String::new(),
        }
    }

    fn scheduled(effects: &[Effect]) -> Option<Duration> {
        effects.iter().find_map(|effect| match effect {
            Effect::ScheduleReconnect(delay) => Some(*delay),
            _ => None,
        })
    }

    fn closes(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|effect| matches!(effect, Effect::Close { code: NORMAL_CLOSURE, .. }))
            .count()
    }

    #[test]
    fn open_builds_tokenized_url() {
        let mut manager = manager();
        let effects = manager.open("secret");
        assert_eq!(manager.state(), ConnectionState::Connecting);
        let Some(Effect::Connect { url, .. }) = effects.first() else {
            panic!("expected connect, got {effects:?}");
        };
        assert_eq!(url.as_str(), "ws://localhost:8080/ws?token=secret");
    }

    #[test]
    fn successful_open_starts_heartbeat_and_signals_connectivity() {
        let mut manager = manager();
        let id = connect_id(&manager.open("secret"));
        let effects = manager.on_transport(id, &TransportEvent::Opened, now());
        assert_eq!(
            effects,
            vec![Effect::StartHeartbeat, Effect::Connectivity(true)]
        );
        assert!(manager.is_open());
        assert_eq!(manager.snapshot().last_connected_at, Some(now()));
        assert_eq!(manager.heartbeat(), Some(Effect::Send { id, message: ClientMessage::Ping }));
    }

    #[test]
    fn heartbeat_is_silent_when_not_open() {
        let mut manager = manager();
        manager.open("secret");
        assert_eq!(manager.heartbeat(), None);
    }

    #[test]
    fn reconnect_delays_grow_and_stop_after_five_failures() {
        let mut manager = manager();
        let mut id = connect_id(&manager.open("secret"));
        let mut delays = Vec::new();

        loop {
            let effects = manager.on_transport(id, &TransportEvent::Error("refused".into()), now());
            match scheduled(&effects) {
                Some(delay) => {
                    delays.push(delay.as_millis());
                    assert_eq!(manager.state(), ConnectionState::ReconnectScheduled);
                    id = connect_id(&manager.reconnect_due());
                }
                None => break,
            }
        }

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000]);
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert!(manager.snapshot().exhausted);
        assert!(!manager.timers_pending());
        assert!(manager.reconnect_due().is_empty());
    }

    #[test]
    fn successful_open_resets_failure_counter() {
        let mut manager = manager();
        let id = connect_id(&manager.open("secret"));
        manager.on_transport(id, &abnormal(), now());
        let id = connect_id(&manager.reconnect_due());
        manager.on_transport(id, &abnormal(), now());
        assert_eq!(manager.failures(), 2);

        let id = connect_id(&manager.reconnect_due());
        manager.on_transport(id, &TransportEvent::Opened, now());
        assert_eq!(manager.failures(), 0);

        let effects = manager.on_transport(id, &abnormal(), now());
        assert_eq!(scheduled(&effects), Some(Duration::from_millis(1_000)));
        assert_eq!(manager.snapshot().reconnect_attempts, 3);
    }

    #[test]
    fn normal_closure_does_not_reconnect() {
        let mut manager = manager();
        let id = connect_id(&manager.open("secret"));
        manager.on_transport(id, &TransportEvent::Opened, now());
        let effects = manager.on_transport(
            id,
            &TransportEvent::Closed {
                code: Some(NORMAL_CLOSURE),
                reason: "bye".into(),
            },
            now(),
        );
        assert_eq!(
            effects,
            vec![Effect::StopHeartbeat, Effect::Connectivity(false)]
        );
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert!(!manager.snapshot().exhausted);
    }

    #[test]
    fn explicit_open_supersedes_live_transport_and_restarts_cycle() {
        let mut manager = manager();
        let first = connect_id(&manager.open("secret"));
        manager.on_transport(first, &TransportEvent::Opened, now());

        let effects = manager.open("rotated");
        assert!(effects.contains(&Effect::Close {
            id: first,
            code: NORMAL_CLOSURE,
            reason: SUPERSEDED_REASON.into(),
        }));
        assert!(effects.contains(&Effect::StopHeartbeat));
        let second = connect_id(&effects);
        assert_ne!(first, second);

        // The superseded socket reporting its close must not trigger a reconnect.
        assert!(manager.on_transport(first, &abnormal(), now()).is_empty());
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn explicit_open_recovers_from_exhaustion() {
        let mut manager = manager();
        let mut id = connect_id(&manager.open("secret"));
        for _ in 0..5 {
            manager.on_transport(id, &abnormal(), now());
            id = connect_id(&manager.reconnect_due());
        }
        manager.on_transport(id, &abnormal(), now());
        assert!(manager.snapshot().exhausted);

        let effects = manager.open("secret");
        assert!(!manager.snapshot().exhausted);
        assert_eq!(manager.failures(), 0);
        connect_id(&effects);
    }

    #[test]
    fn explicit_open_cancels_pending_reconnect() {
        let mut manager = manager();
        let id = connect_id(&manager.open("secret"));
        manager.on_transport(id, &abnormal(), now());
        let effects = manager.open("secret");
        assert_eq!(effects.first(), Some(&Effect::CancelReconnect));
        assert!(manager.reconnect_due().is_empty());
    }

    fn setup_idle(_: &mut ConnectionManager) {}

    fn setup_connecting(manager: &mut ConnectionManager) {
        manager.open("secret");
    }

    fn setup_open(manager: &mut ConnectionManager) {
        let id = connect_id(&manager.open("secret"));
        manager.on_transport(id, &TransportEvent::Opened, now());
    }

    fn setup_reconnect_scheduled(manager: &mut ConnectionManager) {
        let id = connect_id(&manager.open("secret"));
        manager.on_transport(id, &abnormal(), now());
    }

    fn setup_failed(manager: &mut ConnectionManager) {
        let id = connect_id(&manager.open("secret"));
        let closed = TransportEvent::Closed {
            code: Some(NORMAL_CLOSURE),
            reason: String::new(),
        };
        manager.on_transport(id, &closed, now());
    }

    #[test]
    fn teardown_from_every_state_leaves_no_timers_and_closes_at_most_once() {
        let setups: [(&str, fn(&mut ConnectionManager), usize); 5] = [
            ("idle", setup_idle, 0),
            ("connecting", setup_connecting, 1),
            ("open", setup_open, 1),
            ("reconnect scheduled", setup_reconnect_scheduled, 0),
            ("failed", setup_failed, 0),
        ];

        for (label, setup, expected_closes) in setups {
            let mut manager = manager();
            setup(&mut manager);
            let effects = manager.teardown();
            assert_eq!(closes(&effects), expected_closes, "{label}");
            assert!(!manager.timers_pending(), "{label}");
            assert_eq!(manager.state(), ConnectionState::Closed, "{label}");
            assert!(manager.teardown().is_empty(), "{label}: second teardown");
        }
    }

    #[test]
    fn teardown_uses_normal_closure_with_unmount_reason() {
        let mut manager = manager();
        let id = connect_id(&manager.open("secret"));
        manager.on_transport(id, &TransportEvent::Opened, now());
        let effects = manager.teardown();
        assert_eq!(
            effects,
            vec![
                Effect::StopHeartbeat,
                Effect::Close {
                    id,
                    code: NORMAL_CLOSURE,
                    reason: TEARDOWN_REASON.into()
                },
                Effect::Connectivity(false),
            ]
        );
    }

    #[test]
    fn open_after_teardown_is_ignored() {
        let mut manager = manager();
        manager.teardown();
        assert!(manager.open("secret").is_empty());
        assert_eq!(manager.state(), ConnectionState::Closed);
    }
}
