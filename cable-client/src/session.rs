//! The session engine: one `tokio` task per [`crate::Client`] driving a
//! single-threaded event loop over commands, transport events, and timers.
//! Nothing here is shared across tasks, so no locking is needed anywhere
//! in this module.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use cable_wire::{
    CloseCode, ConnackCode, ConnectPacket, Identity, MessackPacket, MessagePacket, Packet,
    PingPongPacket, Property, PropertyMap, Qos, RequestPacket, ResponsePacket,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::error::SessionError;
use crate::handler::{Handler, InboundMessage, InboundRequest, SessionStatus};
use crate::options::ClientOptions;
use crate::retry::{RetryConfig, RetryController, RetryReason};
use crate::transport::Transport;

const PROTOCOL_VERSION: u8 = 1;

pub(crate) enum Command {
    Connect(Identity),
    Close(Option<CloseCode>),
    Send {
        kind: u8,
        payload: Vec<u8>,
        qos: Qos,
        props: PropertyMap,
        responder: oneshot::Sender<Result<(), SessionError>>,
    },
    Request {
        method: String,
        body: Vec<u8>,
        props: PropertyMap,
        responder: oneshot::Sender<Result<ResponsePacket, SessionError>>,
    },
    SetAutoRetry(RetryConfig),
}

/// The client-side handle to a running [`Engine`].
pub(crate) struct SessionHandle {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) status: watch::Receiver<SessionStatus>,
    pub(crate) conn_id: watch::Receiver<Option<String>>,
}

pub(crate) fn spawn(
    transport: Box<dyn Transport>,
    handler: Arc<dyn Handler>,
    options: ClientOptions,
    retry_config: RetryConfig,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(SessionStatus::Unknown);
    let (conn_id_tx, conn_id_rx) = watch::channel(None);

    let engine = Engine {
        transport,
        handler,
        options,
        commands: cmd_rx,
        status: status_tx,
        conn_id: conn_id_tx,
        retry: RetryController::new(retry_config),
        identity: None,
        connected: false,
        awaiting_pong: false,
        next_message_id: 0,
        next_request_id: 0,
        request_tasks: HashMap::new(),
        message_tasks: HashMap::new(),
        timers: BinaryHeap::new(),
        timer_seq: 0,
    };
    tokio::spawn(engine.run());

    SessionHandle {
        commands: cmd_tx,
        status: status_rx,
        conn_id: conn_id_rx,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timeout {
    PingInterval,
    PingTimeout,
    Retry,
    RequestTimeout(u16),
    MessageRetry(u16),
}

struct TimerEntry {
    at: Instant,
    seq: u64,
    timeout: Timeout,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so `BinaryHeap` (a max-heap) pops the earliest deadline.
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct PendingMessage {
    packet: MessagePacket,
    attempts: u32,
    responder: oneshot::Sender<Result<(), SessionError>>,
}

struct Engine {
    transport: Box<dyn Transport>,
    handler: Arc<dyn Handler>,
    options: ClientOptions,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<SessionStatus>,
    conn_id: watch::Sender<Option<String>>,
    retry: RetryController,
    identity: Option<Identity>,
    connected: bool,
    awaiting_pong: bool,
    next_message_id: u16,
    next_request_id: u16,
    request_tasks: HashMap<u16, oneshot::Sender<Result<ResponsePacket, SessionError>>>,
    message_tasks: HashMap<u16, PendingMessage>,
    timers: BinaryHeap<TimerEntry>,
    timer_seq: u64,
}

impl Engine {
    async fn run(mut self) {
        loop {
            let wake = self.timers.peek().map(|t| t.at);
            let sleep = async {
                match wake {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            self.fail_pending(SessionError::Disconnected(RetryReason::NetworkError(
                                "client dropped".into(),
                            )));
                            self.transport.close().await;
                            return;
                        }
                    }
                }
                event = self.transport.recv(), if self.connected => {
                    self.handle_transport_event(event).await;
                }
                _ = sleep => {
                    self.handle_timers_due().await;
                }
            }
        }
    }

    fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status() == status {
            return;
        }
        let _ = self.status.send(status);
        self.handler.on_status(status);
    }

    fn schedule_timer(&mut self, timeout: Timeout, delay: Duration) {
        let seq = self.timer_seq;
        self.timer_seq = self.timer_seq.wrapping_add(1);
        self.timers.push(TimerEntry {
            at: Instant::now() + delay,
            seq,
            timeout,
        });
    }

    fn next_id<V>(counter: &mut u16, in_flight: &HashMap<u16, V>) -> u16 {
        loop {
            *counter = counter.wrapping_add(1);
            if *counter == 0 {
                *counter = 1;
            }
            if !in_flight.contains_key(counter) {
                return *counter;
            }
        }
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), ()> {
        let frame = match packet.encode() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode outgoing packet");
                return Err(());
            }
        };
        if let Err(err) = self.transport.send(frame.freeze()).await {
            tracing::warn!(error = %err, "transport write failed");
            self.connected = false;
            self.trigger_retry(RetryReason::NetworkError(err.to_string()));
            return Err(());
        }
        Ok(())
    }

    async fn attempt_connect(&mut self) {
        self.set_status(SessionStatus::Opening);
        match self.transport.connect().await {
            Ok(()) => {
                self.connected = true;
                if let Some(identity) = self.identity.clone() {
                    let packet = Packet::Connect(ConnectPacket {
                        version: PROTOCOL_VERSION,
                        identity,
                        props: PropertyMap::new(),
                    });
                    let _ = self.write_packet(&packet).await;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "connect attempt failed");
                self.connected = false;
                self.trigger_retry(RetryReason::NetworkError(err.to_string()));
            }
        }
    }

    fn trigger_retry(&mut self, reason: RetryReason) {
        self.set_status(SessionStatus::Closing);
        let _ = self.conn_id.send(None);
        self.fail_pending(SessionError::Disconnected(reason.clone()));
        let (delay, should_retry) = self.retry.should_retry(&reason);
        if should_retry {
            self.schedule_timer(Timeout::Retry, delay);
        } else {
            self.set_status(SessionStatus::Closed);
        }
    }

    fn fail_pending(&mut self, err: SessionError) {
        for (_, tx) in self.request_tasks.drain() {
            let _ = tx.send(Err(err.clone()));
        }
        for (_, pending) in self.message_tasks.drain() {
            let _ = pending.responder.send(Err(err.clone()));
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(identity) => {
                self.identity = Some(identity);
                self.retry.reset();
                self.attempt_connect().await;
            }
            Command::Close(code) => {
                self.set_status(SessionStatus::Closing);
                let packet = Packet::Close(cable_wire::ClosePacket {
                    code: code.unwrap_or(CloseCode::Normal),
                });
                if self.connected {
                    let _ = self.write_packet(&packet).await;
                }
                self.transport.close().await;
                self.connected = false;
                self.fail_pending(SessionError::Disconnected(RetryReason::NetworkError(
                    "closed by caller".into(),
                )));
                self.set_status(SessionStatus::Closed);
            }
            Command::Send {
                kind,
                payload,
                qos,
                props,
                responder,
            } => self.handle_send(kind, payload, qos, props, responder).await,
            Command::Request {
                method,
                body,
                props,
                responder,
            } => self.handle_request(method, body, props, responder).await,
            Command::SetAutoRetry(config) => {
                self.retry = RetryController::new(config);
            }
        }
    }

    async fn handle_send(
        &mut self,
        kind: u8,
        payload: Vec<u8>,
        qos: Qos,
        props: PropertyMap,
        responder: oneshot::Sender<Result<(), SessionError>>,
    ) {
        if self.status() != SessionStatus::Opened {
            let _ = responder.send(Err(SessionError::NotReady));
            return;
        }
        let id = if qos == Qos::Qos1 {
            Self::next_id(&mut self.next_message_id, &self.message_tasks)
        } else {
            0
        };
        let packet = MessagePacket {
            id,
            qos,
            dup: false,
            kind,
            payload,
            props,
        };
        if self.write_packet(&Packet::Message(packet.clone())).await.is_err() {
            let _ = responder.send(Err(SessionError::NotReady));
            return;
        }
        match qos {
            Qos::Qos0 => {
                let _ = responder.send(Ok(()));
            }
            Qos::Qos1 => {
                self.message_tasks.insert(
                    id,
                    PendingMessage {
                        packet,
                        attempts: 0,
                        responder,
                    },
                );
                self.schedule_timer(Timeout::MessageRetry(id), self.options.message_timeout);
            }
        }
    }

    async fn handle_request(
        &mut self,
        method: String,
        body: Vec<u8>,
        props: PropertyMap,
        responder: oneshot::Sender<Result<ResponsePacket, SessionError>>,
    ) {
        if self.status() != SessionStatus::Opened {
            let _ = responder.send(Err(SessionError::NotReady));
            return;
        }
        let id = Self::next_id(&mut self.next_request_id, &self.request_tasks);
        let packet = RequestPacket {
            id,
            method,
            body,
            props,
        };
        if self.write_packet(&Packet::Request(packet)).await.is_err() {
            let _ = responder.send(Err(SessionError::NotReady));
            return;
        }
        self.request_tasks.insert(id, responder);
        self.schedule_timer(Timeout::RequestTimeout(id), self.options.request_timeout);
    }

    async fn handle_transport_event(
        &mut self,
        event: Result<crate::transport::TransportEvent, crate::transport::TransportError>,
    ) {
        use crate::transport::TransportEvent;
        match event {
            Ok(TransportEvent::Message(bytes)) => match Packet::decode(&bytes) {
                Ok(packet) => self.dispatch_packet(packet).await,
                Err(err) => tracing::warn!(error = %err, "dropping malformed frame"),
            },
            Ok(TransportEvent::Closed { code, reason }) => {
                self.connected = false;
                self.trigger_retry(RetryReason::NetworkError(format!(
                    "transport closed (code={code:?}, reason={reason:?})"
                )));
            }
            Err(err) => {
                self.connected = false;
                self.trigger_retry(RetryReason::NetworkError(err.to_string()));
            }
        }
    }

    async fn dispatch_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connect(_) => {}
            Packet::Connack(p) => match p.code {
                ConnackCode::Accepted => {
                    self.retry.reset();
                    let _ = self
                        .conn_id
                        .send(p.props.get(Property::ConnId).map(str::to_string));
                    self.set_status(SessionStatus::Opened);
                    self.awaiting_pong = false;
                    self.schedule_timer(Timeout::PingInterval, self.options.ping_interval);
                }
                other => {
                    self.connected = false;
                    self.trigger_retry(RetryReason::ConnectFailed(other));
                }
            },
            Packet::Message(p) => {
                let id = p.id;
                let qos = p.qos;
                self.handler.on_message(InboundMessage {
                    kind: p.kind,
                    payload: p.payload,
                    props: p.props,
                });
                if qos == Qos::Qos1 {
                    let ack = Packet::Messack(MessackPacket {
                        id,
                        props: PropertyMap::new(),
                    });
                    let _ = self.write_packet(&ack).await;
                }
            }
            Packet::Messack(p) => {
                if let Some(pending) = self.message_tasks.remove(&p.id) {
                    let _ = pending.responder.send(Ok(()));
                }
            }
            Packet::Request(p) => {
                let id = p.id;
                let request = InboundRequest {
                    method: p.method,
                    body: p.body,
                    props: p.props,
                };
                let mut response = self.handler.on_request(request);
                response.id = id;
                let _ = self.write_packet(&Packet::Response(response)).await;
            }
            Packet::Response(p) => {
                if let Some(tx) = self.request_tasks.remove(&p.id) {
                    if p.code.is_ok() {
                        let _ = tx.send(Ok(p));
                    } else {
                        let _ = tx.send(Err(SessionError::RequestFailed(p.code)));
                    }
                }
            }
            Packet::Ping(_) => {
                let pong = Packet::Pong(PingPongPacket {
                    props: PropertyMap::new(),
                });
                let _ = self.write_packet(&pong).await;
            }
            Packet::Pong(_) => {
                self.awaiting_pong = false;
                self.schedule_timer(Timeout::PingInterval, self.options.ping_interval);
            }
            Packet::Close(p) => {
                self.connected = false;
                self.trigger_retry(RetryReason::ServerClosed(p.code));
            }
        }
    }

    async fn handle_timers_due(&mut self) {
        let now = Instant::now();
        while let Some(top) = self.timers.peek() {
            if top.at > now {
                break;
            }
            let entry = self.timers.pop().expect("peeked entry exists");
            self.handle_timeout(entry.timeout).await;
        }
    }

    async fn handle_timeout(&mut self, timeout: Timeout) {
        match timeout {
            Timeout::PingInterval => {
                if self.status() == SessionStatus::Opened && !self.awaiting_pong {
                    self.awaiting_pong = true;
                    let ping = Packet::Ping(PingPongPacket {
                        props: PropertyMap::new(),
                    });
                    let _ = self.write_packet(&ping).await;
                    self.schedule_timer(Timeout::PingTimeout, self.options.ping_timeout);
                }
            }
            Timeout::PingTimeout => {
                if self.awaiting_pong {
                    self.connected = false;
                    self.trigger_retry(RetryReason::PingTimeout);
                }
            }
            Timeout::Retry => {
                self.attempt_connect().await;
            }
            Timeout::RequestTimeout(id) => {
                if let Some(tx) = self.request_tasks.remove(&id) {
                    let _ = tx.send(Err(SessionError::RequestTimeout));
                }
            }
            Timeout::MessageRetry(id) => {
                self.handle_message_retry(id).await;
            }
        }
    }

    async fn handle_message_retry(&mut self, id: u16) {
        let exhausted = match self.message_tasks.get(&id) {
            Some(pending) => pending.attempts >= self.options.message_max_retry,
            None => return,
        };
        if exhausted {
            let pending = self.message_tasks.remove(&id).expect("checked above");
            let _ = pending.responder.send(Err(SessionError::MessageTimeout));
            return;
        }
        let packet = {
            let pending = self.message_tasks.get_mut(&id).expect("checked above");
            pending.attempts += 1;
            pending.packet.dup = true;
            pending.packet.clone()
        };
        let _ = self.write_packet(&Packet::Message(packet)).await;
        self.schedule_timer(Timeout::MessageRetry(id), self.options.message_timeout);
    }
}
