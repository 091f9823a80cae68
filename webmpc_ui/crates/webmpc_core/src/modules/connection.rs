use crate::config::ClientConfig;
use crate::dispatcher::{body_handler, Body, Dispatcher, Handler};
use crate::queue::OutboundQueue;
use crate::timer::{arm, fire, Timer};
use crate::transport::{Connector, EventSender, TransportEvent, TransportHandle, WsConnector};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;
use webmpc_protocol::{ClientCommand, MessageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

enum Control {
    Send(ClientCommand),
    Subscribe(MessageKind, Handler),
}

/// Client-facing handle to the single server connection. Clones share the
/// same socket, buffer and subscriber registry.
#[derive(Clone)]
pub struct Connection {
    tx: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<ConnectionState>,
    sessions: watch::Receiver<u64>,
}

impl Connection {
    pub fn spawn(config: &ClientConfig) -> Self {
        Self::spawn_with(config, WsConnector)
    }

    pub fn spawn_with<C: Connector>(config: &ClientConfig, connector: C) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (sessions_tx, sessions_rx) = watch::channel(0);
        let actor = ConnectionActor::new(config, connector, state_tx, sessions_tx);
        tokio::spawn(actor.run(rx));
        Self {
            tx,
            state: state_rx,
            sessions: sessions_rx,
        }
    }

    /// Queues a command; it goes out once the socket is open, after every
    /// command submitted before it.
    pub fn send(&self, cmd: ClientCommand) {
        if self.tx.send(Control::Send(cmd)).is_err() {
            debug!("connection actor gone; command dropped");
        }
    }

    /// Registers a callback for one message type. Callbacks run on the
    /// connection task, in registration order, and get the body only.
    pub fn on<T, F>(&self, callback: F)
    where
        T: Body,
        F: FnMut(&T) + Send + 'static,
    {
        let control = Control::Subscribe(T::KIND, body_handler(callback));
        if self.tx.send(control).is_err() {
            debug!(kind = %T::KIND, "connection actor gone; subscription dropped");
        }
    }

    /// Forwards every body of type `T` into a channel.
    pub fn stream<T>(&self) -> mpsc::UnboundedReceiver<T>
    where
        T: Body + Clone + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on(move |body: &T| {
            let _ = tx.send(body.clone());
        });
        rx
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Subscribes to sockets opened after the one that will carry commands
    /// sent from here on. Server state fetched before such a reopen may
    /// have been missed and should be requested again.
    pub fn reopened(&self) -> Reopened {
        // State first: a socket that opens in between is then counted as
        // the one carrying our commands, not as a reopen.
        let connected = self.state() == ConnectionState::Connected;
        let mut sessions = self.sessions.clone();
        let current = *sessions.borrow_and_update();
        Reopened {
            sessions,
            seen: if connected { current } else { current + 1 },
        }
    }
}

/// Yields once per socket opened after the subscription point.
pub struct Reopened {
    sessions: watch::Receiver<u64>,
    seen: u64,
}

impl Reopened {
    /// Waits for the next reopen and returns its session number, or `None`
    /// once the connection task is gone.
    pub async fn next(&mut self) -> Option<u64> {
        loop {
            self.sessions.changed().await.ok()?;
            let session = *self.sessions.borrow_and_update();
            if session > self.seen {
                self.seen = session;
                return Some(session);
            }
        }
    }
}

struct ConnectionActor<C> {
    connector: C,
    endpoint: Url,
    subprotocol: String,
    reconnect_delay: Duration,

    generation: u64,
    transport: Option<TransportHandle>,
    queue: OutboundQueue,
    dispatcher: Dispatcher,
    reconnect: Timer,

    state: watch::Sender<ConnectionState>,
    sessions: watch::Sender<u64>,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
}

impl<C: Connector> ConnectionActor<C> {
    fn new(
        config: &ClientConfig,
        connector: C,
        state: watch::Sender<ConnectionState>,
        sessions: watch::Sender<u64>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            endpoint: config.endpoint.clone(),
            subprotocol: config.subprotocol.clone(),
            reconnect_delay: config.reconnect_delay,
            generation: 0,
            transport: None,
            queue: OutboundQueue::new(),
            dispatcher: Dispatcher::new(),
            reconnect: None,
            state,
            sessions,
            events_tx,
            events_rx,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Control>) {
        self.open();

        loop {
            tokio::select! {
                control = rx.recv() => {
                    match control {
                        Some(Control::Send(cmd)) => self.queue.submit(cmd, &mut self.transport),
                        Some(Control::Subscribe(kind, handler)) => self.dispatcher.register(kind, handler),
                        None => {
                            debug!("all connection handles dropped; stopping");
                            return;
                        }
                    }
                }
                Some((generation, event)) = self.events_rx.recv() => {
                    self.on_transport_event(generation, event);
                }
                () = fire(&mut self.reconnect), if self.reconnect.is_some() => {
                    self.reconnect = None;
                    self.open();
                }
            }
        }
    }

    fn open(&mut self) {
        self.reconnect = None;
        self.transport = None;
        self.generation += 1;
        self.set_state(ConnectionState::Connecting);
        debug!(endpoint = %self.endpoint, generation = self.generation, "opening socket");
        self.transport = Some(self.connector.open(
            self.generation,
            &self.endpoint,
            &self.subprotocol,
            self.events_tx.clone(),
        ));
    }

    fn on_transport_event(&mut self, generation: u64, event: TransportEvent) {
        let live = self
            .transport
            .as_ref()
            .is_some_and(|t| t.generation() == generation);
        if !live {
            debug!(generation, current = self.generation, "ignoring event from stale socket");
            return;
        }

        match event {
            TransportEvent::Opened => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.mark_open();
                }
                // Counted before the state flips; see `Connection::reopened`.
                self.sessions.send_modify(|n| *n += 1);
                self.set_state(ConnectionState::Connected);
                info!(endpoint = %self.endpoint, "connected");
                let flushed = self.queue.drain(&mut self.transport);
                if flushed > 0 {
                    debug!(flushed, "replayed buffered commands");
                }
            }
            TransportEvent::Message(text) => {
                self.dispatcher.dispatch(&text);
            }
            TransportEvent::Error(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "socket error");
            }
            TransportEvent::Closed => {
                self.transport = None;
                self.set_state(ConnectionState::Disconnected);
                info!(retry_in = ?self.reconnect_delay, queued = self.queue.len(), "disconnected");
                self.reconnect = arm(self.reconnect_delay);
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{settle, FakeConnector};
    use std::sync::{Arc, Mutex};
    use webmpc_protocol::Status;

    fn config() -> ClientConfig {
        ClientConfig::for_origin("http://player.local").unwrap()
    }

    fn add(uri: &str) -> ClientCommand {
        ClientCommand::Add { uri: uri.to_string() }
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_commands_flush_on_open_in_submission_order() {
        let fake = FakeConnector::default();
        let conn = Connection::spawn_with(&config(), fake.clone());
        settle().await;
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(fake.opens(), 1);

        for uri in ["a", "b", "c"] {
            conn.send(add(uri));
        }
        settle().await;
        assert!(fake.sent(1).is_empty());

        fake.emit(1, TransportEvent::Opened);
        settle().await;
        assert_eq!(conn.state(), ConnectionState::Connected);

        conn.send(add("d"));
        settle().await;
        assert_eq!(fake.sent(1), vec![add("a"), add("b"), add("c"), add("d")]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_configured_delay_and_replays_queue() {
        let fake = FakeConnector::default();
        let config = config().with_reconnect_delay(Duration::from_secs(5));
        let conn = Connection::spawn_with(&config, fake.clone());
        settle().await;
        fake.emit(1, TransportEvent::Opened);
        settle().await;

        fake.emit(1, TransportEvent::Error("reset by peer".into()));
        fake.emit(1, TransportEvent::Closed);
        settle().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        conn.send(ClientCommand::Next);
        conn.send(ClientCommand::Status);
        settle().await;

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert_eq!(fake.opens(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fake.opens(), 2);
        assert_eq!(conn.state(), ConnectionState::Connecting);

        fake.emit(2, TransportEvent::Opened);
        settle().await;
        assert_eq!(fake.sent(2), vec![ClientCommand::Next, ClientCommand::Status]);
        assert!(fake.sent(1).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_keep_retrying() {
        let fake = FakeConnector::default();
        let config = config().with_reconnect_delay(Duration::from_millis(100));
        let _conn = Connection::spawn_with(&config, fake.clone());
        settle().await;

        for generation in 1..=3 {
            fake.emit(generation, TransportEvent::Error("connection refused".into()));
            fake.emit(generation, TransportEvent::Closed);
            settle().await;
            tokio::time::sleep(Duration::from_millis(101)).await;
        }
        assert_eq!(fake.opens(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_stale_sockets_are_ignored() {
        let fake = FakeConnector::default();
        let config = config().with_reconnect_delay(Duration::from_millis(10));
        let conn = Connection::spawn_with(&config, fake.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        conn.on(move |status: &Status| log.lock().unwrap().push(status.volume));
        settle().await;

        fake.emit(1, TransportEvent::Closed);
        settle().await;
        tokio::time::sleep(Duration::from_millis(11)).await;
        assert_eq!(fake.opens(), 2);

        // The old socket cannot resurrect itself or deliver messages.
        fake.emit(1, TransportEvent::Opened);
        fake.emit(1, TransportEvent::Message(r#"{"Type":"Status","Data":{"volume":1}}"#.into()));
        settle().await;
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(seen.lock().unwrap().is_empty());

        fake.emit(2, TransportEvent::Opened);
        fake.emit(2, TransportEvent::Message(r#"{"Type":"Status","Data":{"volume":2}}"#.into()));
        settle().await;
        assert_eq!(*seen.lock().unwrap(), vec![Some(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_frames_do_not_stop_delivery() {
        let fake = FakeConnector::default();
        let conn = Connection::spawn_with(&config(), fake.clone());
        let mut files = conn.stream::<Vec<String>>();
        settle().await;
        fake.emit(1, TransportEvent::Opened);

        fake.emit(1, TransportEvent::Message("garbage".into()));
        fake.emit(1, TransportEvent::Message(r#"{"Type":"Unknown","Data":1}"#.into()));
        fake.emit(1, TransportEvent::Message(r#"{"Type":"Files","Data":["x.mp3"]}"#.into()));
        settle().await;

        assert_eq!(files.try_recv().unwrap(), vec!["x.mp3".to_string()]);
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn reopened_skips_the_socket_that_carries_queued_commands() {
        let fake = FakeConnector::default();
        let config = config().with_reconnect_delay(Duration::from_millis(10));
        let conn = Connection::spawn_with(&config, fake.clone());
        let mut reopened = conn.reopened();
        settle().await;

        fake.emit(1, TransportEvent::Opened);
        settle().await;
        let first = tokio::time::timeout(Duration::from_millis(50), reopened.next()).await;
        assert!(first.is_err(), "the first socket is not a reopen");

        fake.emit(1, TransportEvent::Closed);
        settle().await;
        tokio::time::sleep(Duration::from_millis(11)).await;
        fake.emit(2, TransportEvent::Opened);
        assert_eq!(reopened.next().await, Some(2));

        // Subscribing while connected counts from the live socket.
        let mut late = conn.reopened();
        let none_yet = tokio::time::timeout(Duration::from_millis(50), late.next()).await;
        assert!(none_yet.is_err());
    }
}
