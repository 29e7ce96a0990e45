use crate::{config::stream_url, error::ConnectionError, helpers::message_text};
use futures_channel::{
    mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    oneshot,
};
use futures_timer::Delay;
use futures_util::{future, pin_mut, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tungstenite::Message;
use uuid::Uuid;

type Tx = UnboundedSender<Message>;

/// Time a closing connection gets to flush its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Message(String),
}

/// Shared by every loop the manager spawns. Each loop carries the generation
/// it was started with and may only touch `outgoing` while that generation is
/// current or while the live sender is its own.
#[derive(Default)]
struct ConnectionState {
    generation: AtomicUsize,
    attempts: AtomicUsize,
    last_message: Mutex<Option<String>>,
    outgoing: Mutex<Option<(usize, Tx)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConnectionState {
    fn is_current(&self, generation: usize) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Starts a new generation, leaving older loops stale.
    fn advance(&self) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_connected(&self) -> bool {
        let current = self.generation.load(Ordering::SeqCst);
        matches!(lock(&self.outgoing).as_ref(), Some((owner, _)) if *owner == current)
    }

    /// Installs the sender of a fresh connection; `false` for a stale loop.
    fn mark_connected(
        &self,
        generation: usize,
        tx: Tx,
        events: &UnboundedSender<ConnectionEvent>,
    ) -> bool {
        let mut outgoing = lock(&self.outgoing);
        if !self.is_current(generation) {
            return false;
        }
        *outgoing = Some((generation, tx));
        let _ = events.unbounded_send(ConnectionEvent::Connected);
        true
    }

    fn mark_disconnected(&self, generation: usize, events: &UnboundedSender<ConnectionEvent>) {
        let mut outgoing = lock(&self.outgoing);
        if matches!(outgoing.as_ref(), Some((owner, _)) if *owner == generation) {
            outgoing.take();
            let _ = events.unbounded_send(ConnectionEvent::Disconnected);
        }
    }

    /// Queues a close frame and ends the outbound half of this generation's connection.
    fn close_outgoing(&self, generation: usize) {
        if let Some((owner, tx)) = lock(&self.outgoing).as_ref() {
            if *owner == generation {
                let _ = tx.unbounded_send(Message::Close(None));
                tx.close_channel();
            }
        }
    }

    /// Stores an inbound payload; `false` when it came from a stale loop.
    fn record_message(&self, generation: usize, text: &str) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        *lock(&self.last_message) = Some(text.to_string());
        true
    }

    fn send(&self, payload: &str) -> Result<(), ConnectionError> {
        let current = self.generation.load(Ordering::SeqCst);
        match lock(&self.outgoing).as_ref() {
            Some((owner, tx)) if *owner == current => tx
                .unbounded_send(Message::Text(payload.to_string()))
                .map_err(|_| ConnectionError::Closed),
            _ => Err(ConnectionError::NotConnected),
        }
    }
}

/// Owns at most one stream connection to the live quiz endpoint of a session.
///
/// The connection is opened lazily once a session id is set and is retried
/// forever with a fixed delay after any failure or remote close. Clearing the
/// session id, calling [`ConnectionManager::close`] or dropping the manager
/// stops the loop, including a pending reconnect.
pub struct ConnectionManager {
    ws_url: String,
    reconnect_delay: Duration,
    session_id: Option<String>,
    state: Arc<ConnectionState>,
    events: UnboundedSender<ConnectionEvent>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(
        ws_url: impl Into<String>,
        reconnect_delay: Duration,
    ) -> (Self, UnboundedReceiver<ConnectionEvent>) {
        let (events, events_rx) = unbounded();
        let manager = ConnectionManager {
            ws_url: ws_url.into(),
            reconnect_delay,
            session_id: None,
            state: Arc::new(ConnectionState::default()),
            events,
            shutdown_tx: None,
            task: None,
        };
        (manager, events_rx)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Points the manager at a session; `None` tears the connection down.
    pub fn set_session(&mut self, session_id: Option<String>) {
        if self.session_id == session_id {
            return;
        }
        self.stop();
        self.session_id = session_id;

        if let Some(session_id) = &self.session_id {
            let url = stream_url(&self.ws_url, session_id);
            let generation = self.state.advance();
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            self.shutdown_tx = Some(shutdown_tx);
            self.task = Some(tokio::spawn(connection_loop(
                url,
                generation,
                self.state.clone(),
                self.events.clone(),
                shutdown_rx,
                self.reconnect_delay,
            )));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn last_message(&self) -> Option<String> {
        lock(&self.state.last_message).clone()
    }

    /// Number of connection attempts started since the manager was created.
    pub fn connection_attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Sends a text payload over the live connection.
    pub fn send(&self, payload: &str) -> Result<(), ConnectionError> {
        let sent = self.state.send(payload);
        if let Err(ConnectionError::NotConnected) = sent {
            warn!("Dropping outbound message, stream not connected");
        }
        sent
    }

    /// Stops the connection loop and waits briefly for it to finish.
    pub async fn close(&mut self) {
        self.session_id = None;
        let task = self.stop();

        if let Some(mut task) = task {
            match tokio::time::timeout(CLOSE_GRACE * 2, &mut task).await {
                Ok(_) => (),
                Err(_) => {
                    warn!("Connection loop did not stop in time, aborting");
                    task.abort();
                }
            }
        }
    }

    fn stop(&mut self) -> Option<JoinHandle<()>> {
        self.state.advance();
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        self.task.take()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn connection_loop(
    url: String,
    generation: usize,
    state: Arc<ConnectionState>,
    events: UnboundedSender<ConnectionEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    reconnect_delay: Duration,
) {
    loop {
        let connection_id = Uuid::new_v4().to_string();
        state.attempts.fetch_add(1, Ordering::SeqCst);
        info!("Connecting to {} ({})", &url, &connection_id);

        let attempt = run_connection(&url, &connection_id, generation, &state, &events);
        pin_mut!(attempt);

        tokio::select! {
            _ = &mut shutdown_rx => {
                state.close_outgoing(generation);
                let _ = tokio::time::timeout(CLOSE_GRACE, attempt).await;
                state.mark_disconnected(generation, &events);
                info!("Connection {} closed", &connection_id);
                return;
            }
            _ = &mut attempt => (),
        }

        state.mark_disconnected(generation, &events);
        warn!(
            "Connection {} lost, reconnecting in {:?}",
            &connection_id, reconnect_delay
        );

        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Reconnect to {} cancelled", &url);
                return;
            }
            _ = Delay::new(reconnect_delay) => (),
        }
    }
}

async fn run_connection(
    url: &str,
    connection_id: &str,
    generation: usize,
    state: &ConnectionState,
    events: &UnboundedSender<ConnectionEvent>,
) {
    let mut ws_stream = match tokio_tungstenite::connect_async(url).await {
        Ok((stream, _)) => stream,
        Err(error) => {
            warn!("Connection {} to {} failed: {}", connection_id, url, error);
            return;
        }
    };
    info!("WebSocket connection established: {}", connection_id);

    let (tx, rx) = unbounded();
    if !state.mark_connected(generation, tx, events) {
        info!("Connection {} is stale, closing it", connection_id);
        let _ = ws_stream.close(None).await;
        return;
    }

    let (outgoing, incoming) = ws_stream.split();

    let receive_incoming = incoming.try_for_each(|msg| {
        match message_text(&msg) {
            Ok(text) => {
                if state.record_message(generation, &text) {
                    let _ = events.unbounded_send(ConnectionEvent::Message(text));
                }
            }
            Err(_) => debug!("Ignoring non-text frame on {}", connection_id),
        }

        future::ok(())
    });

    let send_outgoing = rx.map(Ok).forward(outgoing);

    pin_mut!(receive_incoming, send_outgoing);
    match future::select(receive_incoming, send_outgoing).await {
        future::Either::Left((Err(error), _)) => {
            warn!("Connection {} read error: {}", connection_id, error)
        }
        future::Either::Right((Err(error), _)) => {
            warn!("Connection {} write error: {}", connection_id, error)
        }
        _ => (),
    }

    info!("{} disconnected", connection_id);
}
