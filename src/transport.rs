use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::connect_async;

use crate::transport_actor::{TransportActor, TransportMessage, TransportResponse};

/// How long a single CDP command may wait for its response.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown() waits for the actor to finish its goodbye.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

static GLOBAL_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Returns a unique incremental id for request frames.
pub(crate) fn next_id() -> usize {
    GLOBAL_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

#[derive(Debug)]
pub(crate) struct ShutdownSignal {
    shutdown: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownSignal {
    fn new() -> Self {
        ShutdownSignal {
            shutdown: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Bounded so a runtime with a single worker thread cannot deadlock
    /// waiting for an actor scheduled on the blocked thread.
    fn wait(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut shutdown = self.shutdown.lock().unwrap();
        while !*shutdown {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            let (guard, result) = self.condvar.wait_timeout(shutdown, remaining).unwrap();
            shutdown = guard;
            if result.timed_out() {
                break;
            }
        }
    }

    pub(crate) fn signal_shutdown(&self) {
        let mut shutdown = self.shutdown.lock().unwrap();
        *shutdown = true;
        self.condvar.notify_all();
    }
}

/// Asynchronous interface to the browser's DevTools WebSocket.
///
/// All traffic goes through a spawned [`TransportActor`]; this handle only
/// queues commands and waiters for it.
#[derive(Debug)]
pub(crate) struct Transport {
    tx: mpsc::Sender<TransportMessage>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    shutdown_signal: Arc<ShutdownSignal>,
}

impl Transport {
    pub(crate) async fn new(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (ws_sink, ws_stream) = ws_stream.split();

        let (tx, rx) = mpsc::channel::<TransportMessage>(100);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let signal = Arc::new(ShutdownSignal::new());
        let signal_clone = signal.clone();

        let actor = TransportActor {
            pending_requests: HashMap::new(),
            event_listeners: HashMap::new(),
            ws_sink,
            command_rx: rx,
            shutdown_rx,
            shutdown_signal: signal_clone,
        };

        tokio::spawn(actor.run(ws_stream));

        Ok(Self {
            tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_signal: signal,
        })
    }

    /// Sends a command frame and awaits its response.
    pub(crate) async fn send(&self, command: Value) -> Result<TransportResponse> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(TransportMessage::Request(command, response_tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;

        let response = match time::timeout(COMMAND_TIMEOUT, response_rx).await {
            Ok(response) => response.map_err(|_| anyhow!("Response channel closed"))??,
            Err(_) => return Err(anyhow!("Timeout while waiting for response")),
        };

        if let TransportResponse::Response(res) = &response
            && let Some(error) = &res.error
        {
            return Err(anyhow!("Browser rejected command: {error}"));
        }

        Ok(response)
    }

    /// Registers a waiter for the target message answering `msg_id`.
    ///
    /// Registration completes before this returns, so the caller can send
    /// the command afterwards without racing the reply.
    pub(crate) async fn expect_target_msg(
        &self,
        msg_id: usize,
    ) -> Result<oneshot::Receiver<Result<TransportResponse>>> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(TransportMessage::ListenTargetMessage(
                msg_id as u64,
                response_tx,
            ))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;

        Ok(response_rx)
    }

    /// Registers a one-shot waiter for a session-scoped CDP event.
    pub(crate) async fn listen_for_event(
        &self,
        session_id: &str,
        method: &str,
    ) -> Result<oneshot::Receiver<Value>> {
        let (tx, rx) = oneshot::channel();

        self.tx
            .send(TransportMessage::ListenEvent {
                session_id: session_id.to_string(),
                method: method.to_string(),
                tx,
            })
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;

        Ok(rx)
    }

    /// Asks the actor to close the browser connection and waits for it to
    /// wind down. Safe to call more than once.
    pub(crate) fn shutdown(&self) {
        let tx = {
            let mut lock = self.shutdown_tx.lock().unwrap();
            lock.take()
        };

        if let Some(tx) = tx {
            let _ = tx.send(());
        }

        self.shutdown_signal.wait(SHUTDOWN_GRACE);
    }
}
