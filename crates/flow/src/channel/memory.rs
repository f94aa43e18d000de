//! In-process channel adapter.
//!
//! Stands in for the platform binding when replaying transcripts and in tests:
//! inbound messages are injected with [`MemoryChannel::emit`], outbound
//! commands are recorded and can be awaited one by one.

use async_trait::async_trait;
use ausweis_protocol::{Command, Message};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

use super::{ChannelAdapter, ChannelError};

/// Inbound buffer size per subscriber.
const INBOUND_CAPACITY: usize = 64;

pub struct MemoryChannel {
    /// `None` once the service side has hung up
    inbound: Mutex<Option<broadcast::Sender<String>>>,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    sent: Mutex<Vec<String>>,
    /// `true` once `initialize` may complete
    init_gate: watch::Sender<bool>,
    init_failure: Mutex<Option<String>>,
    init_calls: AtomicUsize,
    reject_sends: AtomicBool,
}

impl MemoryChannel {
    /// Channel that initializes immediately.
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (init_gate, _) = watch::channel(true);

        Self {
            inbound: Mutex::new(Some(inbound)),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            sent: Mutex::new(Vec::new()),
            init_gate,
            init_failure: Mutex::new(None),
            init_calls: AtomicUsize::new(0),
            reject_sends: AtomicBool::new(false),
        }
    }

    /// Channel whose `initialize` blocks until [`release`](Self::release).
    pub fn gated() -> Self {
        let channel = Self::new();
        channel.init_gate.send_replace(false);
        channel
    }

    /// Let pending and future `initialize` calls complete.
    pub fn release(&self) {
        self.init_gate.send_replace(true);
    }

    /// Make `initialize` fail with a bind error.
    pub fn fail_initialization(&self, reason: impl Into<String>) {
        *self
            .init_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    /// Make `send` report non-delivery.
    pub fn reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    pub fn initialize_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Inject raw message text. Returns the number of subscribers reached.
    pub fn emit(&self, raw: impl Into<String>) -> usize {
        match self.inbound_sender() {
            Some(sender) => sender.send(raw.into()).unwrap_or(0),
            None => 0,
        }
    }

    /// Hang up the inbound side; subscribers see the stream end.
    pub fn close(&self) {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn inbound_sender(&self) -> Option<broadcast::Sender<String>> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Inject a typed message.
    pub fn emit_message(&self, message: &Message) -> serde_json::Result<usize> {
        Ok(self.emit(serde_json::to_string(message)?))
    }

    pub fn subscriber_count(&self) -> usize {
        self.inbound_sender()
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Every delivered command, in order, as raw JSON.
    pub fn sent_raw(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every delivered command, in order.
    pub fn sent_commands(&self) -> Vec<Command> {
        self.sent_raw()
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    /// Wait for the next delivered command.
    pub async fn next_command(&self) -> Option<Command> {
        let raw = self.outbound_rx.lock().await.recv().await?;
        serde_json::from_str(&raw).ok()
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for MemoryChannel {
    async fn initialize(&self) -> Result<(), ChannelError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.init_gate.subscribe();
        let opened = gate.wait_for(|open| *open).await.is_ok();
        if !opened {
            return Err(ChannelError::Bind("initialization gate dropped".to_string()));
        }

        let failure = self
            .init_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match failure {
            Some(reason) => Err(ChannelError::Bind(reason)),
            None => Ok(()),
        }
    }

    fn send(&self, command: &str) -> bool {
        if self.reject_sends.load(Ordering::SeqCst) {
            debug!("Memory channel rejecting command");
            return false;
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());
        // Receiver lives as long as self
        let _ = self.outbound_tx.send(command.to_string());
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        match self.inbound_sender() {
            Some(sender) => sender.subscribe(),
            // Already closed: hand out a receiver that ends immediately
            None => broadcast::channel(1).1,
        }
    }
}
