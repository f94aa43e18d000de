//! Mutable state of the flow controller.

use ausweis_protocol::Command;
use tokio::task::AbortHandle;

/// Lifecycle of a flow. Termination is the return to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    /// Channel binding in flight
    Initializing,
    /// Start command sent, messages are being handled
    Active,
}

/// State owned by one controller. Never touched by negotiators directly.
#[derive(Debug)]
pub(crate) struct FlowSession {
    state: FlowState,
    /// Incremented on every `begin`; continuations compare against it
    epoch: u64,
    /// Survives resets: the channel is brought up at most once
    pub(crate) channel_initialized: bool,
    /// Diagnostic log of delivered commands, secrets masked
    pub(crate) sent_commands: Vec<Command>,
    tasks: Vec<AbortHandle>,
}

impl FlowSession {
    pub(crate) fn new() -> Self {
        Self {
            state: FlowState::Idle,
            epoch: 0,
            channel_initialized: false,
            sent_commands: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub(crate) fn state(&self) -> FlowState {
        self.state
    }

    pub(crate) fn in_progress(&self) -> bool {
        self.state != FlowState::Idle
    }

    /// Whether a continuation started in `epoch` may still act.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.in_progress() && self.epoch == epoch
    }

    /// Idle → Initializing. Returns the new session epoch.
    pub(crate) fn begin(&mut self) -> u64 {
        debug_assert!(!self.in_progress());
        self.epoch += 1;
        self.state = FlowState::Initializing;
        self.sent_commands.clear();
        self.epoch
    }

    pub(crate) fn activate(&mut self) {
        if self.in_progress() {
            self.state = FlowState::Active;
        }
    }

    /// Register a spawned continuation so reset can abort it.
    pub(crate) fn track(&mut self, epoch: u64, handle: AbortHandle) {
        if self.is_current(epoch) {
            self.tasks.push(handle);
        } else {
            handle.abort();
        }
    }

    /// Back to `Idle`: detaches the message pump and abandons negotiations.
    pub(crate) fn reset(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.state = FlowState::Idle;
        self.sent_commands.clear();
    }
}
