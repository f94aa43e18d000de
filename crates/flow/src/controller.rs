//! Authentication flow controller.
//!
//! Drives one eID authentication at a time against the identity service:
//!
//! ```text
//! Idle
//!     ↓ (start)
//! Initializing ── channel init fails ──→ error exit
//!     ↓ (channel ready, RUN_AUTH sent)
//! Active ── ENTER_CAN / ENTER_PUK, failed AUTH, negotiator error ──→ error exit
//!     ↓ (AUTH ok + url)
//! success exit
//! ```
//!
//! Both exits and `cancel()` run the same reset, which returns to `Idle`,
//! detaches the message pump and abandons outstanding negotiations. Every
//! continuation carries the epoch of the session that spawned it and does
//! nothing once that session is gone.

use ausweis_core::FlowConfig;
use ausweis_protocol::{Command, Message, ReaderPrompt, WorkflowMessages};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, info_span, trace, warn, Instrument, Span};
use zeroize::{Zeroize, Zeroizing};

use crate::access_rights::AccessRightsRequest;
use crate::channel::{ChannelAdapter, ChannelError};
use crate::delegate::AuthFlowDelegate;
use crate::error::{ErrorDetails, ErrorReason, FlowError, FlowResult};
use crate::outcome::AuthOutcome;
use crate::pin::PinChallenge;
use crate::session::{FlowSession, FlowState};

/// Single-flight authentication flow.
pub struct AuthFlow {
    inner: Arc<FlowInner>,
}

impl std::fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFlow").finish_non_exhaustive()
    }
}

struct FlowInner {
    channel: Arc<dyn ChannelAdapter>,
    delegate: Arc<dyn AuthFlowDelegate>,
    config: FlowConfig,
    session: Mutex<FlowSession>,
    /// Held around every delegate notification and every reset that ends in
    /// one, so nothing is delivered after the terminal callback. Taken before
    /// `session`.
    delivery: Mutex<()>,
}

impl AuthFlow {
    pub fn new(
        channel: Arc<dyn ChannelAdapter>,
        delegate: Arc<dyn AuthFlowDelegate>,
        config: FlowConfig,
    ) -> Self {
        Self {
            inner: Arc::new(FlowInner {
                channel,
                delegate,
                config,
                session: Mutex::new(FlowSession::new()),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// Start an authentication against `tc_token_url`.
    ///
    /// Returns immediately; the outcome arrives through the delegate. Must be
    /// called from within a tokio runtime.
    pub fn start(&self, tc_token_url: impl Into<String>) -> FlowResult<&Self> {
        let runtime = Handle::try_current()?;
        let tc_token_url = tc_token_url.into();

        let mut session = self.inner.session();
        if session.in_progress() {
            return Err(FlowError::AlreadyInProgress);
        }
        let epoch = session.begin();
        let span = info_span!("auth_flow", epoch);

        let inbound = self.inner.channel.subscribe();
        let pump = runtime.spawn(
            Arc::clone(&self.inner)
                .pump(epoch, inbound)
                .instrument(span.clone()),
        );
        session.track(epoch, pump.abort_handle());

        let bootstrap = runtime.spawn(
            Arc::clone(&self.inner)
                .bootstrap(epoch, tc_token_url)
                .instrument(span.clone()),
        );
        session.track(epoch, bootstrap.abort_handle());
        drop(session);

        span.in_scope(|| info!("Authentication flow started"));
        Ok(self)
    }

    /// Cancel the running flow.
    ///
    /// Always honored locally: the flow is reset and `on_error` receives
    /// reason `cancelled` before this returns, whatever the service does with
    /// the CANCEL command.
    pub async fn cancel(&self) -> FlowResult<()> {
        let _delivery = self.inner.delivery();
        {
            let mut session = self.inner.session();
            if !session.in_progress() {
                return Err(FlowError::NotInProgress);
            }
            if session.channel_initialized {
                if let Err(err) = self.inner.transmit(&mut session, Command::Cancel) {
                    warn!(error = %err, "Failed to send CANCEL");
                }
            }
            session.reset();
        }

        info!("Authentication flow cancelled");
        self.inner.delegate.on_error(ErrorDetails::new(
            ErrorReason::Cancelled,
            "Flow cancelled using 'cancel()' method",
        ));
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.inner.session().in_progress()
    }

    pub fn state(&self) -> FlowState {
        self.inner.session().state()
    }

    /// Commands delivered in the current session, secrets masked.
    pub fn sent_commands(&self) -> Vec<Command> {
        self.inner.session().sent_commands.clone()
    }
}

impl Drop for AuthFlow {
    fn drop(&mut self) {
        // No callbacks: the owner is gone
        let mut session = self.inner.session();
        if session.in_progress() && session.channel_initialized {
            if let Err(err) = self.inner.transmit(&mut session, Command::Cancel) {
                warn!(error = %err, "Failed to send CANCEL");
            }
        }
        session.reset();
    }
}

impl FlowInner {
    fn session(&self) -> MutexGuard<'_, FlowSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a non-terminal delegate callback unless session `epoch` is over.
    fn notify(&self, epoch: u64, callback: impl FnOnce(&dyn AuthFlowDelegate)) {
        let _delivery = self.delivery();
        if !self.session().is_current(epoch) {
            return;
        }
        callback(self.delegate.as_ref());
    }

    /// Encode and deliver one command, recording it in the session log.
    fn transmit(&self, session: &mut FlowSession, mut command: Command) -> Result<(), ChannelError> {
        let json = command.to_json().map(Zeroizing::new);
        let logged = command.redacted();
        scrub(&mut command);
        let json = json?;

        if self.config.debug {
            info!(command = ?logged, "Sending command to identity service");
        } else {
            trace!(command = logged.name(), "Sending command to identity service");
        }

        if !self.channel.send(&json) {
            return Err(ChannelError::Rejected(logged.name()));
        }
        session.sent_commands.push(logged);
        Ok(())
    }

    /// Send on behalf of the session `epoch`. `Ok(false)` if it is gone.
    fn send_in_session(&self, epoch: u64, mut command: Command) -> Result<bool, ChannelError> {
        let mut session = self.session();
        if !session.is_current(epoch) {
            debug!(command = command.name(), "Dropping command of a finished flow");
            scrub(&mut command);
            return Ok(false);
        }
        self.transmit(&mut session, command)?;
        Ok(true)
    }

    /// Single error exit. No-op unless `epoch` is still the running session.
    fn fail(&self, epoch: u64, details: ErrorDetails) {
        let _delivery = self.delivery();
        {
            let mut session = self.session();
            if !session.is_current(epoch) {
                debug!(reason = %details.reason, "Ignoring error of a finished flow");
                return;
            }
            if session.channel_initialized {
                if let Err(err) = self.transmit(&mut session, Command::Cancel) {
                    warn!(error = %err, "Failed to send CANCEL");
                }
            }
            session.reset();
        }

        warn!(reason = %details.reason, message = %details.message, "Authentication flow failed");
        self.delegate.on_error(details);
    }

    fn succeed(&self, epoch: u64, refresh_url: String) {
        let _delivery = self.delivery();
        {
            let mut session = self.session();
            if !session.is_current(epoch) {
                return;
            }
            session.reset();
        }

        info!("Authentication flow succeeded");
        self.delegate.on_success(refresh_url);
    }

    /// Bring the channel up (once per controller) and send RUN_AUTH.
    async fn bootstrap(self: Arc<Self>, epoch: u64, tc_token_url: String) {
        let needs_init = {
            let session = self.session();
            if !session.is_current(epoch) {
                return;
            }
            !session.channel_initialized
        };

        if needs_init {
            if let Err(err) = self.channel.initialize().await {
                self.fail(
                    epoch,
                    ErrorDetails::new(
                        ErrorReason::SdkInitializationFailed,
                        "Error initializing the identity service channel",
                    )
                    .with_cause(err),
                );
                return;
            }
            self.session().channel_initialized = true;
            debug!("Identity service channel initialized");
        }

        let command = self.run_auth_command(tc_token_url);
        let sent = {
            let mut session = self.session();
            if !session.is_current(epoch) {
                return;
            }
            session.activate();
            self.transmit(&mut session, command)
        };

        if let Err(err) = sent {
            self.fail(
                epoch,
                ErrorDetails::new(ErrorReason::Unknown, "Error while starting auth flow")
                    .with_cause(err),
            );
        }
    }

    fn run_auth_command(&self, tc_token_url: String) -> Command {
        let texts = &self.config.session_messages;
        Command::RunAuth {
            tc_token_url,
            developer_mode: Some(self.config.developer_mode),
            handle_interrupt: None,
            status: None,
            messages: Some(WorkflowMessages {
                session_started: Some(texts.session_started.clone()),
                session_failed: Some(texts.session_failed.clone()),
                session_succeeded: Some(texts.session_succeeded.clone()),
                session_in_progress: Some(texts.session_in_progress.clone()),
            }),
        }
    }

    /// Deliver inbound messages in order until the session resets. Losing a
    /// message ends the flow, since the service may be waiting on an answer.
    async fn pump(self: Arc<Self>, epoch: u64, mut inbound: broadcast::Receiver<String>) {
        loop {
            match inbound.recv().await {
                Ok(raw) => self.on_raw_message(epoch, &raw),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Inbound message stream lagged");
                    self.fail(
                        epoch,
                        ErrorDetails::new(
                            ErrorReason::Unknown,
                            "Messages from identity service were lost",
                        )
                        .with_cause(ChannelError::Lagged(skipped)),
                    );
                    return;
                }
                Err(RecvError::Closed) => {
                    self.fail(
                        epoch,
                        ErrorDetails::new(ErrorReason::Unknown, "Lost connection to identity service")
                            .with_cause(ChannelError::Closed),
                    );
                    return;
                }
            }
        }
    }

    fn on_raw_message(self: &Arc<Self>, epoch: u64, raw: &str) {
        if !self.session().is_current(epoch) {
            return;
        }

        if self.config.debug {
            info!(message = raw, "Received message from identity service");
        } else {
            trace!(message = raw, "Received message from identity service");
        }

        match Message::from_json(raw) {
            Ok(message) => self.dispatch(epoch, message),
            Err(err) => match Message::peek_kind(raw) {
                // The service now waits for an answer we cannot give
                Some(kind) if Message::is_actionable_kind(&kind) => self.fail(
                    epoch,
                    ErrorDetails::new(
                        ErrorReason::Unknown,
                        format!("Unreadable '{}' message from identity service", kind),
                    )
                    .with_cause(err),
                ),
                _ => warn!(error = %err, "Skipping unreadable message"),
            },
        }
    }

    fn dispatch(self: &Arc<Self>, epoch: u64, message: Message) {
        match message {
            Message::AccessRights(message) => {
                let request = AccessRightsRequest::from(&message);
                self.spawn_negotiation(epoch, Arc::clone(self).negotiate_access_rights(epoch, request));
            }
            Message::Reader(reader) => {
                let attached = reader.has_known_card();
                self.notify(epoch, |delegate| delegate.on_card_attached_changed(attached));
            }
            Message::Status(status) => {
                if let Some(progress) = status.auth_progress() {
                    self.notify(epoch, |delegate| delegate.on_status_progress(progress));
                }
            }
            Message::InsertCard(_) => self.notify(epoch, |delegate| delegate.on_attach_card()),
            Message::EnterPin(prompt) => {
                self.spawn_negotiation(epoch, Arc::clone(self).negotiate_pin(epoch, prompt));
            }
            Message::Auth(message) => match AuthOutcome::from_message(&message) {
                None => debug!("Authentication acknowledged"),
                Some(AuthOutcome::Success { refresh_url }) => self.succeed(epoch, refresh_url),
                Some(AuthOutcome::Failure(details)) => self.fail(epoch, details),
            },
            Message::EnterCan(_) => self.fail(epoch, card_locked("CAN")),
            Message::EnterPuk(_) => self.fail(epoch, card_locked("PUK")),
            Message::BadState(notice)
            | Message::InternalError(notice)
            | Message::Invalid(notice)
            | Message::UnknownCommand(notice) => {
                warn!(error = ?notice.error, "Identity service reported a protocol error");
            }
            message @ (Message::ApiLevel(_)
            | Message::Certificate(_)
            | Message::ChangePin(_)
            | Message::EnterNewPin(_)
            | Message::Info(_)
            | Message::ReaderList(_)
            | Message::Pause(_)) => {
                trace!(kind = message.kind(), "Ignoring message");
            }
        }
    }

    fn spawn_negotiation<F>(&self, epoch: u64, negotiation: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(negotiation.instrument(Span::current()));
        self.session().track(epoch, handle.abort_handle());
    }

    /// Await a delegate answer, bounded by the configured timeout if any.
    async fn bounded<T>(&self, answer: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        match self.config.negotiation_timeout() {
            Some(limit) => tokio::time::timeout(limit, answer)
                .await
                .map_err(|_| anyhow::anyhow!("no answer within {:?}", limit))?,
            None => answer.await,
        }
    }

    async fn negotiate_access_rights(self: Arc<Self>, epoch: u64, request: AccessRightsRequest) {
        debug!(
            effective = request.effective.len(),
            required = request.required.len(),
            optional = request.optional.len(),
            "Access rights requested"
        );

        let decision = match self
            .bounded(self.delegate.request_access_rights(request.clone()))
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                self.fail(
                    epoch,
                    ErrorDetails::new(ErrorReason::Unknown, "Error in onRequestAccessRights callback")
                        .with_cause(err),
                );
                return;
            }
        };

        match request.resolve(decision) {
            Ok(commands) => {
                for command in commands {
                    if !self.send_or_fail(epoch, command) {
                        return;
                    }
                }
            }
            Err(details) => self.fail(epoch, details),
        }
    }

    async fn negotiate_pin(self: Arc<Self>, epoch: u64, prompt: ReaderPrompt) {
        let challenge = PinChallenge::from_prompt(&prompt);
        debug!(
            attempts_remaining = challenge.attempts_remaining(),
            failed_attempts = challenge.failed_attempts(),
            "PIN requested"
        );

        match self.bounded(self.delegate.enter_pin(challenge)).await {
            Ok(pin) => {
                let command = Command::SetPin {
                    value: Some(pin.as_str().to_owned()),
                };
                self.send_or_fail(epoch, command);
            }
            Err(err) => self.fail(
                epoch,
                ErrorDetails::new(ErrorReason::Unknown, "Error in onEnterPin callback")
                    .with_cause(err),
            ),
        }
    }

    /// `false` if the flow is over, either already or because delivery failed.
    fn send_or_fail(&self, epoch: u64, command: Command) -> bool {
        let name = command.name();
        match self.send_in_session(epoch, command) {
            Ok(sent) => sent,
            Err(err) => {
                self.fail(
                    epoch,
                    ErrorDetails::new(ErrorReason::Unknown, format!("Failed to send {}", name))
                        .with_cause(err),
                );
                false
            }
        }
    }
}

fn card_locked(unlock_with: &str) -> ErrorDetails {
    ErrorDetails::new(
        ErrorReason::CardLocked,
        format!(
            "The card is locked and first needs to be unlocked using the {}. \
             This is not supported by the auth flow. This is probably due to too many failed PIN attempts",
            unlock_with
        ),
    )
}

/// Wipe secret values held by a command.
fn scrub(command: &mut Command) {
    match command {
        Command::SetPin { value: Some(value) }
        | Command::SetNewPin { value }
        | Command::SetCan { value }
        | Command::SetPuk { value } => value.zeroize(),
        _ => {}
    }
}
