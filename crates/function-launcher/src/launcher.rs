// ABOUTME: The dispatch loop.
// ABOUTME: Polls the broker stream, launches called functions, rotates tokens, reconnects and drains on shutdown.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use launcher_proto::function_update::FunctionData;
use launcher_proto::{FunctionCall, FunctionRegistrationState, FunctionUpdate, FunctionUpdateType};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::LoopSettings;
use crate::error::{CallError, LauncherError, StartFailure};
use crate::executor::Executor;
use crate::function::Function;
use crate::message::OutgoingMessage;
use crate::session::{BrokerSession, SessionFactory};

/// Where the dispatch loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherState {
    Running,
    Recovering { attempt: u32 },
    ShuttingDown,
    Stopped,
}

impl fmt::Display for LauncherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LauncherState::Running => write!(f, "RUNNING"),
            LauncherState::Recovering { attempt } => write!(f, "RECOVERING({})", attempt),
            LauncherState::ShuttingDown => write!(f, "SHUTTING_DOWN"),
            LauncherState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Control surface for the host process.
#[derive(Debug, Clone)]
pub struct LauncherHandle {
    requested: Arc<AtomicBool>,
    shutdown: CancellationToken,
    state: watch::Receiver<LauncherState>,
}

impl LauncherHandle {
    /// Ask the loop to drain and stop. Safe to call any number of times.
    pub fn request_shutdown(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already requested");
        } else {
            tracing::info!("Shutdown requested");
        }
        self.shutdown.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// False once draining has finished.
    pub fn is_running(&self) -> bool {
        self.state() != LauncherState::Stopped
    }

    pub fn state(&self) -> LauncherState {
        *self.state.borrow()
    }

    /// Wait until the loop reaches STOPPED.
    pub async fn wait_stopped(&self) {
        let mut state = self.state.clone();
        // A dropped launcher cannot make progress; treat it as stopped.
        let _ = state.wait_for(|s| *s == LauncherState::Stopped).await;
    }
}

enum Tick {
    Idle,
    Handled,
}

/// Offers the catalog to the broker and starts functions when called.
///
/// The loop owns the function map and the session; nothing else mutates
/// either, and every outbound message is sent from the loop itself.
pub struct Launcher<F, E> {
    factory: F,
    executor: E,
    functions: BTreeMap<Uuid, Function>,
    session: BrokerSession,
    settings: LoopSettings,
    handle: LauncherHandle,
    state: watch::Sender<LauncherState>,
    /// Consecutive recovery attempts since the last handled update.
    failures: u32,
}

impl<F, E> Launcher<F, E>
where
    F: SessionFactory,
    E: Executor,
{
    /// Open a session, register every function ONLINE and enter RUNNING.
    pub async fn start(
        factory: F,
        executor: E,
        functions: impl IntoIterator<Item = Function>,
        settings: LoopSettings,
    ) -> Result<Self, LauncherError> {
        let mut functions = index(functions);
        let session = open_registered(&factory, &mut functions).await?;
        Ok(Self::assemble(factory, executor, functions, session, settings))
    }

    fn assemble(
        factory: F,
        executor: E,
        functions: BTreeMap<Uuid, Function>,
        session: BrokerSession,
        settings: LoopSettings,
    ) -> Self {
        let (state, state_rx) = watch::channel(LauncherState::Running);
        let handle = LauncherHandle {
            requested: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            state: state_rx,
        };
        tracing::info!(functions = functions.len(), "Launcher running");
        Self {
            factory,
            executor,
            functions,
            session,
            settings,
            handle,
            state,
            failures: 0,
        }
    }

    pub fn handle(&self) -> LauncherHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> LauncherState {
        *self.state.borrow()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    /// Drive the loop until shutdown.
    ///
    /// Returns `Ok` after a requested shutdown, or the latest error when
    /// reconnecting failed too often. Either way every function has been
    /// sent OFFLINE (best effort) and the state is STOPPED.
    pub async fn run(mut self) -> Result<(), LauncherError> {
        let outcome = self.dispatch().await;
        self.drain().await;
        outcome
    }

    async fn dispatch(&mut self) -> Result<(), LauncherError> {
        loop {
            if self.handle.is_shutdown_requested() {
                return Ok(());
            }

            match self.tick().await {
                Ok(Tick::Handled) => self.failures = 0,
                Ok(Tick::Idle) => {
                    self.sleep_unless_shutdown(self.settings.poll_interval).await;
                }
                Err(err) if err.is_recoverable() => self.recover(err).await?,
                Err(err) => {
                    tracing::error!(error = %err, "Dispatch loop failed");
                    return Err(err);
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<Tick, LauncherError> {
        let Some(update) = self.session.receive()? else {
            return Ok(Tick::Idle);
        };
        self.handle_update(update).await?;
        Ok(Tick::Handled)
    }

    async fn handle_update(&mut self, update: FunctionUpdate) -> Result<(), LauncherError> {
        let kind = update.r#type();
        match update.function_data {
            Some(FunctionData::FunctionBrokerToken(token)) => {
                tracing::debug!("Received token refresh");
                self.session.update_token(&token.value);
                self.session.send(OutgoingMessage::token_ack(token)).await
            }
            Some(FunctionData::FunctionBrokerReconnect(notice)) => {
                tracing::info!(
                    seconds_until_disconnect = notice.seconds_until_disconnect,
                    "Broker announced disconnect"
                );
                Err(LauncherError::ReconnectRequested(notice.seconds_until_disconnect))
            }
            Some(FunctionData::FunctionCall(call)) if kind == FunctionUpdateType::Request => {
                tracing::debug!(function_id = %call.id, "Received function call");
                self.handle_call(call).await
            }
            other => {
                tracing::debug!(kind = ?kind, data = ?other.map(|d| data_kind(&d)), "Ignoring broker update");
                Ok(())
            }
        }
    }

    async fn handle_call(&mut self, call: FunctionCall) -> Result<(), LauncherError> {
        let message = match self.launch(&call).await {
            Ok(()) => {
                tracing::info!(function_id = %call.id, "Function started");
                OutgoingMessage::call_started(call)
            }
            Err(err) => {
                tracing::error!(function_id = %call.id, error = %err, "Function call failed");
                OutgoingMessage::call_failed(call, &err)
            }
        };
        self.session.send(message).await
    }

    async fn launch(&self, call: &FunctionCall) -> Result<(), CallError> {
        let function = Uuid::parse_str(&call.id)
            .ok()
            .and_then(|id| self.functions.get(&id))
            .ok_or_else(|| CallError::UnknownFunction(call.id.clone()))?;

        let limit = self.settings.dispatch_timeout;
        let started = tokio::time::timeout(limit, self.executor.start(function, &call.session_info))
            .await
            .unwrap_or(Err(StartFailure::TimedOut(limit)));

        started.map_err(|source| CallError::NotStarted {
            function_id: call.id.clone(),
            source,
        })
    }

    /// Rebuild the session with linear backoff.
    ///
    /// Attempts count across reconnects until an update is handled, so a
    /// broker that accepts the session and then drops it again still uses
    /// up the budget. Every attempt after the first waits
    /// `attempt × reconnect_backoff` before opening.
    ///
    /// `Ok` means RUNNING again, or that shutdown was requested while
    /// waiting. `Err` is the latest failure once attempts are exhausted.
    async fn recover(&mut self, cause: LauncherError) -> Result<(), LauncherError> {
        let max = self.settings.max_reconnect_attempts;
        let mut latest = cause;

        loop {
            self.failures += 1;
            let attempt = self.failures;
            if attempt > max {
                tracing::error!(attempts = max, error = %latest, "Could not reconnect to broker, giving up");
                self.set_state(LauncherState::ShuttingDown);
                return Err(latest);
            }
            if self.handle.is_shutdown_requested() {
                return Ok(());
            }

            self.set_state(LauncherState::Recovering { attempt });
            tracing::warn!(
                attempt,
                remaining = max - attempt,
                error = %latest,
                "Lost broker stream, reconnecting"
            );

            self.session.stop();
            if attempt > 1
                && self
                    .sleep_unless_shutdown(self.settings.reconnect_backoff * attempt)
                    .await
            {
                return Ok(());
            }

            match open_registered(&self.factory, &mut self.functions).await {
                Ok(session) => {
                    self.session = session;
                    self.set_state(LauncherState::Running);
                    tracing::info!(attempt, "Reconnected to broker");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "Reconnect attempt failed");
                    latest = err;
                }
            }
        }
    }

    /// Send every function OFFLINE, close the stream, reach STOPPED.
    async fn drain(&mut self) {
        self.set_state(LauncherState::ShuttingDown);

        for function in self.functions.values_mut() {
            function.set_state(FunctionRegistrationState::Offline);
            let message = OutgoingMessage::registration(function, FunctionRegistrationState::Offline);
            if let Err(err) = self.session.send(message).await {
                tracing::warn!(function_id = %function.id(), error = %err, "Could not deregister function");
            }
        }

        self.session.stop();
        self.set_state(LauncherState::Stopped);
        tracing::info!("Launcher stopped");
    }

    /// Sleep, returning early on shutdown. True if shutdown cut it short.
    async fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.handle.shutdown.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    fn set_state(&self, state: LauncherState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Launcher state changed");
        }
    }
}

/// Start a launcher, retrying with incremental backoff.
///
/// Tries up to `max_attempts` times, sleeping `n × reconnect_backoff`
/// after the n-th failure, and returns the last error if none succeed.
pub async fn connect_with_retry<F, E>(
    factory: F,
    executor: E,
    functions: impl IntoIterator<Item = Function>,
    settings: LoopSettings,
    max_attempts: u32,
) -> Result<Launcher<F, E>, LauncherError>
where
    F: SessionFactory,
    E: Executor,
{
    let mut functions = index(functions);
    let mut failures: u32 = 0;

    loop {
        match open_registered(&factory, &mut functions).await {
            Ok(session) => {
                return Ok(Launcher::assemble(factory, executor, functions, session, settings));
            }
            Err(err) => {
                failures += 1;
                if failures >= max_attempts {
                    tracing::error!(attempts = failures, error = %err, "Could not connect to broker");
                    return Err(err);
                }
                let delay = settings.reconnect_backoff * failures;
                tracing::warn!(
                    attempt = failures,
                    remaining = max_attempts - failures,
                    retry_in = ?delay,
                    error = %err,
                    "Could not connect to broker, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn index(functions: impl IntoIterator<Item = Function>) -> BTreeMap<Uuid, Function> {
    functions.into_iter().map(|f| (f.id(), f)).collect()
}

/// Open a session and register every function ONLINE on it.
async fn open_registered<F: SessionFactory>(
    factory: &F,
    functions: &mut BTreeMap<Uuid, Function>,
) -> Result<BrokerSession, LauncherError> {
    let mut session = factory.open().await?;
    for function in functions.values_mut() {
        function.set_state(FunctionRegistrationState::Online);
        session
            .send(OutgoingMessage::registration(function, FunctionRegistrationState::Online))
            .await?;
    }
    tracing::debug!(count = functions.len(), "Registered functions");
    Ok(session)
}

fn data_kind(data: &FunctionData) -> &'static str {
    match data {
        FunctionData::FunctionCall(_) => "function_call",
        FunctionData::FunctionRegistration(_) => "function_registration",
        FunctionData::FunctionBrokerToken(_) => "function_broker_token",
        FunctionData::FunctionBrokerReconnect(_) => "function_broker_reconnect",
    }
}
