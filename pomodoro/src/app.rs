//! The resident service: the single owner of the live session and intents.
//!
//! Every mutation (IPC commands, interface key presses, the periodic tick)
//! goes through one `Resident` value owned by the control loop, so the
//! store never sees two writers.

use crate::config::StartOverrides;
use crate::intent::{sanitize, TaskIntentState};
use crate::notify::Notifier;
use crate::persistence::Store;
use crate::session::{EventKind, LogEvent, PomodoroState};
use chrono::{DateTime, Utc};
use pomodoro_ipc::{IpcRequest, IpcResponse};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const POPUP_TITLE: &str = "Pomodoro";

/// Called with the new intents after every successful intent change.
pub type IntentSubscriber = Box<dyn FnMut(&TaskIntentState) + Send>;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Missing command.")]
    MissingCommand,

    #[error("Unknown IPC command: {0}")]
    UnknownCommand(String),

    #[error("No active session.")]
    NoActiveSession,

    #[error("Already paused.")]
    AlreadyPaused,

    #[error("Not paused.")]
    NotPaused,

    #[error("Session already running. Use --force to replace.")]
    SessionExists,

    #[error("No intent given.")]
    MissingIntent,

    #[error("Not pinned: {0}")]
    NotPinned(String),

    #[error("Unknown intent action: {0} (expected set, clear, pin or unpin)")]
    UnknownIntentAction(String),

    #[error("{0:#}")]
    Persistence(anyhow::Error),
}

impl From<anyhow::Error> for CommandError {
    fn from(err: anyhow::Error) -> Self {
        CommandError::Persistence(err)
    }
}

/// What an interface needs to draw one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub state: Option<PomodoroState>,
    pub status: String,
    pub last_message: Option<String>,
}

pub struct Resident<N: Notifier> {
    store: Store,
    notifier: N,
    intents: TaskIntentState,
    subscribers: Vec<IntentSubscriber>,
    has_interface: bool,
    exit_requested: bool,
    status: String,
    last_message: Option<String>,
}

impl<N: Notifier> Resident<N> {
    pub fn new(store: Store, notifier: N) -> Self {
        let intents = store.load_intent();
        Self {
            store,
            notifier,
            intents,
            subscribers: Vec::new(),
            has_interface: false,
            exit_requested: false,
            status: "Idle".to_string(),
            last_message: None,
        }
    }

    pub fn with_interface(mut self, has_interface: bool) -> Self {
        self.has_interface = has_interface;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn intents(&self) -> &TaskIntentState {
        &self.intents
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Register for intent changes. The subscriber is called once right away
    /// with the current intents.
    pub fn subscribe_intent(&mut self, mut subscriber: IntentSubscriber) {
        subscriber(&self.intents);
        self.subscribers.push(subscriber);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.store.try_load_state(),
            status: self.status.clone(),
            last_message: self.last_message.clone(),
        }
    }

    /// Run one request to completion. Failures become `Ok=false` responses.
    pub fn execute(&mut self, request: &IpcRequest, now: DateTime<Utc>) -> IpcResponse {
        let command = request.command.trim().to_ascii_lowercase();
        debug!(command = %command, "executing request");

        let result = match command.as_str() {
            "" => Err(CommandError::MissingCommand),
            "ping" => Ok(IpcResponse::ok("pong")),
            "open" => Ok(self.open()),
            "start" => self.start(request, now),
            "pause" => self.pause(now),
            "resume" => self.resume(now),
            "stop" => self.stop(now),
            "skip" => self.skip(now),
            "status" => Ok(self.status(now)),
            "intent" => self.intent(request.positionals()),
            "exit" => {
                info!("Exit requested");
                self.exit_requested = true;
                Ok(IpcResponse::ok("Exiting."))
            }
            _ => Err(CommandError::UnknownCommand(request.command.clone())),
        };

        let response = match result {
            Ok(response) => response,
            Err(CommandError::Persistence(e)) => {
                error!("Command '{}' failed: {:#}", command, e);
                IpcResponse::failure(format!("{:#}", e))
            }
            Err(e) => IpcResponse::failure(e.to_string()),
        };

        if !matches!(command.as_str(), "ping" | "status") {
            self.last_message = Some(response.message.clone());
        }
        self.refresh_status(now);
        response
    }

    /// Periodic check of the persisted session against the clock.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let Some(state) = self.store.try_load_state() else {
            self.status = "Idle".to_string();
            return;
        };

        if state.is_paused || state.remaining_seconds(now) > 0 {
            self.status = state.status_line(now);
            return;
        }

        debug!(phase = %state.phase, cycle = state.cycle_index, "phase deadline reached");
        match self.handle_phase_end(state, now, false) {
            Ok(message) => self.last_message = Some(message),
            Err(e) => error!("Failed to handle phase end: {}", e),
        }
        self.refresh_status(now);
    }

    /// Log, notify, then either freeze at zero or advance.
    ///
    /// `force_advance` ignores the session's auto-advance flag.
    fn handle_phase_end(
        &mut self,
        state: PomodoroState,
        now: DateTime<Utc>,
        force_advance: bool,
    ) -> Result<String, CommandError> {
        self.log(EventKind::PhaseEnded, now, &state);

        let ended = format!("{} complete.", state.phase);
        if state.sound {
            self.notifier.play_sound();
        }
        if state.popup {
            self.notifier.show_popup(POPUP_TITLE, &ended);
        }

        if !state.auto_advance && !force_advance {
            let paused = state.pause(now);
            self.store.save_state(&paused)?;
            return Ok(ended);
        }

        self.advance(state, now)
    }

    fn advance(&mut self, state: PomodoroState, now: DateTime<Utc>) -> Result<String, CommandError> {
        let result = state.advance_to(now);
        match result.state {
            None => {
                self.log(EventKind::SessionCompleted, now, &state);
                self.store.delete_state()?;
                info!(session = %state.session_id, "Session complete");
                let message = "Session complete.".to_string();
                if state.popup {
                    self.notifier.show_popup(POPUP_TITLE, &message);
                }
                Ok(message)
            }
            Some(next) => {
                self.store.save_state(&next)?;
                self.log(EventKind::PhaseStarted, now, &next);
                let message = format!("Now: {} ({}/{})", next.phase, next.cycle_index, next.cycles);
                if next.popup {
                    self.notifier.show_popup(POPUP_TITLE, &message);
                }
                Ok(message)
            }
        }
    }

    fn open(&mut self) -> IpcResponse {
        if self.has_interface {
            IpcResponse::ok("Opened.")
        } else {
            IpcResponse::ok("Opened. No interface attached.")
        }
    }

    fn start(&mut self, request: &IpcRequest, now: DateTime<Utc>) -> Result<IpcResponse, CommandError> {
        if self.store.try_load_state().is_some() && !request.has_flag("--force") {
            return Err(CommandError::SessionExists);
        }

        let config = self.store.load_or_create_config()?;
        let options = config.session_options(&StartOverrides::from_request(request));
        let state = PomodoroState::new(&options, now);
        self.store.save_state(&state)?;
        self.log(EventKind::SessionStarted, now, &state);
        info!(session = %state.session_id, cycles = state.cycles, "Session started");

        if !request.positionals().is_empty() {
            let text = request.positionals().join(" ");
            self.set_intent(Some(&text))?;
        }

        let message = format!(
            "Started: {} ({} min)",
            state.phase,
            state.phase_duration_seconds / 60
        );
        if state.popup {
            self.notifier.show_popup(POPUP_TITLE, &message);
        }
        Ok(IpcResponse::ok(message))
    }

    fn pause(&mut self, now: DateTime<Utc>) -> Result<IpcResponse, CommandError> {
        let state = self.active_state()?;
        if state.is_paused {
            return Err(CommandError::AlreadyPaused);
        }
        let paused = state.pause(now);
        self.store.save_state(&paused)?;
        self.log(EventKind::Paused, now, &paused);
        Ok(IpcResponse::ok("Paused."))
    }

    /// A session frozen at zero by a phase end without auto-advance moves on
    /// to the next phase instead of restarting an empty one.
    fn resume(&mut self, now: DateTime<Utc>) -> Result<IpcResponse, CommandError> {
        let state = self.active_state()?;
        if !state.is_paused {
            return Err(CommandError::NotPaused);
        }
        let resumed = state.resume(now);
        self.log(EventKind::Resumed, now, &resumed);

        if resumed.remaining_seconds(now) <= 0 {
            let message = self.advance(resumed, now)?;
            return Ok(IpcResponse::ok(format!("Resumed. {}", message)));
        }

        self.store.save_state(&resumed)?;
        Ok(IpcResponse::ok("Resumed."))
    }

    fn stop(&mut self, now: DateTime<Utc>) -> Result<IpcResponse, CommandError> {
        let state = self.active_state()?;
        self.store.delete_state()?;
        self.log(EventKind::Stopped, now, &state);
        info!(session = %state.session_id, "Session stopped");
        Ok(IpcResponse::ok("Stopped."))
    }

    /// End the current phase now and advance, even when paused or when
    /// auto-advance is off.
    fn skip(&mut self, now: DateTime<Utc>) -> Result<IpcResponse, CommandError> {
        let state = self.active_state()?;
        self.log(EventKind::Skipped, now, &state);
        let forced = state.forced_to_end(now);
        let message = self.handle_phase_end(forced, now, true)?;
        Ok(IpcResponse::ok(message))
    }

    fn status(&self, now: DateTime<Utc>) -> IpcResponse {
        let Some(state) = self.store.try_load_state() else {
            return IpcResponse::ok("No active session.");
        };
        let response = IpcResponse::ok(state.status_line(now));
        match serde_json::to_string_pretty(&state) {
            Ok(json) => response.with_payload(json),
            Err(e) => {
                warn!("Failed to serialize state for status: {}", e);
                response
            }
        }
    }

    fn intent(&mut self, args: &[String]) -> Result<IpcResponse, CommandError> {
        let Some((action, rest)) = args.split_first() else {
            let message = match self.intents.current() {
                Some(current) => format!("Intent: {}", current),
                None => "No intent.".to_string(),
            };
            let response = IpcResponse::ok(message);
            return Ok(match serde_json::to_string_pretty(&self.intents) {
                Ok(json) => response.with_payload(json),
                Err(_) => response,
            });
        };
        let text = rest.join(" ");

        match action.to_ascii_lowercase().as_str() {
            "set" => {
                let value = sanitize(&text).ok_or(CommandError::MissingIntent)?;
                self.set_intent(Some(&value))?;
                Ok(IpcResponse::ok(format!("Intent: {}", value)))
            }
            "clear" => {
                self.set_intent(None)?;
                Ok(IpcResponse::ok("Intent cleared."))
            }
            "pin" => {
                let target = sanitize(&text)
                    .or_else(|| self.intents.current().map(str::to_string))
                    .ok_or(CommandError::MissingIntent)?;
                if self.intents.pin(&target) {
                    self.commit_intents()?;
                    Ok(IpcResponse::ok(format!("Pinned: {}", target)))
                } else {
                    Ok(IpcResponse::ok(format!("Already pinned: {}", target)))
                }
            }
            "unpin" => {
                let target = sanitize(&text).ok_or(CommandError::MissingIntent)?;
                if !self.intents.unpin(&target) {
                    return Err(CommandError::NotPinned(target));
                }
                self.commit_intents()?;
                Ok(IpcResponse::ok(format!("Unpinned: {}", target)))
            }
            other => Err(CommandError::UnknownIntentAction(other.to_string())),
        }
    }

    fn set_intent(&mut self, raw: Option<&str>) -> Result<(), CommandError> {
        let add_to_recents = raw.is_some();
        if self.intents.set_current_intent(raw, add_to_recents) {
            debug!(intent = ?self.intents.current(), "intent changed");
        }
        self.commit_intents()
    }

    fn commit_intents(&mut self) -> Result<(), CommandError> {
        self.store.save_intent(&self.intents)?;
        for subscriber in self.subscribers.iter_mut() {
            subscriber(&self.intents);
        }
        Ok(())
    }

    fn active_state(&self) -> Result<PomodoroState, CommandError> {
        self.store
            .try_load_state()
            .ok_or(CommandError::NoActiveSession)
    }

    fn refresh_status(&mut self, now: DateTime<Utc>) {
        self.status = match self.store.try_load_state() {
            Some(state) => state.status_line(now),
            None => "Idle".to_string(),
        };
    }

    /// The audit log is best effort.
    fn log(&self, kind: EventKind, at: DateTime<Utc>, state: &PomodoroState) {
        if let Err(e) = self.store.append_log(&LogEvent::new(kind, at, state)) {
            warn!("Failed to append {:?} to log: {:#}", kind, e);
        }
    }
}
