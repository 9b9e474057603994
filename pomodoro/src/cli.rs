//! Command-line surface of `pom`.

use clap::{Args, Parser, Subcommand};
use pomodoro_ipc::IpcRequest;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pom")]
#[command(version, about = "Pomodoro timer with a resident background process", long_about = None)]
pub struct Cli {
    /// Directory for config, state, intents and logs
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Run as a resident without an interface
    #[arg(long, hide = true)]
    pub background: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start a session (starts the resident if needed)
    Start(StartArgs),
    /// Pause the running phase
    Pause,
    /// Resume a paused phase
    Resume,
    /// Stop and clear the session
    Stop,
    /// Show the current phase and time left
    Status,
    /// End the current phase now and move to the next
    Skip,
    /// Bring up the interface
    Open,
    /// Stop the resident
    Exit,
    /// Show or change what you are working on
    Intent {
        #[command(subcommand)]
        action: Option<IntentAction>,
    },
    /// Show the config, or change one value
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Show data and runtime paths
    Where,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct StartArgs {
    /// Work minutes
    #[arg(long, value_name = "MIN")]
    pub work: Option<u32>,
    /// Break minutes
    #[arg(long = "break", value_name = "MIN")]
    pub break_minutes: Option<u32>,
    /// Long-break minutes
    #[arg(long, value_name = "MIN")]
    pub long: Option<u32>,
    /// Work phases before the long break
    #[arg(long, value_name = "N")]
    pub cycles: Option<u32>,
    #[arg(long, conflicts_with = "no_auto")]
    pub auto: bool,
    #[arg(long)]
    pub no_auto: bool,
    #[arg(long, conflicts_with = "no_popup")]
    pub popup: bool,
    #[arg(long)]
    pub no_popup: bool,
    #[arg(long, conflicts_with = "no_sound")]
    pub sound: bool,
    #[arg(long)]
    pub no_sound: bool,
    /// Replace a running session
    #[arg(long)]
    pub force: bool,
    /// What you are about to work on
    #[arg(value_name = "INTENT")]
    pub intent: Vec<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum IntentAction {
    /// Set the current intent
    Set {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Clear the current intent
    Clear,
    /// Pin an intent (the current one when omitted)
    Pin { text: Vec<String> },
    /// Remove a pinned intent
    Unpin {
        #[arg(required = true)]
        text: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Set work, break, long, cycles, auto, popup or sound
    Set { key: String, value: String },
}

impl Commands {
    /// The request forwarded to the resident, or `None` for commands handled
    /// locally.
    pub fn to_request(&self) -> Option<IpcRequest> {
        let request = match self {
            Commands::Start(args) => args.to_request(),
            Commands::Pause => IpcRequest::new("pause"),
            Commands::Resume => IpcRequest::new("resume"),
            Commands::Stop => IpcRequest::new("stop"),
            Commands::Status => IpcRequest::new("status"),
            Commands::Skip => IpcRequest::new("skip"),
            Commands::Open => IpcRequest::new("open"),
            Commands::Exit => IpcRequest::new("exit"),
            Commands::Intent { action } => {
                let positionals = match action {
                    None => Vec::new(),
                    Some(IntentAction::Set { text }) => with_action("set", text),
                    Some(IntentAction::Clear) => vec!["clear".to_string()],
                    Some(IntentAction::Pin { text }) => with_action("pin", text),
                    Some(IntentAction::Unpin { text }) => with_action("unpin", text),
                };
                IpcRequest::new("intent").with_positionals(positionals)
            }
            Commands::Config { .. } | Commands::Where => return None,
        };
        Some(request)
    }
}

impl StartArgs {
    pub fn to_request(&self) -> IpcRequest {
        let mut options = BTreeMap::new();
        let values = [
            ("--work", self.work),
            ("--break", self.break_minutes),
            ("--long", self.long),
            ("--cycles", self.cycles),
        ];
        for (name, value) in values {
            if let Some(value) = value {
                options.insert(name.to_string(), Some(value.to_string()));
            }
        }
        let flags = [
            ("--auto", self.auto),
            ("--no-auto", self.no_auto),
            ("--popup", self.popup),
            ("--no-popup", self.no_popup),
            ("--sound", self.sound),
            ("--no-sound", self.no_sound),
            ("--force", self.force),
        ];
        for (name, set) in flags {
            if set {
                options.insert(name.to_string(), None);
            }
        }

        let mut request = IpcRequest::new("start").with_options(options);
        if !self.intent.is_empty() {
            request = request.with_positionals(self.intent.clone());
        }
        request
    }
}

fn with_action(action: &str, text: &[String]) -> Vec<String> {
    std::iter::once(action.to_string())
        .chain(text.iter().cloned())
        .collect()
}
