use anyhow::Result;
use clap::Parser;
use pomodoro::cli::{Cli, Commands, ConfigAction};
use pomodoro::instance::{self, InstanceLock, RuntimePaths};
use pomodoro::persistence::Store;
use pomodoro::{daemon, logging};
use pomodoro_ipc::{IpcRequest, FORWARD_ATTEMPTS, FORWARD_DELAY};
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let store = Store::open(cli.data_dir.as_deref())?;

    // Handled here, with or without a resident.
    match &cli.command {
        Some(Commands::Where) => {
            logging::init_cli();
            let runtime = RuntimePaths::resolve()?;
            print_paths(&store, &runtime);
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Config { action }) => {
            logging::init_cli();
            return run_config(&store, action.as_ref());
        }
        _ => {}
    }

    let runtime = RuntimePaths::resolve()?;
    let lock = InstanceLock::try_acquire(&runtime.lock_path())?;

    if cli.background {
        // Spawned copies never forward anything.
        let Some(lock) = lock else {
            return Ok(ExitCode::SUCCESS);
        };
        logging::init_resident(&store.daemon_log_path())?;
        daemon::run(store, &runtime, lock, true).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let request = match (&cli.command, lock) {
        (None, Some(lock)) => {
            logging::init_resident(&store.daemon_log_path())?;
            daemon::run(store, &runtime, lock, false).await?;
            return Ok(ExitCode::SUCCESS);
        }
        (None, None) => {
            logging::init_cli();
            IpcRequest::new("open")
        }
        (Some(command), held) => {
            logging::init_cli();
            let Some(request) = command.to_request() else {
                return Ok(ExitCode::FAILURE);
            };
            if let Some(lock) = held {
                // The child must be able to take the lock itself.
                drop(lock);
                instance::spawn_headless(cli.data_dir.as_deref())?;
            }
            request
        }
    };

    info!(command = %request.command, "forwarding");
    let delivered = instance::deliver(
        &runtime.socket_path(),
        &request,
        FORWARD_ATTEMPTS,
        FORWARD_DELAY,
    )
    .await;
    Ok(if delivered {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_paths(store: &Store, runtime: &RuntimePaths) {
    println!("DataDir: {}", store.data_dir().display());
    println!("Config:  {}", store.config_path().display());
    println!("State:   {}", store.state_path().display());
    println!("Intent:  {}", store.intent_path().display());
    println!("Log:     {}", store.log_path().display());
    println!("Socket:  {}", runtime.socket_path().display());
}

fn run_config(store: &Store, action: Option<&ConfigAction>) -> Result<ExitCode> {
    let config = store.load_or_create_config()?;
    match action {
        None => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Some(ConfigAction::Set { key, value }) => match config.with_setting(key, value) {
            Ok(updated) => {
                store.save_config(&updated)?;
                println!("Updated config.");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("{}", e);
                Ok(ExitCode::FAILURE)
            }
        },
    }
}
