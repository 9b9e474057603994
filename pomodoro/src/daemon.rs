//! The resident process: one control task owning the [`Resident`], the IPC
//! accept loop, and optionally the terminal interface.

use crate::app::{Resident, Snapshot};
use crate::instance::{InstanceLock, RuntimePaths};
use crate::intent::TaskIntentState;
use crate::ipc;
use crate::notify::{DesktopNotifier, Notifier};
use crate::persistence::Store;
use crate::ui;
use anyhow::{Context, Result};
use chrono::Utc;
use pomodoro_ipc::{IpcRequest, IpcResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

const CONTROL_CAPACITY: usize = 32;

/// A request posted to the control loop, with where to send the answer.
pub struct ControlRequest {
    pub request: IpcRequest,
    pub reply: oneshot::Sender<IpcResponse>,
}

/// Post `request` to the control loop and wait up to `limit` for the answer.
pub async fn call(
    control: &mpsc::Sender<ControlRequest>,
    request: IpcRequest,
    limit: Duration,
) -> IpcResponse {
    let (reply, answer) = oneshot::channel();
    let exchange = async {
        control
            .send(ControlRequest { request, reply })
            .await
            .map_err(|_| ())?;
        answer.await.map_err(|_| ())
    };
    match timeout(limit, exchange).await {
        Ok(Ok(response)) => response,
        Ok(Err(())) => IpcResponse::failure("Shutting down."),
        Err(_) => IpcResponse::failure("Command timed out."),
    }
}

/// Handles to a running control loop and accept loop.
pub struct ResidentHandle {
    control: mpsc::Sender<ControlRequest>,
    snapshots: watch::Receiver<Snapshot>,
    shutdown: Arc<watch::Sender<bool>>,
    control_task: JoinHandle<()>,
    server_task: JoinHandle<()>,
}

impl ResidentHandle {
    pub fn control(&self) -> mpsc::Sender<ControlRequest> {
        self.control.clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn shutdown_signal(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.shutdown)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for both loops to finish.
    pub async fn wait(self) -> Result<()> {
        self.control_task.await.context("Control loop panicked")?;
        self.server_task.await.context("IPC server panicked")?;
        Ok(())
    }
}

/// Start the control loop and the accept loop on the current runtime.
pub fn spawn<N: Notifier + 'static>(resident: Resident<N>, listener: UnixListener) -> ResidentHandle {
    let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
    let (snapshot_tx, snapshot_rx) = watch::channel(resident.snapshot());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown = Arc::new(shutdown_tx);

    let control_task = tokio::spawn(control_loop(
        resident,
        control_rx,
        snapshot_tx,
        Arc::clone(&shutdown),
    ));
    let server_task = tokio::spawn(ipc::serve(listener, control_tx.clone(), shutdown_rx));

    ResidentHandle {
        control: control_tx,
        snapshots: snapshot_rx,
        shutdown,
        control_task,
        server_task,
    }
}

/// The single funnel for every state change: ticks and posted requests are
/// handled one after another, never concurrently.
async fn control_loop<N: Notifier>(
    mut resident: Resident<N>,
    mut requests: mpsc::Receiver<ControlRequest>,
    snapshots: watch::Sender<Snapshot>,
    shutdown: Arc<watch::Sender<bool>>,
) {
    let mut ticker = interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = ticker.tick() => resident.tick(Utc::now()),
            received = requests.recv() => {
                let Some(ControlRequest { request, reply }) = received else {
                    break;
                };
                let response = resident.execute(&request, Utc::now());
                let _ = reply.send(response);
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    break;
                }
            }
        }

        snapshots.send_replace(resident.snapshot());

        if resident.exit_requested() {
            break;
        }
    }

    let _ = shutdown.send(true);
    info!("Control loop stopped");
}

/// Run the resident until it is asked to exit. `lock` is held for the whole
/// lifetime and released on return.
pub async fn run(store: Store, runtime: &RuntimePaths, lock: InstanceLock, headless: bool) -> Result<()> {
    let socket_path = runtime.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path).with_context(|| {
            format!("Failed to remove stale socket: {}", socket_path.display())
        })?;
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;
    info!(socket = %socket_path.display(), headless, "Resident started");

    let mut resident = Resident::new(store, DesktopNotifier).with_interface(!headless);
    let (intent_tx, intent_rx) = watch::channel(TaskIntentState::default());
    resident.subscribe_intent(Box::new(move |intents| {
        intent_tx.send_replace(intents.clone());
    }));

    let handle = spawn(resident, listener);
    spawn_signal_watcher(handle.shutdown_signal());

    let interface = if headless {
        None
    } else {
        Some(ui::spawn(
            handle.control(),
            handle.snapshots(),
            intent_rx,
            handle.shutdown_signal(),
        ))
    };

    let result = handle.wait().await;

    if let Some(interface) = interface {
        match tokio::task::spawn_blocking(move || interface.join()).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!("Interface failed: {:#}", e),
            Ok(Err(_)) | Err(_) => error!("Interface thread panicked"),
        }
    }

    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!("Failed to remove socket {}: {}", socket_path.display(), e);
    }
    drop(lock);
    info!("Resident stopped");
    result
}

/// Turn SIGINT and SIGTERM into a shutdown.
fn spawn_signal_watcher(shutdown: Arc<watch::Sender<bool>>) {
    tokio::spawn(async move {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            _ = terminate.recv() => info!("Terminated"),
        }
        let _ = shutdown.send(true);
    });
}
