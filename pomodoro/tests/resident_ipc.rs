//! A real control loop behind a real socket.

use pomodoro::app::Resident;
use pomodoro::daemon::{self, ResidentHandle};
use pomodoro::instance::{InstanceLock, RuntimePaths};
use pomodoro::intent::TaskIntentState;
use pomodoro::notify::Notifier;
use pomodoro::persistence::Store;
use pomodoro::session::PomodoroState;
use pomodoro_ipc::{decode_line, forward, send, IpcError, IpcRequest, IpcResponse};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{sleep, timeout};

struct Quiet;

impl Notifier for Quiet {
    fn play_sound(&self) {}
    fn show_popup(&self, _title: &str, _message: &str) {}
}

struct Running {
    temp: TempDir,
    socket: PathBuf,
    handle: ResidentHandle,
}

impl Running {
    fn store(&self) -> Store {
        Store::at(self.temp.path().join("data")).unwrap()
    }

    async fn stop(self) {
        self.handle.shutdown();
        timeout(Duration::from_secs(2), self.handle.wait())
            .await
            .unwrap()
            .unwrap();
    }
}

fn start_resident() -> Running {
    let temp = TempDir::new().unwrap();
    let runtime = RuntimePaths::at(temp.path().join("run")).unwrap();
    let store = Store::at(temp.path().join("data")).unwrap();
    let socket = runtime.socket_path();
    let listener = UnixListener::bind(&socket).unwrap();
    let handle = daemon::spawn(Resident::new(store, Quiet), listener);
    Running {
        temp,
        socket,
        handle,
    }
}

fn start_request(options: &[(&str, Option<&str>)]) -> IpcRequest {
    let options: BTreeMap<String, Option<String>> = options
        .iter()
        .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
        .collect();
    IpcRequest::new("start").with_options(options)
}

async fn send_raw(socket: &PathBuf, bytes: &[u8]) -> IpcResponse {
    let stream = UnixStream::connect(socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    writer.write_all(bytes).await.unwrap();
    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await.unwrap();
    decode_line(&line).unwrap()
}

#[tokio::test]
async fn start_with_work_override_persists_sixty_seconds() {
    let running = start_resident();

    let response = send(&running.socket, &start_request(&[("--work", Some("1"))]))
        .await
        .unwrap();
    assert!(response.ok);
    assert_eq!(response.message, "Started: Work (1 min)");

    let state = running.store().try_load_state().unwrap();
    assert_eq!(state.work_seconds, 60);
    assert_eq!(state.break_seconds, 5 * 60);

    let status = send(&running.socket, &IpcRequest::new("status")).await.unwrap();
    assert!(status.ok);
    assert!(status.message.starts_with("Work 1/4 - "));
    let payload: PomodoroState = serde_json::from_str(status.payload.as_deref().unwrap()).unwrap();
    assert_eq!(payload.session_id, state.session_id);

    running.stop().await;
}

#[tokio::test]
async fn second_start_is_refused_until_forced() {
    let running = start_resident();

    assert!(send(&running.socket, &IpcRequest::new("start")).await.unwrap().ok);
    let refused = send(&running.socket, &IpcRequest::new("start")).await.unwrap();
    assert!(!refused.ok);

    let forced = send(&running.socket, &start_request(&[("--force", None)]))
        .await
        .unwrap();
    assert!(forced.ok);

    running.stop().await;
}

#[tokio::test]
async fn protocol_errors_do_not_touch_state() {
    let running = start_resident();

    let garbage = send_raw(&running.socket, b"this is not json\n").await;
    assert!(!garbage.ok);
    assert_eq!(garbage.message, "Invalid JSON request.");

    let missing = send_raw(&running.socket, b"{\"Options\":null}\n").await;
    assert_eq!(missing.message, "Missing command.");

    let unknown = send(&running.socket, &IpcRequest::new("teleport")).await.unwrap();
    assert!(!unknown.ok);
    assert_eq!(unknown.message, "Unknown IPC command: teleport");

    assert!(running.store().try_load_state().is_none());

    // Still serving afterwards.
    let pong = send(&running.socket, &IpcRequest::new("ping")).await.unwrap();
    assert_eq!(pong.message, "pong");

    running.stop().await;
}

#[tokio::test]
async fn intent_changes_reach_disk() {
    let running = start_resident();

    let request = IpcRequest::new("intent")
        .with_positionals(vec!["set".to_string(), "Ship".to_string(), "it".to_string()]);
    let response = send(&running.socket, &request).await.unwrap();
    assert_eq!(response.message, "Intent: Ship it");

    let pin = IpcRequest::new("intent").with_positionals(vec!["pin".to_string()]);
    assert!(send(&running.socket, &pin).await.unwrap().ok);

    let show = send(&running.socket, &IpcRequest::new("intent")).await.unwrap();
    let shown: TaskIntentState = serde_json::from_str(show.payload.as_deref().unwrap()).unwrap();
    assert_eq!(shown, running.store().load_intent());
    assert_eq!(shown.pinned(), &["Ship it".to_string()]);

    running.stop().await;
}

#[tokio::test]
async fn exit_command_stops_the_resident() {
    let running = start_resident();

    let response = send(&running.socket, &IpcRequest::new("exit")).await.unwrap();
    assert_eq!(response.message, "Exiting.");
    timeout(Duration::from_secs(2), running.handle.wait())
        .await
        .unwrap()
        .unwrap();

    let after = send(&running.socket, &IpcRequest::new("ping")).await;
    assert!(matches!(after, Err(IpcError::NotRunning)));
}

#[tokio::test]
async fn forwarding_waits_for_a_starting_resident() {
    let temp = TempDir::new().unwrap();
    let runtime = RuntimePaths::at(temp.path().join("run")).unwrap();
    let socket = runtime.socket_path();
    let data = temp.path().join("data");

    let late_socket = socket.clone();
    let late = tokio::spawn(async move {
        sleep(Duration::from_millis(300)).await;
        let listener = UnixListener::bind(&late_socket).unwrap();
        daemon::spawn(Resident::new(Store::at(data).unwrap(), Quiet), listener)
    });

    let response = forward(
        &socket,
        &IpcRequest::new("ping"),
        20,
        Duration::from_millis(100),
    )
    .await
    .unwrap();
    assert_eq!(response.message, "pong");

    let handle = late.await.unwrap();
    handle.shutdown();
    handle.wait().await.unwrap();
}

#[test]
fn a_second_resident_cannot_take_the_lock() {
    let temp = TempDir::new().unwrap();
    let runtime = RuntimePaths::at(temp.path()).unwrap();

    let resident = InstanceLock::try_acquire(&runtime.lock_path()).unwrap();
    assert!(resident.is_some());
    assert!(InstanceLock::try_acquire(&runtime.lock_path())
        .unwrap()
        .is_none());
}
