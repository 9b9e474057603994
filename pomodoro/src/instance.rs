//! Single-instance coordination: who is the resident, where it listens, and
//! how secondary invocations reach it.

use anyhow::{Context, Result};
use directories::BaseDirs;
use fs2::FileExt;
use pomodoro_ipc::{forward, socket_path_in, IpcError, IpcRequest, CHANNEL_NAME};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

pub const RUNTIME_DIR_ENV: &str = "POM_RUNTIME_DIR";

/// Hidden flag that makes a process run as a headless resident.
pub const BACKGROUND_FLAG: &str = "--background";

/// Where the socket and lock file live.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    dir: PathBuf,
}

impl RuntimePaths {
    /// `$POM_RUNTIME_DIR`, else the user's runtime directory, else a per-user
    /// directory under the system temp dir.
    pub fn resolve() -> Result<Self> {
        let dir = match std::env::var_os(RUNTIME_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => BaseDirs::new()
                .and_then(|dirs| dirs.runtime_dir().map(Path::to_path_buf))
                .unwrap_or_else(|| {
                    let user = std::env::var("USER").unwrap_or_else(|_| "user".to_string());
                    std::env::temp_dir().join(format!("pomodoro-{}", user))
                }),
        };
        Self::at(dir)
    }

    pub fn at(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create runtime directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn socket_path(&self) -> PathBuf {
        socket_path_in(&self.dir)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{CHANNEL_NAME}.lock"))
    }
}

/// Exclusive advisory lock marking the resident. Released on drop.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
}

impl InstanceLock {
    /// `Ok(None)` when another process already holds the lock.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        // Opened without truncating so the holder's pid survives.
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                file.set_len(0)?;
                writeln!(file, "{}", std::process::id())?;
                debug!("acquired instance lock {}", path.display());
                Ok(Some(Self { file }))
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to lock {}", path.display())),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Start a detached copy of this executable as a headless resident.
pub fn spawn_headless(data_dir: Option<&Path>) -> Result<()> {
    let exe = std::env::current_exe().context("Failed to find the pom executable")?;
    let mut command = Command::new(&exe);
    command.arg(BACKGROUND_FLAG);
    if let Some(dir) = data_dir {
        command.arg("--data-dir").arg(dir);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to spawn background resident")?;
    info!("Spawned background resident");
    Ok(())
}

/// Deliver `request` to the resident and print its answer. Returns whether
/// the resident reported success.
pub async fn deliver(socket_path: &Path, request: &IpcRequest, attempts: u32, delay: Duration) -> bool {
    match forward(socket_path, request, attempts, delay).await {
        Ok(response) if response.ok => {
            println!("{}", response.message);
            true
        }
        Ok(response) => {
            eprintln!("{}", response.message);
            false
        }
        Err(IpcError::NotRunning) => {
            eprintln!("Pomodoro is not running.");
            false
        }
        Err(e) => {
            eprintln!("{}", e);
            false
        }
    }
}
