//! Sound and popup capabilities invoked at phase boundaries.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, warn};

const APP_NAME: &str = "pom";

/// What the resident calls when a phase ends. Implementations must not
/// fail; problems are logged and swallowed.
pub trait Notifier: Send {
    fn play_sound(&self);
    fn show_popup(&self, title: &str, message: &str);
}

/// Desktop popups through the notification daemon, sound through the
/// platform player.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn play_sound(&self) {
        if !spawn_player() {
            ring_bell();
        }
    }

    fn show_popup(&self, title: &str, message: &str) {
        if let Err(e) = notify_rust::Notification::new()
            .summary(title)
            .body(message)
            .appname(APP_NAME)
            .show()
        {
            warn!("Failed to send notification: {}", e);
        }
    }
}

#[cfg(target_os = "macos")]
fn spawn_player() -> bool {
    spawn_detached("afplay", &["/System/Library/Sounds/Glass.aiff"])
}

#[cfg(not(target_os = "macos"))]
fn spawn_player() -> bool {
    let candidates = [
        "/usr/share/sounds/freedesktop/stereo/complete.oga",
        "/usr/share/sounds/freedesktop/stereo/bell.oga",
        "/usr/share/sounds/gnome/default/alerts/glass.ogg",
    ];
    let Some(sound) = candidates.into_iter().find(|p| std::path::Path::new(p).exists()) else {
        return false;
    };
    spawn_detached("paplay", &[sound]) || spawn_detached("aplay", &["-q", sound])
}

fn spawn_detached(program: &str, args: &[&str]) -> bool {
    match spawn_reaped(program, args) {
        Ok(_) => true,
        Err(e) => {
            debug!("{} unavailable: {}", program, e);
            false
        }
    }
}

/// Start `program` and wait for it on a helper thread so the resident never
/// accumulates exited players. Returns the child's pid and the waiter.
fn spawn_reaped(program: &str, args: &[&str]) -> io::Result<(u32, thread::JoinHandle<()>)> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let pid = child.id();
    let name = program.to_string();
    let waiter = thread::Builder::new()
        .name("pom-sound".to_string())
        .spawn(move || match child.wait() {
            Ok(status) => debug!("{} exited with {}", name, status),
            Err(e) => warn!("Failed to wait for {}: {}", name, e),
        })?;
    Ok((pid, waiter))
}

fn ring_bell() {
    let mut stdout = io::stdout();
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}
