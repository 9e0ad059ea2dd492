//! UI Actor - Single-threaded event processing
//!
//! Every line the CLI prints while an update runs goes through one thread,
//! so progress redraws from the updater never interleave with messages.

use super::theme::{Theme, format_size};
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use std::io::Write;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Pipeline stage shown on the progress line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Downloading,
    Processing,
    Committing,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Stage::Downloading => "downloading",
            Stage::Processing => "processing",
            Stage::Committing => "saving",
        }
    }
}

/// Events that can be sent to the UI actor
#[derive(Debug)]
pub enum UiEvent {
    /// A repository update started
    RepoStarted { address: String },
    /// Progress of the active repository
    Progress {
        address: String,
        stage: Stage,
        current: u64,
        total: Option<u64>,
    },
    /// Repository finished successfully
    RepoDone { address: String, detail: String },
    /// Repository update failed
    RepoFailed { address: String, reason: String },
    Info(String),
    Success(String),
    Warning(String),
    Error(String),
    /// Acknowledged once every earlier event has been rendered
    Sync(mpsc::Sender<()>),
    Shutdown,
}

/// Handle to the UI actor thread
pub struct UiActor {
    sender: mpsc::Sender<UiEvent>,
    _handle: thread::JoinHandle<()>,
}

impl std::fmt::Debug for UiActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiActor").finish_non_exhaustive()
    }
}

impl UiActor {
    /// Spawn a new UI actor thread
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || run_event_loop(&receiver));
        Self {
            sender,
            _handle: handle,
        }
    }

    pub fn sender(&self) -> mpsc::Sender<UiEvent> {
        self.sender.clone()
    }
}

impl Drop for UiActor {
    fn drop(&mut self) {
        let _ = self.sender.send(UiEvent::Shutdown);
    }
}

struct ActiveLine {
    address: String,
    stage: Stage,
    current: u64,
    total: Option<u64>,
    dirty: bool,
}

struct Renderer {
    theme: Theme,
    interactive: bool,
    active: Option<ActiveLine>,
    drawn: bool,
}

impl Renderer {
    fn clear(&mut self) {
        if self.drawn {
            print!("\r\x1b[2K");
            self.drawn = false;
        }
    }

    fn line(&mut self, text: &str) {
        self.clear();
        println!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn draw_active(&mut self) {
        if !self.interactive {
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if !active.dirty {
            return;
        }
        active.dirty = false;
        let amount = match active.stage {
            Stage::Committing => match active.total {
                Some(total) => format!("{}/{total} apps", active.current),
                None => format!("{} apps", active.current),
            },
            _ => match active.total {
                Some(total) if total > 0 => format!(
                    "{} / {} ({}%)",
                    format_size(active.current),
                    format_size(total),
                    active.current.saturating_mul(100) / total
                ),
                _ => format_size(active.current),
            },
        };
        let text = format!(
            "  {} {} {} {}",
            self.theme.icons.active.with(self.theme.colors.active),
            active.address.as_str().with(self.theme.colors.primary),
            active.stage.label(),
            amount.with(self.theme.colors.secondary),
        );
        print!("\r\x1b[2K{text}");
        let _ = std::io::stdout().flush();
        self.drawn = true;
    }
}

fn run_event_loop(receiver: &mpsc::Receiver<UiEvent>) {
    let mut ui = Renderer {
        theme: Theme::default(),
        interactive: std::io::stdout().is_tty(),
        active: None,
        drawn: false,
    };

    loop {
        // Progress redraws are coalesced to 10 per second
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(UiEvent::RepoStarted { address }) => {
                ui.active = Some(ActiveLine {
                    address,
                    stage: Stage::Downloading,
                    current: 0,
                    total: None,
                    dirty: true,
                });
            }
            Ok(UiEvent::Progress {
                address,
                stage,
                current,
                total,
            }) => {
                if let Some(active) = ui.active.as_mut().filter(|a| a.address == address) {
                    active.stage = stage;
                    active.current = current;
                    active.total = total;
                    active.dirty = true;
                }
            }
            Ok(UiEvent::RepoDone { address, detail }) => {
                ui.active = None;
                let text = format!(
                    "  {} {} {}",
                    ui.theme.icons.success.with(ui.theme.colors.success),
                    address.with(ui.theme.colors.primary),
                    detail.with(ui.theme.colors.secondary)
                );
                ui.line(&text);
            }
            Ok(UiEvent::RepoFailed { address, reason }) => {
                ui.active = None;
                let text = format!(
                    "  {} {} {}",
                    ui.theme.icons.error.with(ui.theme.colors.error),
                    address.with(ui.theme.colors.primary),
                    reason.with(ui.theme.colors.error)
                );
                ui.line(&text);
            }
            Ok(UiEvent::Info(msg)) => {
                let text = format!("  {} {msg}", ui.theme.icons.info);
                ui.line(&text);
            }
            Ok(UiEvent::Success(msg)) => {
                let text = format!(
                    "  {} {}",
                    ui.theme.icons.success.with(ui.theme.colors.success),
                    msg.with(ui.theme.colors.success)
                );
                ui.line(&text);
            }
            Ok(UiEvent::Warning(msg)) => {
                let text = format!(
                    "  {} {}",
                    ui.theme.icons.warning.with(ui.theme.colors.warning),
                    msg.with(ui.theme.colors.warning)
                );
                ui.line(&text);
            }
            Ok(UiEvent::Error(msg)) => {
                let text = format!(
                    "  {} {}",
                    ui.theme.icons.error.with(ui.theme.colors.error),
                    msg.with(ui.theme.colors.error)
                );
                ui.line(&text);
            }
            Ok(UiEvent::Sync(tx)) => {
                ui.clear();
                let _ = std::io::stdout().flush();
                let _ = tx.send(());
            }
            Ok(UiEvent::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                ui.clear();
                let _ = std::io::stdout().flush();
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => ui.draw_active(),
        }
    }
}
