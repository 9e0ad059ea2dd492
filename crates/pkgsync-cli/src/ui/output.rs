//! Unified UI output interface.
//!
//! Commands and the updater's reporter send events to the UI actor for
//! sequential rendering.

use super::actor::{Stage, UiActor, UiEvent};
use pkgsync_core::{RepoUpdateError, UpdateReporter, UpdateStatus};
use pkgsync_schema::Repo;
use std::sync::{OnceLock, mpsc};
use std::time::Duration;

/// Singleton instance of the UI actor channel.
static UI_ACTOR: OnceLock<mpsc::Sender<UiEvent>> = OnceLock::new();

fn get_actor_sender() -> mpsc::Sender<UiEvent> {
    UI_ACTOR
        .get_or_init(|| {
            let actor = UiActor::spawn();
            let sender = actor.sender();

            // Keep actor alive for program duration
            std::mem::forget(actor);

            sender
        })
        .clone()
}

/// A cloneable handle for sending UI events to the terminal actor.
#[derive(Debug, Clone)]
pub struct Output {
    sender: mpsc::Sender<UiEvent>,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self {
            sender: get_actor_sender(),
        }
    }

    pub fn info(&self, msg: &str) {
        let _ = self.sender.send(UiEvent::Info(msg.to_string()));
    }

    pub fn success(&self, msg: &str) {
        let _ = self.sender.send(UiEvent::Success(msg.to_string()));
    }

    pub fn warning(&self, msg: &str) {
        let _ = self.sender.send(UiEvent::Warning(msg.to_string()));
    }

    pub fn error(&self, msg: &str) {
        let _ = self.sender.send(UiEvent::Error(msg.to_string()));
    }

    /// Block until all pending UI events are rendered.
    pub fn wait(&self) {
        let (tx, rx) = mpsc::channel();
        if self.sender.send(UiEvent::Sync(tx)).is_ok() {
            let _ = rx.recv_timeout(Duration::from_secs(5));
        }
    }

    fn send(&self, event: UiEvent) {
        let _ = self.sender.send(event);
    }
}

/// [`UpdateReporter`] drawing one progress line per repository.
#[derive(Debug, Clone, Default)]
pub struct TerminalReporter {
    output: Output,
}

impl TerminalReporter {
    pub fn new(output: Output) -> Self {
        Self { output }
    }

    fn progress(&self, repo: &Repo, stage: Stage, current: u64, total: Option<u64>) {
        self.output.send(UiEvent::Progress {
            address: repo.address.clone(),
            stage,
            current,
            total,
        });
    }
}

impl UpdateReporter for TerminalReporter {
    fn started(&self, repo: &Repo) {
        self.output.send(UiEvent::RepoStarted {
            address: repo.address.clone(),
        });
    }

    fn downloading(&self, repo: &Repo, current: u64, total: Option<u64>) {
        self.progress(repo, Stage::Downloading, current, total);
    }

    fn processing(&self, repo: &Repo, current: u64, total: Option<u64>) {
        self.progress(repo, Stage::Processing, current, total);
    }

    fn committing(&self, repo: &Repo, current: u64, total: u64) {
        self.progress(repo, Stage::Committing, current, Some(total));
    }

    fn finished(&self, repo: &Repo, result: &Result<UpdateStatus, RepoUpdateError>) {
        let event = match result {
            Ok(UpdateStatus::Unchanged) => UiEvent::RepoDone {
                address: repo.address.clone(),
                detail: "up to date".to_string(),
            },
            Ok(UpdateStatus::Processed { apps, apks, .. }) => UiEvent::RepoDone {
                address: repo.address.clone(),
                detail: format!("{apps} apps, {apks} packages"),
            },
            Err(e) => UiEvent::RepoFailed {
                address: repo.address.clone(),
                reason: format!("{}: {}", e.kind(), e.message),
            },
        };
        self.output.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgsync_schema::RepoId;

    #[test]
    fn test_output_clone() {
        let output = Output::new();
        let output2 = output.clone();

        output.info("from original");
        output2.info("from clone");
        output.wait();
    }

    #[test]
    fn test_reporter_events_render() {
        let reporter = TerminalReporter::default();
        let repo = Repo::new(RepoId(1), "https://repo.example.org/fdroid/repo");
        reporter.started(&repo);
        reporter.downloading(&repo, 512, Some(1024));
        reporter.committing(&repo, 1, 2);
        reporter.finished(&repo, &Ok(UpdateStatus::Unchanged));
        reporter.output.wait();
    }
}
