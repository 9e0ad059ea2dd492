//! `pkgsync update`

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use pkgsync_core::io::download::{HttpDownloader, SchemeDownloader};
use pkgsync_core::{Downloader, RepoUpdater, UpdateStatus};
use pkgsync_schema::RepoId;

use crate::context::Context;
use crate::ui::{Output, TerminalReporter};

/// Update every repository, or only `repo`. Fails if any repository failed.
pub async fn update(ctx: &mut Context, repo: Option<i64>) -> Result<()> {
    let output = Output::new();

    let mut repos = match repo {
        Some(id) => {
            let id = RepoId(id);
            vec![
                ctx.db
                    .get_repo(id)?
                    .with_context(|| format!("No repository with id {id}"))?,
            ]
        }
        None => ctx.db.list_repos()?,
    };
    if repos.is_empty() {
        output.info("No repositories configured. Run 'pkgsync repo add <address>' first.");
        output.wait();
        return Ok(());
    }

    let http = HttpDownloader::new(ctx.config.timeout())?;
    let downloader: Arc<dyn Downloader> = Arc::new(SchemeDownloader::new(http));
    let updater = RepoUpdater::new(downloader, ctx.layout.cache_path())
        .with_anchors(ctx.config.anchors())
        .with_reporter(Arc::new(TerminalReporter::new(output.clone())));

    let cancel = updater.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling update");
            cancel.cancel();
        }
    });

    let report = updater.update_all(&mut repos, &mut ctx.db).await;

    let changed = report
        .results
        .iter()
        .filter(|(_, r)| matches!(r, Ok(UpdateStatus::Processed { .. })))
        .count();
    let failed = report.failures().count();
    let total = report.results.len();

    if failed == 0 {
        output.success(&format!(
            "{total} repositories checked, {changed} updated"
        ));
        output.wait();
        return Ok(());
    }

    output.error(&format!("{failed} of {total} repositories failed to update"));
    output.wait();
    bail!("{failed} of {total} repositories failed to update")
}
