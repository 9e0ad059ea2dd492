//! `pkgsync repo add|list|remove`

use anyhow::{Context as _, Result, bail};
use pkgsync_schema::{Fingerprint, IndexFormat, RepoId};

use crate::context::Context;
use crate::ui::Output;
use crate::ui::list::print_repos;

const SCHEMES: [&str; 3] = ["https://", "http://", "file://"];

/// Register a repository. Nothing is downloaded until the next `update`.
pub fn add(
    ctx: &mut Context,
    address: &str,
    fingerprint: Option<&str>,
    format: IndexFormat,
) -> Result<()> {
    let output = Output::new();
    if !SCHEMES.iter().any(|s| address.starts_with(s)) {
        bail!("Unsupported repository address '{address}' (expected http, https or file URL)");
    }
    let fingerprint = fingerprint
        .map(Fingerprint::parse)
        .transpose()
        .context("Invalid fingerprint")?;

    let repo = ctx.db.add_repo(address, fingerprint.as_ref(), format)?;
    if fingerprint.is_none() && ctx.config.anchors().pin_for(&repo.address).is_none() {
        output.warning(&format!(
            "No fingerprint given for {}; the first certificate seen will be trusted",
            repo.address
        ));
    }
    output.success(&format!("Added repository {} ({})", repo.address, repo.id));
    output.wait();
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let repos = ctx.db.list_repos()?;
    print_repos(&repos);
    Ok(())
}

pub fn remove(ctx: &mut Context, id: i64) -> Result<()> {
    let output = Output::new();
    let id = RepoId(id);
    let repo = ctx
        .db
        .get_repo(id)?
        .with_context(|| format!("No repository with id {id}"))?;
    ctx.db.remove_repo(id)?;
    output.success(&format!("Removed repository {}", repo.address));
    output.wait();
    Ok(())
}
