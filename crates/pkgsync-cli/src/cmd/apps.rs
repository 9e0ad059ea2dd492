//! `pkgsync apps`

use anyhow::Result;
use pkgsync_schema::RepoId;

use crate::context::Context;
use crate::ui::list::print_apps;

/// List catalog apps with their newest release.
pub fn apps(ctx: &Context, repo: Option<i64>, query: Option<&str>) -> Result<()> {
    let apps = ctx.db.list_apps(repo.map(RepoId), query)?;
    let mut rows = Vec::with_capacity(apps.len());
    for app in apps {
        let latest = ctx
            .db
            .list_apks(app.repo_id, app.package_name.as_str())?
            .into_iter()
            .next();
        rows.push((app, latest));
    }
    print_apps(&rows);
    Ok(())
}
