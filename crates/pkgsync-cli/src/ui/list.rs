//! Column-aligned rendering for `pkgsync repo list` and `pkgsync apps`.

use super::theme::{Theme, format_date};
use crossterm::style::Stylize;
use pkgsync_schema::{Apk, App, Repo};

fn trust_state(repo: &Repo) -> String {
    match (&repo.signing_certificate, &repo.fingerprint) {
        (Some(cert), _) => match cert.fingerprint() {
            Ok(fp) => format!("signer {}", &fp.as_str()[..16]),
            Err(_) => "signer invalid".to_string(),
        },
        (None, Some(fp)) => format!("pinned {}", &fp.as_str()[..16]),
        (None, None) => "not yet contacted".to_string(),
    }
}

/// Print the repository table
pub fn print_repos(repos: &[Repo]) {
    let theme = Theme::default();

    if repos.is_empty() {
        println!();
        println!("  No repositories configured.");
        println!("  Run 'pkgsync repo add <address>' to add one.");
        return;
    }

    println!();
    let header = format!(
        "  {:<iw$} {:<6} {:<10} {}",
        "id",
        "format",
        "updated",
        "address",
        iw = theme.layout.id_width,
    );
    println!("{}", header.dark_grey());

    for repo in repos {
        let id = format!("{:<width$}", repo.id.0, width = theme.layout.id_width);
        let format = format!("{:<6}", repo.format.as_str());
        let updated = format!("{:<10}", format_date(repo.last_updated));
        println!(
            "  {} {} {} {}",
            id.with(theme.colors.version),
            format.with(theme.colors.secondary),
            updated.with(theme.colors.secondary),
            repo.address.as_str().with(theme.colors.primary),
        );
        let mut detail = trust_state(repo);
        if !repo.name.is_empty() {
            detail = format!("{}, {detail}", repo.name);
        }
        println!(
            "  {:<iw$} {}",
            "",
            detail.dark_grey(),
            iw = theme.layout.id_width
        );
    }
}

/// Print one row per app with its newest release
pub fn print_apps(apps: &[(App, Option<Apk>)]) {
    let theme = Theme::default();

    if apps.is_empty() {
        println!();
        println!("  No apps found.");
        return;
    }

    println!();
    let header = format!(
        "  {:<nw$} {:<vw$} {}",
        "package",
        "version",
        "name",
        nw = theme.layout.name_width,
        vw = theme.layout.version_width,
    );
    println!("{}", header.dark_grey());

    for (app, latest) in apps {
        let name_part = format!(
            "{:<width$}",
            app.package_name.as_str(),
            width = theme.layout.name_width
        );
        let version = latest.as_ref().map_or("-", |apk| apk.version_name.as_str());
        let version_part = format!("{version:<width$}", width = theme.layout.version_width);
        let summary = if app.summary.is_empty() {
            app.name.clone()
        } else {
            format!("{} - {}", app.name, app.summary)
        };
        println!(
            "  {} {} {}",
            name_part.with(theme.colors.primary),
            version_part.with(theme.colors.version),
            summary.with(theme.colors.secondary)
        );
    }

    println!();
    println!("{}", format!("  {} apps", apps.len()).dark_grey());
}
