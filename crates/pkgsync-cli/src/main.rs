//! pkgsync CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pkgsync_cli::cmd;
use pkgsync_cli::context::Context;
use pkgsync_cli::{Cli, Commands, RepoCommands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let home = cli.home.as_deref();

    match cli.command {
        Commands::Fingerprint { file } => cmd::fingerprint::fingerprint(&file),
        Commands::Repo { command } => {
            let mut ctx = Context::open(home)?;
            match command {
                RepoCommands::Add {
                    address,
                    fingerprint,
                    format,
                } => cmd::repo::add(&mut ctx, &address, fingerprint.as_deref(), format),
                RepoCommands::List => cmd::repo::list(&ctx),
                RepoCommands::Remove { id } => cmd::repo::remove(&mut ctx, id),
            }
        }
        Commands::Update { repo } => {
            let mut ctx = Context::open(home)?;
            cmd::update::update(&mut ctx, repo).await
        }
        Commands::Apps { repo, query } => {
            let ctx = Context::open(home)?;
            cmd::apps::apps(&ctx, repo, query.as_deref())
        }
    }
}
