use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    facility_check::logging::init(facility_check::logging::DEFAULT_DIRECTIVE)
        .context("init logging")?;

    let cli = facility_check::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        facility_check::cli::Command::Parse(args) => {
            facility_check::commands::parse(args).context("parse")?;
        }
        facility_check::cli::Command::Search(args) => {
            facility_check::commands::search(args)
                .await
                .context("search")?;
        }
        facility_check::cli::Command::Serve(args) => {
            facility_check::commands::serve(args).await.context("serve")?;
        }
    }

    Ok(())
}
