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
    let cli = articlepress::cli::Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    articlepress::logging::init(level).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    let summaries = match cli.command {
        articlepress::cli::Command::Render(args) => {
            articlepress::render::run(args).await.context("render")?
        }
        articlepress::cli::Command::Localize(args) => {
            articlepress::localize::run(args).await.context("localize")?
        }
        articlepress::cli::Command::Download(args) => {
            articlepress::download::run(args).await.context("download")?
        }
        articlepress::cli::Command::CleanTrackers(args) => {
            articlepress::trackers::run(args).context("clean trackers")?
        }
        articlepress::cli::Command::ExpandLinks(args) => articlepress::shortlinks::run(args)
            .await
            .context("expand links")?,
    };

    for summary in &summaries {
        summary.log();
        print!("{summary}");
    }

    Ok(())
}
