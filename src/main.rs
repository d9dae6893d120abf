use std::{io::IsTerminal, process::ExitCode};

use clap::Parser;
use color_eyre::eyre::Result;
use error::Error;

use crate::action_context::ActionContext;

mod action_context;
mod cli;
mod conformance;
mod error;
mod github;
mod github_actions;
mod oidc;
mod report;

pub(crate) fn build_http_client() -> reqwest::ClientBuilder {
    reqwest::Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ))
}

#[tokio::main]
async fn main() -> Result<std::process::ExitCode> {
    color_eyre::config::HookBuilder::default()
        .issue_url(concat!(env!("CARGO_PKG_REPOSITORY"), "/issues/new"))
        .add_issue_metadata("version", env!("CARGO_PKG_VERSION"))
        .add_issue_metadata("os", std::env::consts::OS)
        .add_issue_metadata("arch", std::env::consts::ARCH)
        .theme(if !std::io::stderr().is_terminal() {
            color_eyre::config::Theme::new()
        } else {
            color_eyre::config::Theme::dark()
        })
        .issue_filter(|kind| match kind {
            color_eyre::ErrorKind::NonRecoverable(_) => true,
            color_eyre::ErrorKind::Recoverable(error) => {
                if let Some(known_error) = error.downcast_ref::<Error>() {
                    known_error.should_suggest_issue()
                } else {
                    true
                }
            }
        })
        .install()?;

    match execute().await {
        Ok(exit) => Ok(exit),
        Err(error) => {
            if let Some(known_error) = error.downcast_ref::<Error>() {
                known_error.maybe_github_actions_annotation()
            } else if std::env::var("GITHUB_ACTIONS").is_ok() {
                println!("::error::❌ {}", error.to_string().replace('\n', " "));
            }
            Err(error)
        }
    }
}

async fn execute() -> Result<ExitCode> {
    let mut cli = cli::ConformanceActionCli::parse();
    if cli.debug {
        cli.instrumentation.raise_to_debug();
    }
    cli.instrumentation.setup()?;

    let ctx = ActionContext::from_cli(cli).await?;
    let result = ctx.run(&mut tokio::io::stderr()).await?;

    if result.success() {
        tracing::info!("sigstore-conformance exited successfully");
    } else {
        tracing::info!(
            exit_code = result.exit_code,
            "sigstore-conformance found one or more test failures"
        );
    }

    Ok(result.exit_code())
}
