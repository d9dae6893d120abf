use color_eyre::eyre::{Result, WrapErr};
use tokio::io::AsyncWrite;

use crate::{
    cli::ConformanceActionCli,
    conformance::{run_conformance_suite, ProcessResult, SuiteInvocation, SuiteOptions},
    error::Error,
    github::{GithubClient, Routes},
    github_actions::StepSummary,
    oidc::{artifact::ZipEntryDecoder, extract_token, poller::TokioClock, WorkflowSource},
    report::emit_report,
};

/// Everything the step needs, resolved once at startup.
pub(crate) struct ActionContext {
    pub(crate) summary: Option<StepSummary>,
    pub(crate) invocation: SuiteInvocation,
    pub(crate) options: SuiteOptions,
    pub(crate) workflow_source: Option<WorkflowSource>,
}

impl ActionContext {
    #[tracing::instrument(skip_all)]
    pub(crate) async fn from_cli(cli: ConformanceActionCli) -> Result<Self> {
        let summary = if cli.summary {
            let path = cli.summary_path.0.as_ref().ok_or(Error::MissingSummaryPath)?;
            tracing::debug!(path = %path.display(), "Opening step summary");
            Some(StepSummary::open(path).await?)
        } else {
            None
        };

        let policy = cli.poll_policy();
        let workflow_source = cli.github_token.0.map(|bearer_token| WorkflowSource {
            api: cli.github_api,
            repository: cli.oidc_repository,
            workflow: cli.oidc_workflow,
            artifact: cli.oidc_artifact,
            artifact_file: cli.oidc_artifact_file,
            bearer_token,
            policy,
        });

        Ok(Self {
            summary,
            invocation: SuiteInvocation {
                runner: cli.runner,
                action_path: cli.action_path,
            },
            options: SuiteOptions {
                debug: cli.debug,
                entrypoint: cli.entrypoint.0,
                identity_token: None,
            },
            workflow_source,
        })
    }

    /// Acquire a token if configured, run the suite, and report on it.
    ///
    /// A failing suite is a normal outcome carried in the returned result; only
    /// failures before the suite could run are errors.
    pub(crate) async fn run<D>(mut self, diagnostic: &mut D) -> Result<ProcessResult>
    where
        D: AsyncWrite + Unpin,
    {
        if let Some(source) = &self.workflow_source {
            let routes = Routes::new(
                source.api.clone(),
                source.repository.clone(),
                source.workflow.clone(),
            );
            let api = GithubClient::new(routes, source.bearer_token.clone())?;
            let decoder = ZipEntryDecoder {
                entry: source.artifact_file.clone(),
            };

            let token = extract_token(source, &api, &TokioClock, &decoder)
                .await
                .wrap_err("Getting an identity token for the conformance suite")?;
            self.options.identity_token = Some(token);
        }

        let result = run_conformance_suite(&self.invocation, &self.options).await?;
        emit_report(&result, self.summary.as_mut(), diagnostic).await;

        Ok(result)
    }
}
