//! Identity token acquisition.
//!
//! A separate workflow mints a short-lived OIDC token on a schedule and uploads it
//! as an artifact. We wait for a fresh completed run of that workflow, pull the
//! artifact, and hand the token to the conformance suite.

pub(crate) mod artifact;
#[cfg(test)]
pub(crate) mod fakes;
pub(crate) mod poller;

use color_eyre::eyre::{Result, WrapErr};

use crate::{error::Error, github::WorkflowApi};

use self::{
    artifact::{fetch_artifact, ArtifactDecoder},
    poller::{await_completed_run, PollClock, PollPolicy},
};

pub(crate) const DEFAULT_OIDC_REPOSITORY: &str = "tetsuo-cpp/sigstore-conformance-oidc";
pub(crate) const DEFAULT_OIDC_WORKFLOW: &str = "54271711";
pub(crate) const DEFAULT_OIDC_ARTIFACT: &str = "oidc-token";
pub(crate) const DEFAULT_OIDC_ARTIFACT_FILE: &str = "oidc-token.txt";

/// Where the token comes from.
// No `Debug`: this carries the bearer token.
#[derive(Clone)]
pub(crate) struct WorkflowSource {
    pub(crate) api: url::Url,
    pub(crate) repository: String,
    pub(crate) workflow: String,
    pub(crate) artifact: String,
    pub(crate) artifact_file: String,
    pub(crate) bearer_token: String,
    pub(crate) policy: PollPolicy,
}

#[tracing::instrument(skip_all, fields(
    repository = %source.repository,
    workflow = %source.workflow,
    artifact = %source.artifact,
))]
pub(crate) async fn extract_token(
    source: &WorkflowSource,
    api: &(dyn WorkflowApi + Send + Sync),
    clock: &(dyn PollClock + Send + Sync),
    decoder: &(dyn ArtifactDecoder + Send + Sync),
) -> Result<String> {
    let run = await_completed_run(api, clock, &source.policy, &source.workflow).await?;
    let contents = fetch_artifact(api, decoder, &run, &source.artifact).await?;
    let token = token_from_contents(contents).wrap_err("Decoding identity token")?;

    // `--identity-token ""` would make the suite fail confusingly; stop here instead.
    if token.is_empty() {
        return Err(Error::EmptyToken(source.artifact.clone()))?;
    }

    tracing::info!(run_id = run.id, "Acquired identity token");
    Ok(token)
}

/// The producer writes the token followed by a newline. Exactly one trailing
/// character is dropped, newline or not.
pub(crate) fn token_from_contents(contents: Vec<u8>) -> Result<String> {
    let mut token = String::from_utf8(contents)?;
    token.pop();
    Ok(token)
}
