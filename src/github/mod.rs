use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Response;
use serde::Deserialize;

use crate::{build_http_client, error::Error};

const GITHUB_API_VERSION: &str = "2022-11-28";

/// Status of a workflow run as reported by the Actions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct WorkflowRun {
    pub(crate) id: u64,
    pub(crate) status: RunStatus,
    pub(crate) run_started_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub(crate) fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct Artifact {
    pub(crate) id: u64,
    pub(crate) name: String,
}

#[derive(Deserialize)]
struct WorkflowRunsPage {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Deserialize)]
struct ArtifactsPage {
    artifacts: Vec<Artifact>,
}

/// The slice of the Actions REST API the OIDC token path needs.
#[async_trait]
pub(crate) trait WorkflowApi {
    /// The most recent run of the configured workflow, if there is one yet.
    async fn latest_run(&self) -> Result<Option<WorkflowRun>>;

    async fn list_artifacts(&self, run_id: u64) -> Result<Vec<Artifact>>;

    /// Raw archive bytes of an artifact.
    async fn download_artifact(&self, artifact_id: u64) -> Result<Vec<u8>>;
}

pub(crate) fn github_headers() -> HeaderMap {
    let mut header_map = HeaderMap::new();

    header_map.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    header_map.insert(
        HeaderName::from_static("x-github-api-version"),
        HeaderValue::from_static(GITHUB_API_VERSION),
    );
    header_map
}

/// Endpoints of one repository's workflow under an API root.
#[derive(Debug, Clone)]
pub(crate) struct Routes {
    api: url::Url,
    repository: String,
    workflow: String,
}

impl Routes {
    pub(crate) fn new(mut api: url::Url, repository: String, workflow: String) -> Self {
        // `Url::join` replaces the last segment unless the base ends in `/`,
        // which matters for Enterprise hosts like `https://ghe.example/api/v3`.
        if !api.path().ends_with('/') {
            let path = format!("{}/", api.path());
            api.set_path(&path);
        }

        Self {
            api,
            repository,
            workflow,
        }
    }

    pub(crate) fn workflow_runs(&self) -> Result<url::Url> {
        let mut url = self.api.join(&format!(
            "repos/{}/actions/workflows/{}/runs",
            self.repository, self.workflow
        ))?;
        url.query_pairs_mut().append_pair("per_page", "1");
        Ok(url)
    }

    pub(crate) fn artifacts(&self, run_id: u64) -> Result<url::Url> {
        Ok(self.api.join(&format!(
            "repos/{}/actions/runs/{run_id}/artifacts",
            self.repository
        ))?)
    }

    pub(crate) fn artifact_zip(&self, artifact_id: u64) -> Result<url::Url> {
        Ok(self.api.join(&format!(
            "repos/{}/actions/artifacts/{artifact_id}/zip",
            self.repository
        ))?)
    }
}

/// Talks to a single repository's workflow, reusing one HTTP session across polls.
pub(crate) struct GithubClient {
    routes: Routes,
    bearer_token: String,
    client: reqwest::Client,
}

impl GithubClient {
    pub(crate) fn new(routes: Routes, bearer_token: String) -> Result<Self> {
        Self::from_builder(routes, bearer_token, build_http_client())
    }

    fn from_builder(
        routes: Routes,
        bearer_token: String,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self> {
        let client = builder.default_headers(github_headers()).build()?;

        Ok(Self {
            routes,
            bearer_token,
            client,
        })
    }

    async fn get(&self, url: url::Url, what: &'static str) -> Result<Response> {
        tracing::trace!(%url, "Sending {what}");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .wrap_err_with(|| format!("Sending {what}"))?;

        let status = response.status();
        tracing::trace!(status = tracing::field::display(status), "Got {what} response");

        if !status.is_success() {
            return Err(Error::RemoteApi {
                what,
                status,
                body: response_text(response).await,
            })?;
        }

        Ok(response)
    }
}

#[async_trait]
impl WorkflowApi for GithubClient {
    #[tracing::instrument(skip_all)]
    async fn latest_run(&self) -> Result<Option<WorkflowRun>> {
        let page: WorkflowRunsPage = self
            .get(self.routes.workflow_runs()?, "workflow runs GET")
            .await?
            .json()
            .await
            .wrap_err("Decoding workflow runs response")?;

        Ok(page.workflow_runs.into_iter().next())
    }

    #[tracing::instrument(skip(self))]
    async fn list_artifacts(&self, run_id: u64) -> Result<Vec<Artifact>> {
        let page: ArtifactsPage = self
            .get(self.routes.artifacts(run_id)?, "run artifacts GET")
            .await?
            .json()
            .await
            .wrap_err("Decoding run artifacts response")?;

        Ok(page.artifacts)
    }

    #[tracing::instrument(skip(self))]
    async fn download_artifact(&self, artifact_id: u64) -> Result<Vec<u8>> {
        let bytes = self
            .get(self.routes.artifact_zip(artifact_id)?, "artifact zip GET")
            .await?
            .bytes()
            .await
            .wrap_err("Reading artifact zip body")?;

        tracing::debug!(len = bytes.len(), "Downloaded artifact archive");
        Ok(bytes.to_vec())
    }
}

async fn response_text(res: Response) -> String {
    if let Ok(message) = res.text().await {
        message
    } else {
        String::from("no body")
    }
}
