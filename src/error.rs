use http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// Summaries are enabled, but nowhere to write them was given.
    #[error("`GITHUB_STEP_SUMMARY` is unset, but summary rendering is enabled")]
    MissingSummaryPath,
    /// A non-2xx response from the workflow API. Never retried.
    #[error("Status {status} from {what}: {body}")]
    RemoteApi {
        what: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Expected exactly one `{name}` artifact on run {run_id}, found {count}")]
    ArtifactCount {
        name: String,
        run_id: u64,
        count: usize,
    },
    #[error("Artifact archive has no `{0}` entry")]
    MissingArchiveEntry(String),
    #[error("Artifact `{0}` yielded an empty identity token")]
    EmptyToken(String),
    #[error("No fresh completed run of workflow `{workflow}` after {polls} polls")]
    PollsExhausted { workflow: String, polls: u64 },
    #[error("Could not start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn should_suggest_issue(&self) -> bool {
        match self {
            Self::MissingSummaryPath
            | Self::RemoteApi { .. }
            | Self::ArtifactCount { .. }
            | Self::MissingArchiveEntry(_)
            | Self::EmptyToken(_)
            | Self::PollsExhausted { .. }
            | Self::Spawn { .. } => false,
        }
    }

    /// Output a Github Actions annotation command if desired.
    // Note: These may only be one line! Any further lines will not be printed!
    pub(crate) fn maybe_github_actions_annotation(&self) {
        if std::env::var("GITHUB_ACTIONS").is_ok() {
            println!("{}", self.annotation());
        }
    }

    fn annotation(&self) -> String {
        let title = match self {
            Error::MissingSummaryPath => "Configuration",
            Error::RemoteApi { .. } => "GitHub API",
            Error::ArtifactCount { .. }
            | Error::MissingArchiveEntry(_)
            | Error::EmptyToken(_) => "OIDC artifact",
            Error::PollsExhausted { .. } => "OIDC workflow",
            Error::Spawn { .. } => "Conformance runner",
        };
        let message = self.to_string().replace('\n', " ");
        format!("::error title={title}::❌ {message}")
    }
}
