use std::{
    path::{Path, PathBuf},
    process::{ExitCode, Stdio},
};

use color_eyre::eyre::Result;

use crate::error::Error;

pub(crate) const DEFAULT_RUNNER: &str = "pytest";
pub(crate) const DEBUG_FLAGS: [&str; 3] = ["-s", "-vv", "--showlocals"];
const REDACTED: &str = "<redacted>";

/// How to launch the suite: `<runner> <action-path>/test <args...>`, run from `<action-path>`.
#[derive(Debug, Clone)]
pub(crate) struct SuiteInvocation {
    pub(crate) runner: String,
    pub(crate) action_path: PathBuf,
}

impl SuiteInvocation {
    pub(crate) fn test_dir(&self) -> PathBuf {
        self.action_path.join("test")
    }

    fn working_dir(&self) -> &Path {
        &self.action_path
    }
}

/// Optional knobs passed through to the suite.
#[derive(Clone, Default)]
pub(crate) struct SuiteOptions {
    pub(crate) debug: bool,
    pub(crate) entrypoint: Option<String>,
    pub(crate) identity_token: Option<String>,
}

impl SuiteOptions {
    /// Debug flags, then `--entrypoint`, then `--identity-token`, always in that order.
    pub(crate) fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.debug {
            args.extend(DEBUG_FLAGS.iter().map(|flag| flag.to_string()));
        }
        if let Some(entrypoint) = &self.entrypoint {
            args.extend(["--entrypoint".to_string(), entrypoint.clone()]);
        }
        if let Some(token) = &self.identity_token {
            args.extend(["--identity-token".to_string(), token.clone()]);
        }

        args
    }

    /// Same as [`SuiteOptions::to_args`] with the token value masked, for logging.
    pub(crate) fn to_redacted_args(&self) -> Vec<String> {
        let mut args = self.to_args();
        if self.identity_token.is_some() {
            if let Some(last) = args.last_mut() {
                *last = REDACTED.to_string();
            }
        }
        args
    }
}

/// Everything the suite left behind. A non-zero `exit_code` is a test failure, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProcessResult {
    pub(crate) exit_code: i32,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl ProcessResult {
    pub(crate) fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The suite's own exit code, for use as ours.
    pub(crate) fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.propagated_code())
    }

    fn propagated_code(&self) -> u8 {
        u8::try_from(self.exit_code).unwrap_or_else(|_| {
            tracing::warn!(
                exit_code = self.exit_code,
                "Exit code does not fit in 0..=255, exiting with 1"
            );
            1
        })
    }
}

/// Run the suite to completion, capturing (not streaming) its output.
#[tracing::instrument(skip_all, fields(runner = %invocation.runner, action_path = %invocation.action_path.display()))]
pub(crate) async fn run_conformance_suite(
    invocation: &SuiteInvocation,
    options: &SuiteOptions,
) -> Result<ProcessResult> {
    tracing::debug!(
        "running: {} {} {:?}",
        invocation.runner,
        invocation.test_dir().display(),
        options.to_redacted_args()
    );

    let output = tokio::process::Command::new(&invocation.runner)
        .arg(invocation.test_dir())
        .args(options.to_args())
        .current_dir(invocation.working_dir())
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| Error::Spawn {
            program: invocation.runner.clone(),
            source,
        })?;

    let exit_code = match output.status.code() {
        Some(code) => code,
        None => {
            tracing::warn!(status = %output.status, "Conformance suite was terminated by a signal");
            1
        }
    };

    let result = ProcessResult {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    tracing::debug!(exit_code, stdout = %result.stdout, "Conformance suite finished");

    Ok(result)
}
