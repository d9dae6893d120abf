mod instrumentation;

use std::{path::PathBuf, time::Duration};

use crate::{
    conformance::DEFAULT_RUNNER,
    oidc::{
        poller::PollPolicy, DEFAULT_OIDC_ARTIFACT, DEFAULT_OIDC_ARTIFACT_FILE,
        DEFAULT_OIDC_REPOSITORY, DEFAULT_OIDC_WORKFLOW,
    },
};

#[derive(Debug, clap::Parser)]
#[clap(version, about = "Run the sigstore-conformance suite and report the result")]
pub(crate) struct ConformanceActionCli {
    /// Where to append the step summary.
    #[clap(long, env = "GITHUB_STEP_SUMMARY", value_parser = PathBufToNoneParser, default_value = "")]
    pub(crate) summary_path: OptionPathBuf,
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_SUMMARY", action = clap::ArgAction::Set, value_parser = EmptyBoolParser, default_value = "true")]
    pub(crate) summary: bool,
    /// Pass `-s -vv --showlocals` to the suite and log at debug level.
    ///
    /// Only `true` or `false` (or empty, meaning false) are accepted; `1` or `yes` are errors.
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_INTERNAL_BE_CAREFUL_DEBUG", action = clap::ArgAction::Set, value_parser = EmptyBoolParser, default_value = "false")]
    pub(crate) debug: bool,
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_ENTRYPOINT", value_parser = StringToNoneParser, default_value = "")]
    pub(crate) entrypoint: OptionString,
    /// Token for the Actions API. When set, an identity token is fetched and passed to the suite.
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_GITHUB_TOKEN", value_parser = StringToNoneParser, default_value = "", hide_env_values = true)]
    pub(crate) github_token: OptionString,
    /// Directory holding the action; the suite lives in its `test` subdirectory.
    #[clap(long, env = "GITHUB_ACTION_PATH")]
    pub(crate) action_path: PathBuf,
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_RUNNER", default_value = DEFAULT_RUNNER)]
    pub(crate) runner: String,

    #[clap(
        long,
        env = "GHA_SIGSTORE_CONFORMANCE_GITHUB_API",
        default_value = "https://api.github.com"
    )]
    pub(crate) github_api: url::Url,
    /// Repository whose workflow mints identity tokens.
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_OIDC_REPOSITORY", default_value = DEFAULT_OIDC_REPOSITORY)]
    pub(crate) oidc_repository: String,
    /// Workflow id or file name within `--oidc-repository`.
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_OIDC_WORKFLOW", default_value = DEFAULT_OIDC_WORKFLOW)]
    pub(crate) oidc_workflow: String,
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_OIDC_ARTIFACT", default_value = DEFAULT_OIDC_ARTIFACT)]
    pub(crate) oidc_artifact: String,
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_OIDC_ARTIFACT_FILE", default_value = DEFAULT_OIDC_ARTIFACT_FILE)]
    pub(crate) oidc_artifact_file: String,
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_POLL_INTERVAL", default_value_t = 60)]
    pub(crate) poll_interval_secs: u64,
    /// Completed runs that started longer ago than this are ignored.
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_FRESHNESS_WINDOW", default_value_t = 300)]
    pub(crate) freshness_window_secs: u64,
    /// Give up after this many polls (at least 1). Unset waits forever.
    #[clap(long, env = "GHA_SIGSTORE_CONFORMANCE_MAX_POLLS", value_parser = NonZeroU64ToNoneParser, default_value = "")]
    pub(crate) max_polls: OptionU64,

    #[clap(flatten)]
    pub(crate) instrumentation: instrumentation::Instrumentation,
}

impl ConformanceActionCli {
    pub(crate) fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            freshness_window: Duration::from_secs(self.freshness_window_secs),
            max_polls: self.max_polls.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OptionString(pub Option<String>);

#[derive(Clone)]
struct StringToNoneParser;

impl clap::builder::TypedValueParser for StringToNoneParser {
    type Value = OptionString;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let inner = clap::builder::StringValueParser::new();
        let val = inner.parse_ref(cmd, arg, value)?;

        if val.is_empty() {
            Ok(OptionString(None))
        } else {
            Ok(OptionString(Some(Into::<String>::into(val))))
        }
    }
}

#[derive(Clone, Debug)]
pub struct OptionPathBuf(pub Option<PathBuf>);

#[derive(Clone)]
struct PathBufToNoneParser;

impl clap::builder::TypedValueParser for PathBufToNoneParser {
    type Value = OptionPathBuf;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let inner = clap::builder::StringValueParser::new();
        let val = inner.parse_ref(cmd, arg, value)?;

        if val.is_empty() {
            Ok(OptionPathBuf(None))
        } else {
            Ok(OptionPathBuf(Some(Into::<PathBuf>::into(val))))
        }
    }
}

#[derive(Clone)]
struct EmptyBoolParser;

impl clap::builder::TypedValueParser for EmptyBoolParser {
    type Value = bool;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let inner = clap::builder::StringValueParser::new();
        let val = inner.parse_ref(cmd, arg, value)?;

        if val.is_empty() {
            Ok(false)
        } else {
            let val = match val.as_ref() {
                "true" => true,
                "false" => false,
                v => {
                    return Err(clap::Error::raw(
                        clap::error::ErrorKind::InvalidValue,
                        format!("`{v}` was not `true` or `false`\n"),
                    ))
                }
            };
            Ok(val)
        }
    }
}

#[derive(Clone, Debug)]
pub struct OptionU64(pub Option<u64>);

#[derive(Clone)]
struct NonZeroU64ToNoneParser;

impl clap::builder::TypedValueParser for NonZeroU64ToNoneParser {
    type Value = OptionU64;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let inner = clap::builder::StringValueParser::new();
        let val = inner.parse_ref(cmd, arg, value)?;

        if val.is_empty() {
            Ok(OptionU64(None))
        } else {
            let expression = val.parse::<u64>().map_err(|e| {
                clap::Error::raw(clap::error::ErrorKind::ValueValidation, format!("{e}\n"))
            })?;
            if expression == 0 {
                return Err(clap::Error::raw(
                    clap::error::ErrorKind::ValueValidation,
                    "must be at least 1; leave unset to poll without a limit\n",
                ));
            }
            Ok(OptionU64(Some(expression)))
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> Result<ConformanceActionCli, clap::Error> {
        ConformanceActionCli::try_parse_from(
            ["sigstore-conformance-action", "--action-path", "/action"]
                .iter()
                .chain(args),
        )
    }

    #[test]
    fn defaults_match_the_hosted_token_workflow() {
        let cli = parse(&[]).unwrap();

        assert!(cli.summary);
        assert!(!cli.debug);
        assert_eq!(cli.runner, "pytest");
        assert_eq!(cli.oidc_repository, "tetsuo-cpp/sigstore-conformance-oidc");
        assert_eq!(cli.oidc_workflow, "54271711");
        assert_eq!(cli.oidc_artifact, "oidc-token");
        assert_eq!(cli.oidc_artifact_file, "oidc-token.txt");
        assert_eq!(cli.poll_policy(), PollPolicy::default());
    }

    #[test]
    fn empty_values_mean_unset() {
        let cli = parse(&[
            "--entrypoint=",
            "--github-token=",
            "--summary-path=",
            "--max-polls=",
            "--summary=",
        ])
        .unwrap();

        assert!(cli.entrypoint.0.is_none());
        assert!(cli.github_token.0.is_none());
        assert!(cli.summary_path.0.is_none());
        assert!(cli.max_polls.0.is_none());
        assert!(!cli.summary);
    }

    #[test]
    fn poll_knobs_feed_the_policy() {
        let cli = parse(&[
            "--poll-interval-secs",
            "5",
            "--freshness-window-secs",
            "30",
            "--max-polls",
            "12",
        ])
        .unwrap();

        assert_eq!(
            cli.poll_policy(),
            PollPolicy {
                interval: Duration::from_secs(5),
                freshness_window: Duration::from_secs(30),
                max_polls: Some(12),
            }
        );
    }

    #[test]
    fn booleans_must_be_spelled_out() {
        assert!(parse(&["--debug", "yes"]).is_err());
        assert!(parse(&["--debug", "true"]).unwrap().debug);
    }

    #[test]
    fn zero_poll_cap_is_rejected() {
        assert!(parse(&["--max-polls", "0"]).is_err());
        assert_eq!(parse(&["--max-polls", "1"]).unwrap().max_polls.0, Some(1));
    }
}
