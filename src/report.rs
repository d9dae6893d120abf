use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{conformance::ProcessResult, github_actions::StepSummary};

const SUCCESS_BANNER: &str = "🎉 sigstore-conformance exited successfully";
const FAILURE_BANNER: &str = "❌ sigstore-conformance found one or more test failures";

const RAW_OUTPUT_OPEN: &str = "
<details>
<summary>
    Raw `sigstore-conformance` output
</summary>

```
";

const RAW_OUTPUT_CLOSE: &str = "```
</details>
";

pub(crate) fn banner(result: &ProcessResult) -> &'static str {
    if result.success() {
        SUCCESS_BANNER
    } else {
        FAILURE_BANNER
    }
}

/// Banner line, then the raw suite output folded into a `<details>` block.
pub(crate) fn render_summary(result: &ProcessResult) -> String {
    let mut markdown = String::new();
    markdown.push_str(banner(result));
    markdown.push('\n');
    markdown.push_str(RAW_OUTPUT_OPEN);
    markdown.push_str(&result.stdout);
    if !result.stdout.is_empty() && !result.stdout.ends_with('\n') {
        markdown.push('\n');
    }
    markdown.push_str(RAW_OUTPUT_CLOSE);
    markdown
}

/// Publish the result.
///
/// The raw output always goes to `diagnostic`; the summary is only written when
/// a sink is given. Failing to write either is logged, not raised: the suite
/// already ran and its exit code is what the caller needs.
#[tracing::instrument(skip_all, fields(exit_code = result.exit_code, summary = summary.is_some()))]
pub(crate) async fn emit_report<D>(
    result: &ProcessResult,
    summary: Option<&mut StepSummary>,
    diagnostic: &mut D,
) where
    D: AsyncWrite + Unpin,
{
    if let Some(summary) = summary {
        if let Err(e) = summary.append(&render_summary(result)).await {
            tracing::warn!("Failed to write the step summary: {}", e);
        }
    } else {
        tracing::debug!("Summary rendering disabled");
    }

    for stream in [&result.stdout, &result.stderr] {
        if stream.is_empty() {
            continue;
        }
        if let Err(e) = diagnostic.write_all(stream.as_bytes()).await {
            tracing::warn!("Failed to mirror suite output: {}", e);
            return;
        }
    }
    if let Err(e) = diagnostic.flush().await {
        tracing::warn!("Failed to mirror suite output: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: i32, stdout: &str) -> ProcessResult {
        ProcessResult {
            exit_code,
            stdout: stdout.into(),
            stderr: "warnings\n".into(),
        }
    }

    #[test]
    fn success_summary() {
        assert_eq!(
            render_summary(&result(0, "3 passed in 1.20s\n")),
            "🎉 sigstore-conformance exited successfully

<details>
<summary>
    Raw `sigstore-conformance` output
</summary>

```
3 passed in 1.20s
```
</details>
"
        );
    }

    #[test]
    fn failure_summary_closes_fence_on_its_own_line() {
        let markdown = render_summary(&result(1, "1 failed"));
        assert!(markdown.starts_with(FAILURE_BANNER));
        assert!(markdown.ends_with("```\n1 failed\n```\n</details>\n"));
    }

    #[tokio::test]
    async fn summary_and_diagnostic_are_both_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.md");
        let mut summary = StepSummary::open(&path).await.unwrap();
        let mut diagnostic = Vec::new();
        let result = result(1, "1 failed\n");

        emit_report(&result, Some(&mut summary), &mut diagnostic).await;

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(FAILURE_BANNER));
        assert!(written.contains("1 failed\n"));
        assert_eq!(diagnostic, b"1 failed\nwarnings\n");
    }

    #[tokio::test]
    async fn disabled_summary_still_mirrors_output() {
        let mut diagnostic = Vec::new();

        emit_report(&result(0, "3 passed\n"), None, &mut diagnostic).await;

        assert_eq!(diagnostic, b"3 passed\nwarnings\n");
    }
}
