//! In-memory stand-ins for the Actions API and the poll clock (testing only).

use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use http::StatusCode;

use crate::{
    error::Error,
    github::{Artifact, RunStatus, WorkflowApi, WorkflowRun},
    oidc::{artifact::ZipEntryDecoder, poller::PollClock},
};

pub(crate) fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2023-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub(crate) fn run(id: u64, status: RunStatus, started: DateTime<Utc>) -> WorkflowRun {
    WorkflowRun {
        id,
        status,
        run_started_at: started,
    }
}

pub(crate) fn artifact(id: u64, name: &str) -> Artifact {
    Artifact {
        id,
        name: name.into(),
    }
}

pub(crate) fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub(crate) fn token_decoder() -> ZipEntryDecoder {
    ZipEntryDecoder {
        entry: "oidc-token.txt".into(),
    }
}

/// Clock that only advances when slept on.
pub(crate) struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    pub(crate) sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub(crate) fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn sleep_count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }
}

#[async_trait]
impl PollClock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

/// Serves queued `latest_run` answers; once drained, repeats `fallback` forever.
#[derive(Default)]
pub(crate) struct FakeApi {
    pub(crate) runs: Mutex<VecDeque<Option<WorkflowRun>>>,
    pub(crate) fallback: Option<WorkflowRun>,
    /// Answer every `latest_run` with this status instead.
    pub(crate) runs_status: Option<StatusCode>,
    /// Answer every `list_artifacts` with this status instead.
    pub(crate) artifacts_status: Option<StatusCode>,
    pub(crate) artifacts: Vec<Artifact>,
    pub(crate) archive: Vec<u8>,
    pub(crate) run_calls: Mutex<usize>,
    pub(crate) downloads: Mutex<Vec<u64>>,
}

impl FakeApi {
    pub(crate) fn with_runs(runs: impl IntoIterator<Item = Option<WorkflowRun>>) -> Self {
        Self {
            runs: Mutex::new(runs.into_iter().collect()),
            ..Default::default()
        }
    }
}

fn remote_error(what: &'static str, status: StatusCode) -> Error {
    Error::RemoteApi {
        what,
        status,
        body: "no body".into(),
    }
}

#[async_trait]
impl WorkflowApi for FakeApi {
    async fn latest_run(&self) -> Result<Option<WorkflowRun>> {
        *self.run_calls.lock().unwrap() += 1;
        if let Some(status) = self.runs_status {
            return Err(remote_error("workflow runs GET", status))?;
        }
        let next = self.runs.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn list_artifacts(&self, _run_id: u64) -> Result<Vec<Artifact>> {
        if let Some(status) = self.artifacts_status {
            return Err(remote_error("run artifacts GET", status))?;
        }
        Ok(self.artifacts.clone())
    }

    async fn download_artifact(&self, artifact_id: u64) -> Result<Vec<u8>> {
        self.downloads.lock().unwrap().push(artifact_id);
        Ok(self.archive.clone())
    }
}
