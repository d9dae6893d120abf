use std::io::{Cursor, Read};

use color_eyre::eyre::{Result, WrapErr};

use crate::{
    error::Error,
    github::{WorkflowApi, WorkflowRun},
};

/// Turns a downloaded artifact into the bytes of the one file we care about.
pub(crate) trait ArtifactDecoder {
    fn decode(&self, archive: &[u8]) -> Result<Vec<u8>>;
}

/// Actions artifacts are served as zip archives; read a single named entry out of one.
pub(crate) struct ZipEntryDecoder {
    pub(crate) entry: String,
}

impl ArtifactDecoder for ZipEntryDecoder {
    fn decode(&self, archive: &[u8]) -> Result<Vec<u8>> {
        let mut zip =
            zip::ZipArchive::new(Cursor::new(archive)).wrap_err("Opening artifact zip archive")?;

        let mut file = match zip.by_name(&self.entry) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(Error::MissingArchiveEntry(self.entry.clone()))?
            }
            Err(e) => return Err(e).wrap_err_with(|| format!("Reading `{}`", self.entry)),
        };

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .wrap_err_with(|| format!("Decompressing `{}`", self.entry))?;
        Ok(contents)
    }
}

/// Fetch the sole artifact called `name` from `run` and decode it.
///
/// Zero or several artifacts with that name mean the producing workflow is
/// misconfigured; nothing is downloaded in that case.
#[tracing::instrument(skip(api, decoder, run), fields(run_id = run.id))]
pub(crate) async fn fetch_artifact(
    api: &(dyn WorkflowApi + Send + Sync),
    decoder: &(dyn ArtifactDecoder + Send + Sync),
    run: &WorkflowRun,
    name: &str,
) -> Result<Vec<u8>> {
    let artifacts = api.list_artifacts(run.id).await?;
    let mut matching = artifacts.iter().filter(|artifact| artifact.name == name);

    let (Some(artifact), None) = (matching.next(), matching.next()) else {
        return Err(Error::ArtifactCount {
            name: name.to_string(),
            run_id: run.id,
            count: artifacts.iter().filter(|a| a.name == name).count(),
        })?;
    };

    tracing::debug!(artifact_id = artifact.id, "Downloading artifact");
    let archive = api.download_artifact(artifact.id).await?;
    decoder.decode(&archive)
}
