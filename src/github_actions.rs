use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("Failure opening {0:?}: {1}")]
    OpenFile(PathBuf, std::io::Error),

    #[error("Writing to {0:?}: {1}")]
    WriteFile(PathBuf, std::io::Error),
}

/// The `GITHUB_STEP_SUMMARY` file, opened once in append mode for the life of the step.
#[derive(Debug)]
pub(crate) struct StepSummary {
    path: PathBuf,
    fh: tokio::fs::File,
}

impl StepSummary {
    pub(crate) async fn open(path: &Path) -> Result<Self, Error> {
        let fh = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::OpenFile(path.to_path_buf(), e))?;

        Ok(Self {
            path: path.to_path_buf(),
            fh,
        })
    }

    pub(crate) async fn append(&mut self, markdown: &str) -> Result<(), Error> {
        self.fh
            .write_all(markdown.as_bytes())
            .await
            .map_err(|e| Error::WriteFile(self.path.clone(), e))?;
        self.fh
            .flush()
            .await
            .map_err(|e| Error::WriteFile(self.path.clone(), e))?;

        Ok(())
    }
}
