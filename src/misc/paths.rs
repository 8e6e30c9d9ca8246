use std::path::{Path, PathBuf};

use anyhow::Result;

/// Utility struct for generating paths inside the data directory
#[derive(Debug, Clone)]
pub struct RecordsPath {
    records_dir: PathBuf,
}

impl RecordsPath {
    pub fn new(path: PathBuf) -> Self {
        Self { records_dir: path }
    }

    pub fn ensure_exists_blocking(&self) -> Result<()> {
        if self.records_dir.exists() {
            if !self.records_dir.canonicalize()?.is_dir() {
                error!("data directory path already exists, and is a file!");
                bail!("data dir exists");
            }
        } else {
            info!("Creating new data directory at {:?}", self.records_dir);
            std::fs::create_dir_all(&self.records_dir)?;
        }
        Ok(())
    }

    /// Returns the path of `filename` inside the data directory.
    /// does not allow for nesting in subdirectories, only the last component is used
    ///
    /// # Errors
    /// - if `filename` does not have a final (file) component, eg the path `foo/..` or `/`
    pub fn path<P: AsRef<Path>>(&self, filename: P) -> Result<PathBuf> {
        let p = filename.as_ref();
        if p.parent().is_some() && p.parent() != Some(Path::new("")) {
            warn!(path=?p, "RecordsPath::path only uses the last segment of a path, the rest will be discarded");
        }
        match p.file_name() {
            Some(file) => Ok(self.records_dir.join(file)),
            None => bail!("{p:?} does not name a file"),
        }
    }
}
