//! Provisioning records.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::error::FlowError;
use crate::identity::GeneratedIdentity;

/// Writes one timestamped JSON record per provisioned account.
pub struct RecordWriter {
    dir: PathBuf,
}

impl RecordWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the record, creating the output directory on first use.
    ///
    /// Called only after the portal accepted the account, so a record on
    /// disk always corresponds to a submitted creation.
    pub async fn write(&self, identity: &GeneratedIdentity) -> Result<PathBuf, FlowError> {
        fs::create_dir_all(&self.dir).await?;

        let filename = format!("user_{}.json", identity.created_at.format("%Y%m%d_%H%M%S"));
        let path = self.dir.join(filename);
        let json = serde_json::to_string_pretty(identity)?;
        fs::write(&path, json).await?;

        info!(path = %path.display(), email = %identity.email, "provisioning record written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityGenerator;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_directory_and_record() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("records");
        let writer = RecordWriter::new(&out);

        let identity = IdentityGenerator::new().generate("corp.example");
        let path = writer.write(&identity).await.unwrap();

        assert!(path.exists());
        assert_eq!(path.parent().unwrap(), out);
    }

    #[tokio::test]
    async fn test_filename_is_timestamped() {
        let dir = TempDir::new().unwrap();
        let writer = RecordWriter::new(dir.path());

        let identity = IdentityGenerator::new().generate("corp.example");
        let path = writer.write(&identity).await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy();
        let pattern = regex::Regex::new(r"^user_\d{8}_\d{6}\.json$").unwrap();
        assert!(pattern.is_match(&name), "unexpected filename: {name}");
    }

    #[tokio::test]
    async fn test_record_content_round_trips() {
        let dir = TempDir::new().unwrap();
        let writer = RecordWriter::new(dir.path());

        let identity = IdentityGenerator::new().generate("corp.example");
        let path = writer.write(&identity).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let back: GeneratedIdentity = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.email, identity.email);
        assert_eq!(back.password, identity.password);
        assert_eq!(back.first_name, identity.first_name);
    }
}
