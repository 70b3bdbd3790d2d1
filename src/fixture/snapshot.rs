use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{SNAPSHOT_EXTENSION, SNAPSHOT_PREFIX};
use crate::db::connection::mask_url_password;
use crate::error::Result;

/// Snapshot bound to one fixture database.
///
/// Both the snapshot database name and the manifest path are derived from the fixture
/// database name alone, so a later run can find and remove leftovers of an aborted one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub database_name: String,
    pub file_path: PathBuf,
}

/// Contents of the file at [`Snapshot::file_path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub name: String,
    pub database: String,
    /// Server URL with the password masked
    pub server: String,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Snapshot whose manifest lives in the system temp directory.
    pub fn for_database(database_name: &str) -> Self {
        Self::in_directory(database_name, std::env::temp_dir())
    }

    pub fn in_directory(database_name: &str, directory: impl AsRef<Path>) -> Self {
        let name = snapshot_name(database_name);
        let file_path = directory
            .as_ref()
            .join(format!("{}.{}", name, SNAPSHOT_EXTENSION));

        Self {
            name,
            database_name: database_name.to_string(),
            file_path,
        }
    }

    pub fn write_manifest(&self, server_url: &str) -> Result<()> {
        let manifest = SnapshotManifest {
            name: self.name.clone(),
            database: self.database_name.clone(),
            server: mask_url_password(server_url),
            created_at: Utc::now(),
        };
        std::fs::write(&self.file_path, serde_json::to_vec_pretty(&manifest)?)?;
        debug!("Wrote snapshot manifest {}", self.file_path.display());
        Ok(())
    }

    pub fn read_manifest(&self) -> Result<Option<SnapshotManifest>> {
        match std::fs::read(&self.file_path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the manifest; a missing file is not an error.
    pub fn remove_manifest(&self) -> Result<()> {
        match std::fs::remove_file(&self.file_path) {
            Ok(()) => {
                debug!("Removed snapshot manifest {}", self.file_path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn snapshot_name(database_name: &str) -> String {
    format!("{}{}", SNAPSHOT_PREFIX, database_name)
}
