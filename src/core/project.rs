//! Project discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::RecordPrefix;

/// Represents a CMT project
#[derive(Debug)]
pub struct Project {
    /// Root directory of the project (parent of .cmt/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current =
            std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            let cmt_dir = current.join(".cmt");
            if cmt_dir.is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let cmt_dir = root.join(".cmt");
        if cmt_dir.exists() {
            return Err(ProjectError::AlreadyExists(root.clone()));
        }

        Self::write_structure(&root)?;
        Ok(Self { root })
    }

    /// Force initialization even if .cmt/ exists
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::write_structure(&root)?;
        Ok(Self { root })
    }

    fn write_structure(root: &Path) -> Result<(), ProjectError> {
        let cmt_dir = root.join(".cmt");
        std::fs::create_dir_all(&cmt_dir).map_err(|e| ProjectError::IoError(e.to_string()))?;

        let config_path = cmt_dir.join("config.yaml");
        std::fs::write(&config_path, Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        for prefix in [
            RecordPrefix::Equipment,
            RecordPrefix::Calibration,
            RecordPrefix::Budget,
        ] {
            std::fs::create_dir_all(root.join(Self::collection_directory(prefix)))
                .map_err(|e| ProjectError::IoError(e.to_string()))?;
        }

        Ok(())
    }

    fn default_config() -> &'static str {
        r#"# CMT Project Configuration

# Default technician stamped on new calibration records
# (falls back to `git config user.name`, then $USER)
# author: ""

# Editor to use for `cmt equip edit` (default: $EDITOR)
# editor: ""

# External command that receives the analysis prompt on stdin and
# prints the narrative text on stdout
# analysis_command: ""

# Default output format (auto, yaml, tsv, json, csv, id)
# default_format: auto
"#
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .cmt configuration directory
    pub fn cmt_dir(&self) -> PathBuf {
        self.root.join(".cmt")
    }

    /// Get the directory for a given record prefix
    pub fn collection_directory(prefix: RecordPrefix) -> &'static str {
        match prefix {
            RecordPrefix::Equipment => "equipment",
            RecordPrefix::Calibration => "calibrations",
            RecordPrefix::Budget => "budgets",
        }
    }

    pub fn collection_dir(&self, prefix: RecordPrefix) -> PathBuf {
        self.root.join(Self::collection_directory(prefix))
    }

    /// Get the file path for a record
    pub fn record_path(&self, prefix: RecordPrefix, id: &str) -> PathBuf {
        self.collection_dir(prefix).join(format!("{}.cmt.yaml", id))
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not a CMT project (searched from {searched_from:?}). Run 'cmt init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("CMT project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        assert!(project.cmt_dir().exists());
        assert!(project.cmt_dir().join("config.yaml").exists());
        assert!(project.root().join("equipment").is_dir());
        assert!(project.root().join("calibrations").is_dir());
        assert!(project.root().join("budgets").is_dir());
    }

    #[test]
    fn test_project_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let err = Project::init(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
    }

    #[test]
    fn test_project_discover_finds_cmt_dir() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("some/nested/dir");
        std::fs::create_dir_all(&subdir).unwrap();

        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(
            project.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_project_discover_fails_without_cmt_dir() {
        let tmp = tempdir().unwrap();
        let err = Project::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }

    #[test]
    fn test_record_path_layout() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        let path = project.record_path(RecordPrefix::Equipment, "MAN-003");
        assert!(path.ends_with("equipment/MAN-003.cmt.yaml"));
    }
}
