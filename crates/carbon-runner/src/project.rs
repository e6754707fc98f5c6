//! Discovery of a project's boundary files.

use crate::config::PipelineConfig;
use crate::{Result, RunError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions accepted as boundary files. Shapefiles are not read.
const BOUNDARY_EXTENSIONS: &[&str] = &["geojson", "json"];

/// The two boundaries of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInputs {
    /// Project identifier.
    pub pid: String,
    /// Activity area boundary file.
    pub activity_area: PathBuf,
    /// Project area boundary file.
    pub project_area: PathBuf,
}

impl ProjectInputs {
    /// Find the boundary files of `pid` under the configured project root.
    ///
    /// Files are sorted by name; the first is the activity area and the second
    /// the project area. Further files are ignored.
    pub fn resolve(config: &PipelineConfig, pid: &str) -> Result<Self> {
        let dir = config.project_dir(pid);
        let files = boundary_files(&dir)?;
        debug!(dir = %dir.display(), count = files.len(), "Found boundary files");

        if files.len() < 2 {
            return Err(RunError::MissingBoundaries {
                dir,
                found: files.len(),
            });
        }

        Ok(Self {
            pid: pid.to_string(),
            activity_area: files[0].clone(),
            project_area: files[1].clone(),
        })
    }
}

fn boundary_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_boundary = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| BOUNDARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_boundary && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(root: &Path) -> PipelineConfig {
        PipelineConfig {
            project_root: root.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_resolve_sorted_by_name() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("1234");
        std::fs::create_dir(&dir).unwrap();
        for name in ["b_project.geojson", "a_activity.geojson", "notes.txt", "c_extra.json"] {
            std::fs::write(dir.join(name), "{}").unwrap();
        }

        let inputs = ProjectInputs::resolve(&config_for(root.path()), "1234").unwrap();
        assert_eq!(inputs.pid, "1234");
        assert_eq!(inputs.activity_area, dir.join("a_activity.geojson"));
        assert_eq!(inputs.project_area, dir.join("b_project.geojson"));
    }

    #[test]
    fn test_resolve_needs_two_boundaries() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("42");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("only.geojson"), "{}").unwrap();

        let err = ProjectInputs::resolve(&config_for(root.path()), "42").unwrap_err();
        assert!(matches!(err, RunError::MissingBoundaries { found: 1, .. }));
    }

    #[test]
    fn test_shapefiles_are_not_boundaries() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("77");
        std::fs::create_dir(&dir).unwrap();
        for name in ["aa.shp", "aa.shx", "aa.dbf", "pa.shp", "pa.shx", "pa.dbf"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let err = ProjectInputs::resolve(&config_for(root.path()), "77").unwrap_err();
        assert!(matches!(err, RunError::MissingBoundaries { found: 0, .. }));
        assert!(err.to_string().contains(".geojson"));
    }

    #[test]
    fn test_resolve_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let err = ProjectInputs::resolve(&config_for(root.path()), "nope").unwrap_err();
        assert!(matches!(err, RunError::Io(_)));
    }
}
