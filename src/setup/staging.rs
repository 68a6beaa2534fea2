//! Collect per-module migration and model files into shared folders.
//!
//! Every directory `<name>` directly under the modules root is a module. Its
//! files live in a `<name>_service` directory anywhere below the root:
//!
//! ```text
//! modules/lease/modules/lease_service/lib/migrations/20160314092724-initial.js
//! modules/lease/modules/lease_service/lib/lease.js
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StagingError + '_ {
    move |source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct StagingLayout {
    pub modules_root: PathBuf,
    pub migrations_target: PathBuf,
    pub models_target: PathBuf,
}

/// Paths of the copied files, in the target folders.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StagedFiles {
    pub migrations: Vec<PathBuf>,
    pub models: Vec<PathBuf>,
}

impl StagingLayout {
    /// Copy every module's migrations and models flat into the target
    /// folders, creating them if needed.
    pub fn stage(&self) -> Result<StagedFiles, StagingError> {
        let migrations = order_migrations(find_migrations(&self.modules_root)?);
        let models = find_models(&self.modules_root)?;

        let staged = StagedFiles {
            migrations: copy_flat(&migrations, &self.migrations_target)?,
            models: copy_flat(&models, &self.models_target)?,
        };
        info!(
            "staged {} migration(s) and {} model(s)",
            staged.migrations.len(),
            staged.models.len()
        );
        Ok(staged)
    }
}

fn module_names(modules_root: &Path) -> Result<Vec<String>, StagingError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(modules_root).map_err(io_err(modules_root))? {
        let entry = entry.map_err(io_err(modules_root))?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn service_dirs<'a>(
    modules_root: &'a Path,
    module: &'a str,
) -> impl Iterator<Item = Result<PathBuf, StagingError>> + 'a {
    let wanted = format!("{}_service", module);
    WalkDir::new(modules_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(e) if e.file_type().is_dir() && e.file_name().to_str() == Some(wanted.as_str()) => {
                Some(Ok(e.into_path()))
            }
            Ok(_) => None,
            Err(err) => Some(Err(StagingError::from(err))),
        })
}

/// Files in `<name>_service/lib/migrations/`, excluding `index.js`.
pub fn find_migrations(modules_root: &Path) -> Result<Vec<PathBuf>, StagingError> {
    let mut found = Vec::new();
    for module in module_names(modules_root)? {
        for service in service_dirs(modules_root, &module) {
            let dir = service?.join("lib").join("migrations");
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
                let path = entry.map_err(io_err(&dir))?.path();
                let is_index = path.file_name().and_then(|n| n.to_str()) == Some("index.js");
                let has_extension = path.extension().is_some();
                if path.is_file() && has_extension && !is_index {
                    found.push(path);
                }
            }
        }
    }
    debug!("found {} migration file(s)", found.len());
    Ok(found)
}

/// The `<name>_service/lib/<name>.js` model of every module.
pub fn find_models(modules_root: &Path) -> Result<Vec<PathBuf>, StagingError> {
    let mut found = Vec::new();
    for module in module_names(modules_root)? {
        for service in service_dirs(modules_root, &module) {
            let model = service?.join("lib").join(format!("{}.js", module));
            if model.is_file() {
                found.push(model);
            }
        }
    }
    debug!("found {} model file(s)", found.len());
    Ok(found)
}

/// Sort migrations by the numeric timestamp before the first `-` of the file
/// stem. Files without a numeric prefix go last, by name.
pub fn order_migrations(mut migrations: Vec<PathBuf>) -> Vec<PathBuf> {
    migrations.sort_by_key(|path| {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        (migration_timestamp(path).unwrap_or(u64::MAX), name)
    });
    migrations
}

fn migration_timestamp(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    stem.split('-').next()?.parse().ok()
}

fn copy_flat(sources: &[PathBuf], target_dir: &Path) -> Result<Vec<PathBuf>, StagingError> {
    fs::create_dir_all(target_dir).map_err(io_err(target_dir))?;
    let mut copied = Vec::with_capacity(sources.len());
    for source in sources {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let target = target_dir.join(file_name);
        fs::copy(source, &target).map_err(io_err(source))?;
        copied.push(target);
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"module.exports = {};").unwrap();
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("modules");
        let lease = root.join("lease/modules/lease_service/lib");
        touch(&lease.join("lease.js"));
        touch(&lease.join("migrations/20160314092724-initial.js"));
        touch(&lease.join("migrations/index.js"));
        let user = root.join("user/user_service/lib");
        touch(&user.join("user.js"));
        touch(&user.join("migrations/20150101000000-users.js"));
        touch(&user.join("migrations/20170101000000-birthday.sql"));
        dir
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_find_migrations_skips_index() {
        let dir = sample_tree();
        let found = order_migrations(find_migrations(&dir.path().join("modules")).unwrap());
        assert_eq!(
            names(&found),
            vec![
                "20150101000000-users.js",
                "20160314092724-initial.js",
                "20170101000000-birthday.sql",
            ]
        );
    }

    #[test]
    fn test_find_models_matches_module_name() {
        let dir = sample_tree();
        let found = find_models(&dir.path().join("modules")).unwrap();
        assert_eq!(names(&found), vec!["lease.js", "user.js"]);
    }

    #[test]
    fn test_order_migrations_numeric_then_unprefixed() {
        let ordered = order_migrations(vec![
            PathBuf::from("a/20160314092724-initial.js"),
            PathBuf::from("b/seed.js"),
            PathBuf::from("c/9-early.js"),
            PathBuf::from("d/20150101000000-users.js"),
        ]);
        assert_eq!(
            names(&ordered),
            vec![
                "9-early.js",
                "20150101000000-users.js",
                "20160314092724-initial.js",
                "seed.js",
            ]
        );
    }

    #[test]
    fn test_stage_copies_into_new_folders() {
        let dir = sample_tree();
        let layout = StagingLayout {
            modules_root: dir.path().join("modules"),
            migrations_target: dir.path().join("db/migrations"),
            models_target: dir.path().join("db/models"),
        };

        let staged = layout.stage().unwrap();
        assert_eq!(staged.migrations.len(), 3);
        assert_eq!(staged.models.len(), 2);
        assert!(dir
            .path()
            .join("db/migrations/20160314092724-initial.js")
            .is_file());
        assert!(dir.path().join("db/models/user.js").is_file());
        assert!(!dir.path().join("db/migrations/index.js").exists());

        // Restaging overwrites in place.
        assert_eq!(layout.stage().unwrap(), staged);
    }

    #[test]
    fn test_missing_modules_root_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = find_migrations(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StagingError::Io { .. }));
    }
}
