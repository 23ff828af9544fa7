use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};

pub const DATA_DIR_NAME: &str = ".wachat";
pub const DATABASE_FILE_NAME: &str = "wachat.sqlite";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub home_dir: PathBuf,
    pub cwd: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl RuntimePaths {
    /// Payload directory for `ingest`/`serve`: the override resolved like the
    /// other paths, or the working directory.
    pub fn payload_dir(&self, override_path: Option<&Path>) -> Result<PathBuf> {
        match override_path {
            Some(path) => resolve_user_path(path, &self.home_dir, &self.cwd),
            None => Ok(self.cwd.clone()),
        }
    }
}

pub fn resolve_runtime_paths(
    home_dir: &Path,
    cwd: &Path,
    data_dir_override: Option<&Path>,
    database_path_override: Option<&Path>,
) -> Result<RuntimePaths> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    if !cwd.is_absolute() {
        bail!("cwd must be absolute: {}", cwd.display());
    }

    let home_dir = normalize_lexical(home_dir);
    let cwd = normalize_lexical(cwd);
    let data_dir = match data_dir_override {
        Some(path) => resolve_user_path(path, &home_dir, &cwd)?,
        None => home_dir.join(DATA_DIR_NAME).join("data"),
    };
    let database_path = match database_path_override {
        Some(path) => resolve_user_path(path, &home_dir, &cwd)?,
        None => data_dir.join(DATABASE_FILE_NAME),
    };

    Ok(RuntimePaths {
        home_dir,
        cwd,
        data_dir: normalize_lexical(&data_dir),
        database_path: normalize_lexical(&database_path),
    })
}

fn resolve_user_path(path: &Path, home_dir: &Path, cwd: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(path, home_dir)?;
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    Ok(normalize_lexical(&resolved))
}

fn expand_tilde(path: &Path, home_dir: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            Ok(expanded)
        }
        Some(Component::Normal(first))
            if first
                .to_str()
                .is_some_and(|segment| segment.starts_with('~')) =>
        {
            bail!(
                "unsupported home expansion syntax (only `~` and `~/...` are supported): {}",
                path.display()
            )
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }

    normalized
}
