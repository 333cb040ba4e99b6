//! JSON config store - One app definition per file in the apps directory

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::{AppDefinition, AppRecord, ConfigError, DayOfWeek};

const CONFIG_EXTENSION: &str = "json";

/// Reads and writes `<apps_dir>/<id>.json` app configs
#[derive(Debug, Clone)]
pub struct ConfigStore {
    apps_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(apps_dir: impl Into<PathBuf>) -> Self {
        Self {
            apps_dir: apps_dir.into(),
        }
    }

    pub fn apps_dir(&self) -> &Path {
        &self.apps_dir
    }

    /// Config file path for an app id
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.apps_dir.join(format!("{}.{}", id, CONFIG_EXTENSION))
    }

    /// Ids of every `*.json` file in the apps directory
    pub fn list_ids(&self) -> Result<BTreeSet<String>, ConfigError> {
        self.ensure_dir()?;

        let entries = fs::read_dir(&self.apps_dir).map_err(|source| ConfigError::Io {
            path: self.apps_dir.clone(),
            source,
        })?;

        let ids = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(CONFIG_EXTENSION))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();

        Ok(ids)
    }

    /// Read the raw record for an app
    pub fn load_record(&self, id: &str) -> Result<AppRecord, ConfigError> {
        let path = self.path_for(id);
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Malformed { path, source })
    }

    /// Load and validate an app definition
    pub fn load(&self, id: &str) -> Result<AppDefinition, ConfigError> {
        let record = self.load_record(id)?;
        let def = AppDefinition::from_record(id, record)?;
        debug!("Loaded config '{}'", id);
        Ok(def)
    }

    /// Write a record, replacing any existing file
    pub fn save(&self, id: &str, record: &AppRecord) -> Result<(), ConfigError> {
        self.ensure_dir()?;
        let path = self.path_for(id);
        let json = to_json(&path, record)?;
        fs::write(&path, json).map_err(|source| ConfigError::Io { path, source })
    }

    /// Create a config for a new app and return its id.
    ///
    /// The id is the name without whitespace, lowercased. An existing file
    /// for that id is never overwritten.
    pub fn create(
        &self,
        name: &str,
        program: &Path,
        days: &[DayOfWeek],
    ) -> Result<String, ConfigError> {
        let id = id_for_name(name);
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(ConfigError::InvalidName(name.to_string()));
        }
        if !program.exists() {
            return Err(ConfigError::ProgramNotFound(program.to_path_buf()));
        }

        self.ensure_dir()?;
        let path = self.path_for(&id);
        let record = AppRecord::new(name, program, days);
        let json = to_json(&path, &record)?;

        write_new(&path, name, |file| file.write_all(json.as_bytes()))?;

        info!("Created config {:?}", path);
        Ok(id)
    }

    fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.apps_dir).map_err(|source| ConfigError::Io {
            path: self.apps_dir.clone(),
            source,
        })
    }
}

/// Config id derived from a display name
pub fn id_for_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Create `path`, which must not exist yet, and fill it. A file that could
/// not be filled is removed again so the name stays free.
fn write_new(
    path: &Path,
    name: &str,
    fill: impl FnOnce(&mut File) -> io::Result<()>,
) -> Result<(), ConfigError> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(ConfigError::NameTaken(name.to_string()));
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if let Err(source) = fill(&mut file) {
        drop(file);
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove incomplete config {:?}: {}", path, e);
        }
        return Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn to_json(path: &Path, record: &AppRecord) -> Result<String, ConfigError> {
    serde_json::to_string_pretty(record).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}
