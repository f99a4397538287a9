//! Settings loaded from `cellsync.toml`.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::entities::column::{ColumnDefinition, ColumnSet};
use crate::error::SettingsError;
use crate::usecase::services::table_editor::EditorConfig;

pub const SETTINGS_FILE_NAME: &str = "cellsync.toml";
const DB_FILE_NAME: &str = "cellsync.sqlite";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Rows per fetched page.
    pub page_size: usize,
    pub lazy_loading: bool,
    /// Defaults to the platform's local data directory.
    pub db_path: Option<PathBuf>,
    pub columns: Vec<ColumnDefinition>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: 20,
            lazy_loading: true,
            db_path: None,
            columns: ColumnSet::demo().iter().cloned().collect(),
        }
    }
}

impl Settings {
    /// Loads `path` when given, otherwise the settings file in the user's
    /// config directory, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::load_from(path),
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => Self::load_from(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.page_size == 0 {
            return Err(SettingsError::ZeroPageSize);
        }
        self.column_set().map(|_| ())
    }

    pub fn column_set(&self) -> Result<ColumnSet, SettingsError> {
        Ok(ColumnSet::new(self.columns.clone())?)
    }

    pub fn editor_config(&self) -> EditorConfig {
        EditorConfig {
            page_size: self.page_size,
            lazy_loading: self.lazy_loading,
        }
    }

    pub fn resolve_db_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "cellsync", "cellsync")
}

pub fn default_db_path() -> Result<PathBuf, SettingsError> {
    let dirs = project_dirs().ok_or(SettingsError::NoDataDir)?;
    Ok(dirs.data_local_dir().join(DB_FILE_NAME))
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
}
