use crate::reconcile::{ResolutionOverride, DEFAULT_ROM_EXTENSION};
use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

const APP_DIR: &str = "rom-viewport-sync";
const LOG_FILE: &str = "viewport-sync.log";

/// One emulator system to process: a catalog, the ROMs it describes and
/// where their configs live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    pub name: String,
    pub dat: PathBuf,
    pub roms: PathBuf,
    #[serde(default)]
    pub export: Option<PathBuf>,
    #[serde(default, rename = "override")]
    pub overrides: Option<ResolutionOverride>,
    #[serde(default = "default_rom_extension")]
    pub rom_extension: String,
}

impl Job {
    pub fn new(name: impl Into<String>, dat: PathBuf, roms: PathBuf) -> Self {
        Self {
            name: name.into(),
            dat,
            roms,
            export: None,
            overrides: None,
            rom_extension: default_rom_extension(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        self.export.as_deref().unwrap_or(&self.roms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.dat.exists() {
            bail!("DAT file not found for {}: {}", self.name, self.dat.display());
        }
        if !self.roms.is_dir() {
            bail!("ROM folder not found for {}: {}", self.name, self.roms.display());
        }
        if let Some(overrides) = &self.overrides {
            overrides
                .validate()
                .with_context(|| format!("invalid override for {}", self.name))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read job file {}", path.display()))?;
        let file: JobFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse job file {}", path.display()))?;
        if file.jobs.is_empty() {
            bail!("job file {} lists no jobs", path.display());
        }
        Ok(file)
    }
}

fn default_rom_extension() -> String {
    DEFAULT_ROM_EXTENSION.to_string()
}

pub fn data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join(APP_DIR))
}

/// Location of the append-only run log, creating its directory.
pub fn log_path() -> Result<PathBuf> {
    let dir = data_dir()?;
    fs::create_dir_all(&dir).context("create app data dir")?;
    Ok(dir.join(LOG_FILE))
}
