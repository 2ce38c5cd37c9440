use crate::{
    catalog::Catalog,
    cfg_file::{
        ConfigRecord, ASPECT_RATIO_INDEX, CUSTOM_ASPECT_RATIO, VIEWPORT_HEIGHT, VIEWPORT_WIDTH,
        VIEWPORT_X, VIEWPORT_Y,
    },
    log::LogSink,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub const DEFAULT_ROM_EXTENSION: &str = "zip";

/// Caller-supplied viewport values. Width and height replace catalog
/// values independently; x and y default to 0 when written.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolutionOverride {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
}

impl ResolutionOverride {
    /// Parses `WIDTH HEIGHT [X Y]`.
    pub fn from_args(values: &[String]) -> Result<Self> {
        if values.len() != 2 && values.len() != 4 {
            bail!("override requires 2 or 4 values (WIDTH HEIGHT [X Y])");
        }
        let dimension = |value: &String| -> Result<u32> {
            value
                .parse::<u32>()
                .with_context(|| format!("invalid override dimension: {value}"))
        };
        let position = |value: &String| -> Result<i32> {
            value
                .parse::<i32>()
                .with_context(|| format!("invalid override position: {value}"))
        };
        let overrides = Self {
            width: Some(dimension(&values[0])?),
            height: Some(dimension(&values[1])?),
            x: values.get(2).map(position).transpose()?,
            y: values.get(3).map(position).transpose()?,
        };
        overrides.validate()?;
        Ok(overrides)
    }

    /// Dimensions, when given, must be positive like catalog dimensions.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [("width", self.width), ("height", self.height)] {
            if value == Some(0) {
                bail!("override {label} must be a positive integer");
            }
        }
        Ok(())
    }
}

/// Override dimensions win over the catalog, each one on its own.
pub fn effective_resolution(catalog: (u32, u32), overrides: &ResolutionOverride) -> (u32, u32) {
    (
        overrides.width.unwrap_or(catalog.0),
        overrides.height.unwrap_or(catalog.1),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    TargetMissing,
    NoOverrides,
    Removed { now_empty: bool, deleted: bool },
}

/// Counts returned by the batch operations. For removal, `processed`
/// counts targets that had overrides stripped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// `(current, total, identifier)`, called once per item after it is handled.
pub type Progress<'p> = &'p mut dyn FnMut(usize, usize, &str);

pub struct Reconciler<'a> {
    config_dir: PathBuf,
    rom_dir: Option<PathBuf>,
    rom_extension: String,
    overrides: ResolutionOverride,
    log: &'a dyn LogSink,
}

impl<'a> Reconciler<'a> {
    pub fn new(config_dir: impl Into<PathBuf>, log: &'a dyn LogSink) -> Self {
        Self {
            config_dir: config_dir.into(),
            rom_dir: None,
            rom_extension: DEFAULT_ROM_EXTENSION.to_string(),
            overrides: ResolutionOverride::default(),
            log,
        }
    }

    /// ROM folder as source of identifiers; configs go to `export` when
    /// given, else next to the ROMs.
    pub fn for_roms(rom_dir: &Path, export: Option<&Path>, log: &'a dyn LogSink) -> Self {
        let mut reconciler = Self::new(export.unwrap_or(rom_dir), log);
        reconciler.rom_dir = Some(rom_dir.to_path_buf());
        reconciler
    }

    pub fn with_override(mut self, overrides: ResolutionOverride) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_rom_extension(mut self, extension: &str) -> Self {
        self.rom_extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn config_path(&self, rom_name: &str) -> PathBuf {
        self.config_dir
            .join(format!("{rom_name}.{}.cfg", self.rom_extension))
    }

    fn rom_label(&self, rom_name: &str) -> String {
        format!("{rom_name}.{}", self.rom_extension)
    }

    pub fn apply_override(
        &self,
        rom_name: &str,
        width: u32,
        height: u32,
        x: Option<i32>,
        y: Option<i32>,
    ) -> Result<()> {
        let path = self.config_path(rom_name);
        let existed = path.exists();
        let mut record = ConfigRecord::load(&path)?;

        record.set_quoted(VIEWPORT_WIDTH, width);
        record.set_quoted(VIEWPORT_HEIGHT, height);
        record.set_quoted(VIEWPORT_X, x.unwrap_or(0));
        record.set_quoted(VIEWPORT_Y, y.unwrap_or(0));
        record.set_quoted(ASPECT_RATIO_INDEX, CUSTOM_ASPECT_RATIO);
        record.save(&path)?;

        let action = if existed { "Updated" } else { "Created" };
        let mut message = format!(
            "{action} config for {}: {width}x{height}",
            self.rom_label(rom_name)
        );
        if x.is_some() || y.is_some() {
            message.push_str(&format!(" at ({}, {})", x.unwrap_or(0), y.unwrap_or(0)));
        }
        self.log.info(&message);
        Ok(())
    }

    pub fn remove_override(&self, rom_name: &str, delete_if_empty: bool) -> Result<RemoveOutcome> {
        let path = self.config_path(rom_name);
        let label = self.rom_label(rom_name);
        if !path.exists() {
            self.log.info(&format!("No config file found for {label}"));
            return Ok(RemoveOutcome::TargetMissing);
        }

        let mut record = ConfigRecord::load(&path)?;
        if !record.strip_viewport() {
            self.log
                .info(&format!("No viewport overrides found in config for {label}"));
            return Ok(RemoveOutcome::NoOverrides);
        }

        let now_empty = record.is_empty();
        let deleted = now_empty && delete_if_empty;
        if deleted {
            fs::remove_file(&path)
                .with_context(|| format!("delete config {}", path.display()))?;
            self.log.info(&format!(
                "Removed config file for {label} (was empty after removing overrides)"
            ));
        } else {
            record.save(&path)?;
            if now_empty {
                self.log.info(&format!(
                    "Config for {label} is now empty after removing overrides"
                ));
            } else {
                self.log
                    .info(&format!("Removed viewport overrides from {label} config"));
            }
        }
        Ok(RemoveOutcome::Removed { now_empty, deleted })
    }

    /// Deletes the target only when it exists and holds no settings.
    pub fn delete_empty_config(&self, rom_name: &str) -> Result<bool> {
        let path = self.config_path(rom_name);
        if !path.exists() || !ConfigRecord::load(&path)?.is_empty() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("delete config {}", path.display()))?;
        self.log.info(&format!(
            "Deleted empty config file: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        Ok(true)
    }

    /// Identifiers of the ROM archives in the ROM folder, sorted.
    pub fn rom_identifiers(&self) -> Vec<String> {
        let Some(rom_dir) = self.rom_dir.as_deref().filter(|dir| dir.is_dir()) else {
            self.log.warn(&format!(
                "ROM folder not found: {}",
                self.rom_dir.as_deref().unwrap_or(Path::new("")).display()
            ));
            return Vec::new();
        };

        let names: Vec<String> = list_files(rom_dir)
            .into_iter()
            .filter_map(|path| {
                let extension = path.extension()?.to_str()?;
                if extension != self.rom_extension {
                    return None;
                }
                Some(path.file_stem()?.to_string_lossy().into_owned())
            })
            .collect();
        self.log.info(&format!(
            "Found {} ROM files in {}",
            names.len(),
            rom_dir.display()
        ));
        names
    }

    pub fn process_all(
        &self,
        catalog: &Catalog,
        rom_names: &[String],
        mut progress: Option<Progress<'_>>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let total = rom_names.len();

        for (index, rom_name) in rom_names.iter().enumerate() {
            match catalog.resolution(rom_name) {
                Some(resolution) => {
                    let (width, height) = effective_resolution(resolution, &self.overrides);
                    match self.apply_override(
                        rom_name,
                        width,
                        height,
                        self.overrides.x,
                        self.overrides.y,
                    ) {
                        Ok(()) => summary.processed += 1,
                        Err(err) => {
                            self.log.error(&format!(
                                "Failed to update {}: {err:#}",
                                self.rom_label(rom_name)
                            ));
                            summary.failed += 1;
                        }
                    }
                }
                None => {
                    self.log.info(&format!(
                        "Skipped {}: No resolution data in DAT file",
                        self.rom_label(rom_name)
                    ));
                    summary.skipped += 1;
                }
            }
            if let Some(progress) = progress.as_mut() {
                progress(index + 1, total, rom_name.as_str());
            }
        }

        self.log.info("Processing complete:");
        self.log.info(&format!("  Processed: {}", summary.processed));
        self.log.info(&format!("  Skipped: {}", summary.skipped));
        if summary.failed > 0 {
            self.log.info(&format!("  Failed: {}", summary.failed));
        }
        summary
    }

    /// Strips overrides from every config target in the folder, including
    /// targets whose ROM is gone. Targets left empty are deleted.
    pub fn remove_all_overrides(&self, mut progress: Option<Progress<'_>>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        if !self.config_dir.is_dir() {
            self.log.warn(&format!(
                "Output folder not found: {}",
                self.config_dir.display()
            ));
            return summary;
        }

        let targets = self.config_targets();
        self.log.info(&format!(
            "Found {} config files in {}",
            targets.len(),
            self.config_dir.display()
        ));
        let total = targets.len();

        for (index, (rom_name, path)) in targets.iter().enumerate() {
            match self.strip_target(path) {
                Ok(true) => summary.processed += 1,
                Ok(false) => summary.skipped += 1,
                Err(err) => {
                    self.log.error(&format!(
                        "Failed to clean {}: {err:#}",
                        path.display()
                    ));
                    summary.failed += 1;
                }
            }
            if let Some(progress) = progress.as_mut() {
                progress(index + 1, total, rom_name.as_str());
            }
        }

        self.log.info("Removal complete:");
        self.log.info(&format!("  Removed: {}", summary.processed));
        self.log.info(&format!("  Skipped: {}", summary.skipped));
        if summary.failed > 0 {
            self.log.info(&format!("  Failed: {}", summary.failed));
        }
        summary
    }

    fn strip_target(&self, path: &Path) -> Result<bool> {
        let mut record = ConfigRecord::load(path)?;
        if !record.strip_viewport() {
            return Ok(false);
        }
        let file_name = path.file_name().unwrap_or_default().to_string_lossy();
        if record.is_empty() {
            fs::remove_file(path).with_context(|| format!("delete config {}", path.display()))?;
            self.log.info(&format!(
                "Removed {file_name} (was empty after removing overrides)"
            ));
        } else {
            record.save(path)?;
            self.log
                .info(&format!("Removed viewport overrides from {file_name}"));
        }
        Ok(true)
    }

    fn config_targets(&self) -> Vec<(String, PathBuf)> {
        let suffix = format!(".{}.cfg", self.rom_extension);
        list_files(&self.config_dir)
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let rom_name = name.strip_suffix(&suffix)?.to_string();
                Some((rom_name, path))
            })
            .collect()
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
