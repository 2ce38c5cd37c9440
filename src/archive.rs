use crate::{
    log::LogSink,
    reconcile::{list_files, Progress},
};
use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use time::{macros::format_description, OffsetDateTime};
use zip::{result::ZipError, write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    pub archive: Option<PathBuf>,
    pub files: usize,
    pub error: Option<String>,
}

impl BackupOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    fn log_summary(&self, log: &dyn LogSink) {
        if let Some(archive) = &self.archive {
            log.info(&format!("Backup created: {}", archive.display()));
        }
        log.info(&format!("Backed up {} config files", self.files));
    }

    fn failed(message: String, log: &dyn LogSink) -> Self {
        log.error(&message);
        Self {
            archive: None,
            files: 0,
            error: Some(message),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub restored: usize,
    pub skipped: usize,
    pub error: Option<String>,
}

impl RestoreOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

fn is_config_name(name: &str) -> bool {
    name.ends_with(".cfg")
}

/// Sortable `YYYYMMDD_HHMMSS` stamp in local time, UTC when the offset
/// cannot be determined.
pub fn backup_timestamp(now: OffsetDateTime) -> String {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    now.format(format).unwrap_or_else(|_| {
        format!(
            "{:04}{:02}{:02}_{:02}{:02}{:02}",
            now.year(),
            now.month() as u8,
            now.day(),
            now.hour(),
            now.minute(),
            now.second()
        )
    })
}

pub fn default_backup_path(folder: &Path) -> PathBuf {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    folder.join(format!("config_backup_{}.zip", backup_timestamp(now)))
}

/// Zips every `.cfg` file in `folder` into `destination` (or a timestamped
/// archive inside `folder`). Members carry only their file name.
pub fn backup(folder: &Path, destination: Option<&Path>, log: &dyn LogSink) -> BackupOutcome {
    if !folder.is_dir() {
        return BackupOutcome::failed(
            format!("Config folder not found: {}", folder.display()),
            log,
        );
    }

    let configs: Vec<PathBuf> = list_files(folder)
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_config_name)
        })
        .collect();
    if configs.is_empty() {
        return BackupOutcome::failed("No config files found to backup".to_string(), log);
    }

    let archive = destination
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_backup_path(folder));

    match write_archive(&archive, &configs) {
        Ok(()) => {
            let outcome = BackupOutcome {
                archive: Some(archive),
                files: configs.len(),
                error: None,
            };
            outcome.log_summary(log);
            outcome
        }
        Err(err) => {
            let _ = fs::remove_file(&archive);
            BackupOutcome::failed(format!("Backup failed: {err:#}"), log)
        }
    }
}

fn write_archive(archive: &Path, configs: &[PathBuf]) -> Result<()> {
    if let Some(parent) = archive.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("create backup dir")?;
    }
    let file = File::create(archive)
        .with_context(|| format!("create archive {}", archive.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in configs {
        let name = path
            .file_name()
            .context("config filename")?
            .to_string_lossy()
            .into_owned();
        writer
            .start_file(name, options)
            .with_context(|| format!("add {} to archive", path.display()))?;
        let mut source =
            File::open(path).with_context(|| format!("open config {}", path.display()))?;
        io::copy(&mut source, &mut writer)
            .with_context(|| format!("compress config {}", path.display()))?;
    }
    writer.finish().context("finalize archive")?;
    Ok(())
}

/// Extracts `.cfg` members of `archive` into `folder`. Existing files are
/// replaced when `overwrite` is set and counted as skipped otherwise.
pub fn restore(
    folder: &Path,
    archive: &Path,
    overwrite: bool,
    mut progress: Option<Progress<'_>>,
    log: &dyn LogSink,
) -> RestoreOutcome {
    let mut outcome = RestoreOutcome::default();
    let fail = |mut outcome: RestoreOutcome, message: String| {
        log.error(&message);
        outcome.error = Some(message);
        outcome
    };

    if !folder.is_dir() {
        return fail(
            outcome,
            format!("Config folder not found: {}", folder.display()),
        );
    }
    if !archive.is_file() {
        return fail(
            outcome,
            format!("Backup file not found: {}", archive.display()),
        );
    }

    let mut zip = match File::open(archive)
        .map_err(ZipError::Io)
        .and_then(ZipArchive::new)
    {
        Ok(zip) => zip,
        Err(ZipError::Io(err)) => return fail(outcome, format!("Restore failed: {err}")),
        Err(_) => {
            return fail(
                outcome,
                "Invalid backup file (not a valid zip archive)".to_string(),
            )
        }
    };

    let members = config_members(&mut zip);
    if members.is_empty() {
        return fail(outcome, "No config files found in backup".to_string());
    }

    let total = members.len();
    for (position, (index, name)) in members.iter().enumerate() {
        let target = folder.join(name);
        if target.exists() && !overwrite {
            log.info(&format!("Skipped {name} (already exists)"));
            outcome.skipped += 1;
        } else if let Err(err) = extract_member(&mut zip, *index, &target) {
            return fail(outcome, format!("Restore failed: {err:#}"));
        } else {
            log.info(&format!("Restored {name}"));
            outcome.restored += 1;
        }
        if let Some(progress) = progress.as_mut() {
            progress(position + 1, total, name.as_str());
        }
    }

    log.info("Restore complete:");
    log.info(&format!("  Restored: {}", outcome.restored));
    log.info(&format!("  Skipped: {}", outcome.skipped));
    outcome
}

/// `(index, file name)` of every config member, flattened to its base name.
fn config_members(zip: &mut ZipArchive<File>) -> Vec<(usize, String)> {
    let mut members = Vec::new();
    for index in 0..zip.len() {
        let Ok(entry) = zip.by_index(index) else {
            continue;
        };
        if entry.is_dir() {
            continue;
        }
        let Some(path) = entry.enclosed_name() else {
            continue;
        };
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if is_config_name(name) {
            members.push((index, name.to_string()));
        }
    }
    members
}

fn extract_member(zip: &mut ZipArchive<File>, index: usize, target: &Path) -> Result<()> {
    let mut entry = zip.by_index(index).context("read archive member")?;
    let mut out =
        File::create(target).with_context(|| format!("create {}", target.display()))?;
    io::copy(&mut entry, &mut out).with_context(|| format!("extract {}", target.display()))?;
    Ok(())
}
