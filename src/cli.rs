use crate::{
    archive,
    catalog::{Catalog, GameInfo, CATALOG_SOURCES},
    cfg_file::{ConfigRecord, VIEWPORT_HEIGHT, VIEWPORT_WIDTH},
    log::{FileSink, LogSink, NullSink, StdoutSink, TeeSink},
    reconcile::{BatchSummary, Reconciler, RemoveOutcome, ResolutionOverride},
    settings::{self, Job, JobFile},
};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

const RULE: &str = "======================================================================";

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Apply(Vec<Job>),
    Remove(RemoveOptions),
    Backup {
        folder: PathBuf,
        out: Option<PathBuf>,
    },
    Restore {
        folder: PathBuf,
        archive: PathBuf,
        overwrite: bool,
    },
    Browse(BrowseOptions),
    Sources,
    Help,
    Version,
}

#[derive(Debug, PartialEq, Eq)]
struct RemoveOptions {
    folder: PathBuf,
    rom: Option<String>,
    keep_empty: bool,
    rom_extension: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct BrowseOptions {
    dat: PathBuf,
    folder: Option<PathBuf>,
    filter: Option<String>,
    rom_extension: Option<String>,
    roms: Vec<String>,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let quiet = args.iter().any(|arg| arg == "-q" || arg == "--quiet");
    let args: Vec<String> = args
        .into_iter()
        .filter(|arg| arg != "-q" && arg != "--quiet")
        .collect();
    let command = parse_args(&args)?;

    let file_sink = settings::log_path().ok().map(FileSink::new);
    let sink: Box<dyn LogSink> = match (quiet, file_sink) {
        (false, Some(file)) => Box::new(TeeSink::new(StdoutSink, file)),
        (false, None) => Box::new(StdoutSink),
        (true, Some(file)) => Box::new(file),
        (true, None) => Box::new(NullSink),
    };
    run_command(command, &*sink)
}

fn run_command(command: CliCommand, log: &dyn LogSink) -> Result<()> {
    match command {
        CliCommand::Apply(jobs) => run_jobs(&jobs, log),
        CliCommand::Remove(options) => run_remove(options, log),
        CliCommand::Backup { folder, out } => {
            let outcome = archive::backup(&folder, out.as_deref(), log);
            if !outcome.success() {
                bail!(outcome.error.unwrap_or_default());
            }
            Ok(())
        }
        CliCommand::Restore {
            folder,
            archive,
            overwrite,
        } => {
            let outcome = archive::restore(&folder, &archive, overwrite, None, log);
            if !outcome.success() {
                bail!(outcome.error.unwrap_or_default());
            }
            Ok(())
        }
        CliCommand::Browse(options) => {
            let catalog = Catalog::parse(&options.dat, log)?;
            for line in browse_lines(&catalog, &options)? {
                println!("{line}");
            }
            Ok(())
        }
        CliCommand::Sources => {
            for source in CATALOG_SOURCES {
                println!("{:<20} {:<18} {}", source.name, source.filename, source.url);
            }
            Ok(())
        }
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("viewport-sync v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_jobs(jobs: &[Job], log: &dyn LogSink) -> Result<()> {
    for job in jobs {
        job.validate()?;
    }

    let mut results: Vec<(String, BatchSummary)> = Vec::new();
    for job in jobs {
        log.info(RULE);
        log.info(&format!("Processing: {}", job.name));
        log.info(RULE);
        let summary = match run_job(job, log) {
            Ok(summary) => summary,
            Err(err) => {
                log.error(&format!("Error processing {}: {err:#}", job.name));
                BatchSummary::default()
            }
        };
        results.push((job.name.clone(), summary));
    }

    log.info(RULE);
    log.info("SUMMARY");
    log.info(RULE);
    let mut total = BatchSummary::default();
    for (name, summary) in &results {
        log.info(&format!("{name}:"));
        log.info(&format!("  Processed: {}", summary.processed));
        log.info(&format!("  Skipped: {}", summary.skipped));
        total.processed += summary.processed;
        total.skipped += summary.skipped;
        total.failed += summary.failed;
    }
    log.info("TOTAL:");
    log.info(&format!("  Processed: {}", total.processed));
    log.info(&format!("  Skipped: {}", total.skipped));
    if total.failed > 0 {
        log.info(&format!("  Failed: {}", total.failed));
    }
    Ok(())
}

fn run_job(job: &Job, log: &dyn LogSink) -> Result<BatchSummary> {
    let catalog = Catalog::parse(&job.dat, log)?;
    let stats = catalog.stats();
    if stats.invalid > 0 {
        log.warn(&format!(
            "{} of {} entries had unusable resolution data",
            stats.invalid, stats.entries
        ));
    }
    log.info(&format!("Writing configs to {}", job.config_dir().display()));
    let reconciler = Reconciler::for_roms(&job.roms, job.export.as_deref(), log)
        .with_rom_extension(&job.rom_extension)
        .with_override(job.overrides.unwrap_or_default());
    let rom_names = reconciler.rom_identifiers();
    Ok(reconciler.process_all(&catalog, &rom_names, None))
}

fn run_remove(options: RemoveOptions, log: &dyn LogSink) -> Result<()> {
    let mut reconciler = Reconciler::new(&options.folder, log);
    if let Some(extension) = options.rom_extension.as_deref() {
        reconciler = reconciler.with_rom_extension(extension);
    }
    let Some(rom) = options.rom else {
        reconciler.remove_all_overrides(None);
        return Ok(());
    };

    match reconciler.remove_override(&rom, !options.keep_empty)? {
        RemoveOutcome::Removed {
            now_empty: true,
            deleted: false,
        } => log.info(&format!(
            "{} kept; delete it with `remove --folder {} --rom {rom}`",
            reconciler.config_path(&rom).display(),
            options.folder.display()
        )),
        RemoveOutcome::NoOverrides if !options.keep_empty => {
            if !reconciler.delete_empty_config(&rom)? {
                log.info("No action taken");
            }
        }
        RemoveOutcome::TargetMissing | RemoveOutcome::NoOverrides => {
            log.info("No action taken")
        }
        RemoveOutcome::Removed { .. } => {}
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Result<CliCommand> {
    let Some(head) = args.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = &args[1..];
    match head.as_str() {
        "--help" | "-h" | "help" => Ok(CliCommand::Help),
        "--version" | "-V" | "version" => Ok(CliCommand::Version),
        "sources" => Ok(CliCommand::Sources),
        "browse" => parse_browse(rest).map(CliCommand::Browse),
        "apply" => parse_apply(rest).map(CliCommand::Apply),
        "remove" => parse_remove(rest).map(CliCommand::Remove),
        "backup" => {
            let mut folder = None;
            let mut out = None;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--folder" => folder = Some(path_value(&mut iter, "--folder")?),
                    "--out" => out = Some(path_value(&mut iter, "--out")?),
                    other => bail!("Unknown backup option: {other}"),
                }
            }
            Ok(CliCommand::Backup {
                folder: folder.context("backup requires --folder")?,
                out,
            })
        }
        "restore" => {
            let mut folder = None;
            let mut archive = None;
            let mut overwrite = true;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--folder" => folder = Some(path_value(&mut iter, "--folder")?),
                    "--archive" => archive = Some(path_value(&mut iter, "--archive")?),
                    "--no-overwrite" => overwrite = false,
                    other => bail!("Unknown restore option: {other}"),
                }
            }
            Ok(CliCommand::Restore {
                folder: folder.context("restore requires --folder")?,
                archive: archive.context("restore requires --archive")?,
                overwrite,
            })
        }
        value if value.starts_with("--") => parse_system_flags(args).map(CliCommand::Apply),
        other => bail!("Unknown command: {other} (see --help)"),
    }
}

fn parse_apply(args: &[String]) -> Result<Vec<Job>> {
    let mut name = None;
    let mut dat = None;
    let mut roms = None;
    let mut export = None;
    let mut overrides = None;
    let mut extension = None;
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--jobs" => {
                let path = path_value(&mut iter, "--jobs")?;
                return Ok(JobFile::load(&path)?.jobs);
            }
            "--name" => name = Some(string_value(&mut iter, "--name")?),
            "--dat" => dat = Some(path_value(&mut iter, "--dat")?),
            "--roms" => roms = Some(path_value(&mut iter, "--roms")?),
            "--export" => export = Some(path_value(&mut iter, "--export")?),
            "--ext" => extension = Some(string_value(&mut iter, "--ext")?),
            "--override" => overrides = Some(override_values(&mut iter)?),
            other => bail!("Unknown apply option: {other}"),
        }
    }

    let mut job = Job::new(
        name.unwrap_or_else(|| "Arcade".to_string()),
        dat.context("apply requires --dat (or --jobs)")?,
        roms.context("apply requires --roms")?,
    );
    job.export = export;
    job.overrides = overrides;
    if let Some(extension) = extension {
        job.rom_extension = extension;
    }
    Ok(vec![job])
}

/// `--fbneo DAT ROMS`, `--mame DAT ROMS` and repeatable `--system NAME DAT ROMS`,
/// each with matching `-override` and `-export` flags.
fn parse_system_flags(args: &[String]) -> Result<Vec<Job>> {
    let mut jobs: Vec<Job> = Vec::new();
    let mut overrides: Vec<(String, ResolutionOverride)> = Vec::new();
    let mut exports: Vec<(String, PathBuf)> = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--fbneo" | "--mame" => {
                let dat = path_value(&mut iter, arg)?;
                let roms = path_value(&mut iter, arg)?;
                jobs.push(Job::new(builtin_name(arg), dat, roms));
            }
            "--fbneo-override" | "--mame-override" => {
                let system = builtin_name(arg.trim_end_matches("-override"));
                overrides.push((system.to_string(), override_values(&mut iter)?));
            }
            "--fbneo-export" | "--mame-export" => {
                let system = builtin_name(arg.trim_end_matches("-export"));
                exports.push((system.to_string(), path_value(&mut iter, arg)?));
            }
            "--system" => {
                let name = string_value(&mut iter, arg)?;
                let dat = path_value(&mut iter, arg)?;
                let roms = path_value(&mut iter, arg)?;
                jobs.push(Job::new(name, dat, roms));
            }
            "--system-override" => {
                let name = string_value(&mut iter, arg)?;
                overrides.push((name, override_values(&mut iter)?));
            }
            "--system-export" => {
                let name = string_value(&mut iter, arg)?;
                exports.push((name, path_value(&mut iter, arg)?));
            }
            other => bail!("Unknown option: {other}"),
        }
    }

    if jobs.is_empty() {
        bail!("No systems configured. Use --fbneo, --mame, or --system to add systems.");
    }
    for job in &mut jobs {
        if let Some((_, value)) = overrides.iter().rev().find(|(name, _)| *name == job.name) {
            job.overrides = Some(*value);
        }
        if let Some((_, path)) = exports.iter().rev().find(|(name, _)| *name == job.name) {
            job.export = Some(path.clone());
        }
    }
    Ok(jobs)
}

fn builtin_name(flag: &str) -> &'static str {
    match flag {
        "--fbneo" => "FinalBurn Neo",
        _ => "MAME",
    }
}

fn string_value<'a, I>(iter: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = &'a String>,
{
    match iter.next() {
        Some(value) if !value.starts_with("--") => Ok(value.to_string()),
        _ => bail!("{flag} requires a value"),
    }
}

fn path_value<'a, I>(iter: &mut I, flag: &str) -> Result<PathBuf>
where
    I: Iterator<Item = &'a String>,
{
    string_value(iter, flag).map(PathBuf::from)
}

/// Consumes up to four integer tokens following an override flag.
fn override_values<'a, I>(iter: &mut std::iter::Peekable<I>) -> Result<ResolutionOverride>
where
    I: Iterator<Item = &'a String>,
{
    let mut values = Vec::new();
    while values.len() < 4 {
        match iter.next_if(|value| value.parse::<i64>().is_ok()) {
            Some(value) => values.push(value.clone()),
            None => break,
        }
    }
    ResolutionOverride::from_args(&values)
}

fn print_help() {
    println!("viewport-sync");
    println!("  Write custom viewport overrides from DAT/XML catalogs into per-ROM .cfg files.");
    println!();
    println!("Commands:");
    println!("  apply --dat <file> --roms <dir> [--export <dir>] [--override W H [X Y]] [--ext zip] [--name <label>]");
    println!("  apply --jobs <jobs.json>");
    println!("  remove --folder <dir> [--rom <name> [--keep-empty]] [--ext zip]");
    println!("  backup --folder <dir> [--out <file.zip>]");
    println!("  restore --folder <dir> --archive <file.zip> [--no-overwrite]");
    println!("  browse --dat <file> [--folder <dir>] [--filter <text>] [--ext zip] [ROM...]");
    println!("  sources");
    println!();
    println!("System flags (combinable):");
    println!("  --fbneo <dat> <roms> [--fbneo-override W H [X Y]] [--fbneo-export <dir>]");
    println!("  --mame <dat> <roms> [--mame-override W H [X Y]] [--mame-export <dir>]");
    println!("  --system <name> <dat> <roms> [--system-override <name> W H [X Y]] [--system-export <name> <dir>]");
    println!();
    println!("Global:");
    println!("  -q, --quiet       Only write the log file");
    println!("  -h, --help        Show this help");
    println!("  -V, --version     Show version");
}

fn parse_remove(args: &[String]) -> Result<RemoveOptions> {
    let mut folder = None;
    let mut rom = None;
    let mut keep_empty = false;
    let mut rom_extension = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--folder" => folder = Some(path_value(&mut iter, "--folder")?),
            "--rom" => rom = Some(string_value(&mut iter, "--rom")?),
            "--keep-empty" => keep_empty = true,
            "--ext" => rom_extension = Some(string_value(&mut iter, "--ext")?),
            other => bail!("Unknown remove option: {other}"),
        }
    }
    if keep_empty && rom.is_none() {
        bail!("--keep-empty only applies together with --rom");
    }
    Ok(RemoveOptions {
        folder: folder.context("remove requires --folder")?,
        rom,
        keep_empty,
        rom_extension,
    })
}

fn parse_browse(args: &[String]) -> Result<BrowseOptions> {
    let mut dat = None;
    let mut folder = None;
    let mut filter = None;
    let mut rom_extension = None;
    let mut roms = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dat" => dat = Some(path_value(&mut iter, "--dat")?),
            "--folder" => folder = Some(path_value(&mut iter, "--folder")?),
            "--filter" => filter = Some(string_value(&mut iter, "--filter")?),
            "--ext" => rom_extension = Some(string_value(&mut iter, "--ext")?),
            other if other.starts_with("--") => bail!("Unknown browse option: {other}"),
            rom => roms.push(rom.to_string()),
        }
    }
    Ok(BrowseOptions {
        dat: dat.context("browse requires --dat")?,
        folder,
        filter,
        rom_extension,
        roms,
    })
}

/// Table of catalog entries sorted by name. With a config folder, the last
/// column shows the viewport currently written for each ROM.
fn browse_lines(catalog: &Catalog, options: &BrowseOptions) -> Result<Vec<String>> {
    if catalog.is_empty() {
        return Ok(vec![
            "No games with resolution data found in DAT file.".to_string()
        ]);
    }

    let mut games: Vec<&GameInfo> = Vec::new();
    let mut missing = Vec::new();
    if options.roms.is_empty() {
        games.extend(catalog.games());
    } else {
        for rom in &options.roms {
            match catalog.get(rom) {
                Some(info) => games.push(info),
                None => missing.push(rom.as_str()),
            }
        }
    }
    if let Some(filter) = options.filter.as_deref() {
        let needle = filter.to_lowercase();
        games.retain(|info| {
            info.name.to_lowercase().contains(&needle)
                || info.description.to_lowercase().contains(&needle)
        });
    }
    games.sort_by(|a, b| a.name.cmp(&b.name));

    let quiet = NullSink;
    let reconciler = options.folder.as_ref().map(|folder| {
        let reconciler = Reconciler::new(folder, &quiet);
        match options.rom_extension.as_deref() {
            Some(extension) => reconciler.with_rom_extension(extension),
            None => reconciler,
        }
    });

    let mut lines = vec![format!(
        "{:<15} {:<30} {:<6} {:<20} {:<11} {:<10} {:<8} {:<10} {}",
        "Name", "Desc", "Year", "Mfr", "Res", "Orient", "Screen", "Clone", "OVR"
    )];
    for info in &games {
        let current = match reconciler.as_ref() {
            Some(reconciler) => {
                current_viewport(&ConfigRecord::load(&reconciler.config_path(&info.name))?)
            }
            None => "-".to_string(),
        };
        lines.push(format!(
            "{:<15} {:<30} {:<6} {:<20} {:<11} {:<10} {:<8} {:<10} {}",
            clip(&info.name, 15),
            clip(&info.description, 30),
            clip(&info.year, 6),
            clip(&info.manufacturer, 20),
            format!("{}x{}", info.width, info.height),
            clip(&info.rotate, 10),
            clip(&info.screen_type, 8),
            clip(&info.cloneof, 10),
            current
        ));
    }
    lines.push(format!("{} of {} games", games.len(), catalog.len()));
    for rom in missing {
        lines.push(format!("{rom}: not in catalog"));
    }
    Ok(lines)
}

fn current_viewport(record: &ConfigRecord) -> String {
    if !record.has_viewport_keys() {
        return "N".to_string();
    }
    let unquote = |value: &str| value.trim_matches('"').to_string();
    match (record.get(VIEWPORT_WIDTH), record.get(VIEWPORT_HEIGHT)) {
        (Some(width), Some(height)) => format!("{}x{}", unquote(width), unquote(height)),
        _ => "Y".to_string(),
    }
}

fn clip(value: &str, width: usize) -> String {
    value.chars().take(width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemorySink;
    use std::fs;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn no_arguments_shows_help() {
        assert_eq!(parse_args(&[]).unwrap(), CliCommand::Help);
    }

    #[test]
    fn parses_apply_with_override_and_export() {
        let command = parse_args(&args(&[
            "apply", "--dat", "fbneo.dat", "--roms", "/roms", "--override", "1920", "1080",
            "--export", "/cfg",
        ]))
        .unwrap();
        let CliCommand::Apply(jobs) = command else {
            panic!("expected apply");
        };
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].export, Some(PathBuf::from("/cfg")));
        let overrides = jobs[0].overrides.unwrap();
        assert_eq!((overrides.width, overrides.height), (Some(1920), Some(1080)));
        assert_eq!(overrides.x, None);
    }

    #[test]
    fn override_arity_is_enforced() {
        let err = parse_args(&args(&[
            "apply", "--dat", "a", "--roms", "b", "--override", "640", "480", "1",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("2 or 4 values"));
    }

    #[test]
    fn system_flags_pair_overrides_and_exports_by_name() {
        let command = parse_args(&args(&[
            "--fbneo", "fbneo.dat", "/roms/fbneo", "--fbneo-override", "1920", "1080", "10",
            "20", "--system", "MAME 2010", "mame2010.xml", "/roms/m10", "--system-export",
            "MAME 2010", "/cfg/m10", "--mame", "mame.xml", "/roms/mame", "--mame-export",
            "/cfg/mame",
        ]))
        .unwrap();
        let CliCommand::Apply(jobs) = command else {
            panic!("expected apply");
        };
        let names: Vec<&str> = jobs.iter().map(|job| job.name.as_str()).collect();
        assert_eq!(names, vec!["FinalBurn Neo", "MAME 2010", "MAME"]);

        let fbneo = jobs[0].overrides.unwrap();
        assert_eq!((fbneo.x, fbneo.y), (Some(10), Some(20)));
        assert_eq!(jobs[1].export, Some(PathBuf::from("/cfg/m10")));
        assert!(jobs[1].overrides.is_none());
        assert_eq!(jobs[2].export, Some(PathBuf::from("/cfg/mame")));
    }

    #[test]
    fn unknown_commands_and_missing_values_are_errors() {
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["backup"])).is_err());
        assert!(parse_args(&args(&["restore", "--folder", "/cfg"])).is_err());
        assert!(parse_args(&args(&["--fbneo", "only.dat"])).is_err());
        assert!(parse_args(&args(&["--fbneo-override", "1", "2"])).is_err());
        assert!(parse_args(&args(&["browse", "sf2"])).is_err());
    }

    #[test]
    fn keep_empty_without_rom_is_rejected() {
        let err = parse_args(&args(&["remove", "--folder", "/cfg", "--keep-empty"])).unwrap_err();
        assert!(err.to_string().contains("--keep-empty only applies together with --rom"));
    }

    #[test]
    fn parses_browse_with_positional_roms() {
        assert_eq!(
            parse_args(&args(&[
                "browse", "--dat", "fbneo.dat", "sf2", "--folder", "/cfg", "1942"
            ]))
            .unwrap(),
            CliCommand::Browse(BrowseOptions {
                dat: PathBuf::from("fbneo.dat"),
                folder: Some(PathBuf::from("/cfg")),
                filter: None,
                rom_extension: None,
                roms: vec!["sf2".to_string(), "1942".to_string()],
            })
        );
    }

    const BROWSE_DAT: &str = r#"<datafile>
        <game name="sf2">
            <description>Street Fighter II</description>
            <year>1991</year>
            <manufacturer>Capcom</manufacturer>
            <video type="raster" orientation="horizontal" width="384" height="224"/>
        </game>
        <game name="1942">
            <description>1942</description>
            <display type="raster" rotate="270" width="224" height="256"/>
        </game>
    </datafile>"#;

    fn browse_options(folder: Option<PathBuf>) -> BrowseOptions {
        BrowseOptions {
            dat: PathBuf::from("fbneo.dat"),
            folder,
            filter: None,
            rom_extension: None,
            roms: Vec::new(),
        }
    }

    #[test]
    fn browse_lists_games_sorted_with_current_viewport() {
        let dir = tempfile::tempdir().unwrap();
        let log = MemorySink::new();
        let catalog = Catalog::parse_str(BROWSE_DAT, &log).unwrap();
        Reconciler::new(dir.path(), &log)
            .apply_override("sf2", 1920, 1080, None, None)
            .unwrap();

        let lines = browse_lines(&catalog, &browse_options(Some(dir.path().into()))).unwrap();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Name"));
        assert!(lines[1].starts_with("1942"));
        assert!(lines[1].contains("224x256"));
        assert!(lines[1].ends_with(" N"));
        assert!(lines[2].starts_with("sf2"));
        assert!(lines[2].contains("Street Fighter II"));
        assert!(lines[2].contains("Capcom"));
        assert!(lines[2].contains("384x224"));
        assert!(lines[2].ends_with("1920x1080"));
        assert_eq!(lines[3], "2 of 2 games");
    }

    #[test]
    fn browse_filters_and_reports_unknown_roms() {
        let catalog = Catalog::parse_str(BROWSE_DAT, &MemorySink::new()).unwrap();

        let mut options = browse_options(None);
        options.filter = Some("street".to_string());
        let lines = browse_lines(&catalog, &options).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("sf2"));
        assert!(lines[1].ends_with(" -"));

        let mut options = browse_options(None);
        options.roms = vec!["1942".to_string(), "dkong".to_string()];
        let lines = browse_lines(&catalog, &options).unwrap();
        assert!(lines[1].starts_with("1942"));
        assert_eq!(lines[2], "1 of 2 games");
        assert_eq!(lines[3], "dkong: not in catalog");
    }

    #[test]
    fn jobs_with_zero_override_fail_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sf2.zip"), b"PK").unwrap();
        let dat = dir.path().join("fbneo.dat");
        fs::write(
            &dat,
            r#"<datafile><game name="sf2"><video width="384" height="224"/></game></datafile>"#,
        )
        .unwrap();

        let mut job = Job::new("FinalBurn Neo", dat, dir.path().to_path_buf());
        job.overrides = Some(ResolutionOverride {
            width: Some(0),
            height: Some(0),
            x: None,
            y: None,
        });
        assert!(run_jobs(&[job], &MemorySink::new()).is_err());
        assert!(!dir.path().join("sf2.zip.cfg").exists());
    }

    #[test]
    fn parses_remove_and_restore_options() {
        assert_eq!(
            parse_args(&args(&["remove", "--folder", "/cfg", "--rom", "sf2", "--keep-empty"]))
                .unwrap(),
            CliCommand::Remove(RemoveOptions {
                folder: PathBuf::from("/cfg"),
                rom: Some("sf2".to_string()),
                keep_empty: true,
                rom_extension: None,
            })
        );
        assert_eq!(
            parse_args(&args(&[
                "restore",
                "--folder",
                "/cfg",
                "--archive",
                "b.zip",
                "--no-overwrite"
            ]))
            .unwrap(),
            CliCommand::Restore {
                folder: PathBuf::from("/cfg"),
                archive: PathBuf::from("b.zip"),
                overwrite: false,
            }
        );
    }

    #[test]
    fn jobs_run_end_to_end_and_report_summary() {
        let dir = tempfile::tempdir().unwrap();
        let roms = dir.path().join("roms");
        fs::create_dir(&roms).unwrap();
        fs::write(roms.join("sf2.zip"), b"PK").unwrap();
        fs::write(roms.join("unknown.zip"), b"PK").unwrap();
        let dat = dir.path().join("fbneo.dat");
        fs::write(
            &dat,
            r#"<datafile><game name="sf2"><video width="384" height="224"/></game></datafile>"#,
        )
        .unwrap();

        let log = MemorySink::new();
        let jobs = vec![Job::new("FinalBurn Neo", dat, roms.clone())];
        run_jobs(&jobs, &log).unwrap();

        assert!(roms.join("sf2.zip.cfg").is_file());
        assert!(!roms.join("unknown.zip.cfg").exists());
        let messages = log.messages();
        let total = messages.iter().position(|line| line == "TOTAL:").unwrap();
        assert_eq!(messages[total + 1], "  Processed: 1");
        assert_eq!(messages[total + 2], "  Skipped: 1");
    }

    #[test]
    fn jobs_with_missing_paths_fail_before_processing() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![Job::new(
            "MAME",
            dir.path().join("missing.xml"),
            dir.path().to_path_buf(),
        )];
        assert!(run_jobs(&jobs, &MemorySink::new()).is_err());
    }

    #[test]
    fn remove_single_rom_keeps_empty_file_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let log = MemorySink::new();
        Reconciler::new(dir.path(), &log)
            .apply_override("sf2", 384, 224, None, None)
            .unwrap();

        run_remove(
            RemoveOptions {
                folder: dir.path().to_path_buf(),
                rom: Some("sf2".to_string()),
                keep_empty: true,
                rom_extension: None,
            },
            &log,
        )
        .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("sf2.zip.cfg")).unwrap(), "");
        assert!(log.contains("kept; delete it with"));

        run_remove(
            RemoveOptions {
                folder: dir.path().to_path_buf(),
                rom: Some("sf2".to_string()),
                keep_empty: false,
                rom_extension: None,
            },
            &log,
        )
        .unwrap();
        assert!(!dir.path().join("sf2.zip.cfg").exists());
        assert!(log.contains("Deleted empty config file: sf2.zip.cfg"));
    }
}
