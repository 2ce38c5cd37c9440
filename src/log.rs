#[cfg(test)]
use std::cell::RefCell;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Destination for human-readable progress lines.
///
/// Sinks are handed to the parser, reconciler and archive functions
/// explicitly; nothing in the crate logs through global state.
pub trait LogSink {
    fn log(&self, level: LogLevel, message: &str);

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

impl<T: LogSink + ?Sized> LogSink for &T {
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message)
    }
}

/// Adapts a plain `Fn(LogLevel, &str)` callback into a sink.
#[cfg(test)]
pub struct FnSink<F>(pub F);

#[cfg(test)]
impl<F> LogSink for FnSink<F>
where
    F: Fn(LogLevel, &str),
{
    fn log(&self, level: LogLevel, message: &str) {
        (self.0)(level, message)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => println!("{message}"),
            _ => eprintln!("{}: {message}", log_level_label(level)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Records every line for inspection in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: RefCell<Vec<LogEntry>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|entry| entry.message.contains(needle))
    }
}

#[cfg(test)]
impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries.borrow_mut().push(LogEntry {
            level,
            message: message.to_string(),
        });
    }
}

/// Appends `[LEVEL] message` lines to a log file. Write failures are
/// swallowed so a read-only log never aborts a batch.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogSink for FileSink {
    fn log(&self, level: LogLevel, message: &str) {
        let _ = append_log_file(&self.path, level, message);
    }
}

pub struct TeeSink<A, B> {
    first: A,
    second: B,
}

impl<A: LogSink, B: LogSink> TeeSink<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: LogSink, B: LogSink> LogSink for TeeSink<A, B> {
    fn log(&self, level: LogLevel, message: &str) {
        self.first.log(level, message);
        self.second.log(level, message);
    }
}

pub fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    let label = log_level_label(level);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    for line in message.lines() {
        writeln!(file, "[{label}] {line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_prefixes_each_line_with_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let sink = FileSink::new(&path);
        sink.info("Parsing DAT file");
        sink.warn("Invalid resolution for foo: axb");

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(
            raw,
            "[INFO] Parsing DAT file\n[WARN] Invalid resolution for foo: axb\n"
        );
    }

    #[test]
    fn closures_and_tee_forward_to_every_sink() {
        let memory = MemorySink::new();
        let seen = RefCell::new(Vec::new());
        let closure = FnSink(|level: LogLevel, message: &str| {
            seen.borrow_mut().push((level, message.to_string()));
        });
        let tee = TeeSink::new(&memory, closure);
        tee.error("Backup failed");

        assert_eq!(
            memory.entries(),
            vec![LogEntry {
                level: LogLevel::Error,
                message: "Backup failed".to_string(),
            }]
        );
        assert_eq!(seen.borrow().len(), 1);
    }
}
