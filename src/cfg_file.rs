use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs, io,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

pub const ASPECT_RATIO_INDEX: &str = "aspect_ratio_index";
pub const VIEWPORT_X: &str = "custom_viewport_x";
pub const VIEWPORT_Y: &str = "custom_viewport_y";
pub const VIEWPORT_WIDTH: &str = "custom_viewport_width";
pub const VIEWPORT_HEIGHT: &str = "custom_viewport_height";

/// Keys owned by the reconciler, in the order they lead a written file.
pub const VIEWPORT_KEYS: [&str; 5] = [
    ASPECT_RATIO_INDEX,
    VIEWPORT_X,
    VIEWPORT_Y,
    VIEWPORT_WIDTH,
    VIEWPORT_HEIGHT,
];

/// `aspect_ratio_index` value selecting the custom viewport.
pub const CUSTOM_ASPECT_RATIO: &str = "23";

pub fn is_viewport_key(key: &str) -> bool {
    VIEWPORT_KEYS.contains(&key)
}

/// Flat `key = value` settings of one config file. Values are kept
/// verbatim, quotes included.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    values: BTreeMap<String, String>,
}

impl ConfigRecord {
    pub fn parse(raw: &str) -> Self {
        let mut values = BTreeMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self { values }
    }

    /// Reads `path`, yielding an empty record when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Self::parse(&raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("read config {}", path.display())),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for key in VIEWPORT_KEYS {
            if let Some(value) = self.values.get(key) {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        for (key, value) in &self.values {
            if !is_viewport_key(key) {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic_text(path, &self.render())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Stores `value` wrapped in literal double quotes.
    pub fn set_quoted(&mut self, key: &str, value: impl std::fmt::Display) {
        self.values.insert(key.to_string(), format!("\"{value}\""));
    }

    pub fn has_viewport_keys(&self) -> bool {
        VIEWPORT_KEYS.iter().any(|key| self.values.contains_key(*key))
    }

    /// Drops every viewport key, returning whether any was present.
    pub fn strip_viewport(&mut self) -> bool {
        let mut removed = false;
        for key in VIEWPORT_KEYS {
            removed |= self.values.remove(key).is_some();
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn write_atomic_text(path: &Path, contents: &str) -> Result<()> {
    let parent = path.parent().context("config parent dir")?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).context("create config dir")?;
    }
    let file_name = path.file_name().context("config filename")?;
    let mut temp_name = std::ffi::OsString::from(file_name);
    temp_name.push(".tmp");
    let mut temp_path = parent.join(temp_name);
    if temp_path.exists() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut temp_name = std::ffi::OsString::from(file_name);
        temp_name.push(format!(".{stamp}.tmp"));
        temp_path = parent.join(temp_name);
    }
    fs::write(&temp_path, contents)
        .with_context(|| format!("write config temp {}", temp_path.display()))?;
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err).with_context(|| format!("finalize config {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_blanks_and_bare_lines() {
        let record = ConfigRecord::parse(
            "# written by hand\n\n  video_smooth = \"true\"  \nnot a setting\ninput_player1_a=\"x\"\nshader = a=b\n",
        );
        assert_eq!(record.render().lines().count(), 3);
        assert_eq!(record.get("video_smooth"), Some("\"true\""));
        assert_eq!(record.get("input_player1_a"), Some("\"x\""));
        assert_eq!(record.get("shader"), Some("a=b"));
    }

    #[test]
    fn render_puts_viewport_keys_first_then_sorted_rest() {
        let mut record = ConfigRecord::parse("zeta = \"1\"\nalpha = 2\n");
        record.set_quoted(VIEWPORT_HEIGHT, 240);
        record.set_quoted(VIEWPORT_WIDTH, 320);
        record.set_quoted(VIEWPORT_Y, 0);
        record.set_quoted(VIEWPORT_X, 0);
        record.set_quoted(ASPECT_RATIO_INDEX, CUSTOM_ASPECT_RATIO);

        assert_eq!(
            record.render(),
            "aspect_ratio_index = \"23\"\n\
             custom_viewport_x = \"0\"\n\
             custom_viewport_y = \"0\"\n\
             custom_viewport_width = \"320\"\n\
             custom_viewport_height = \"240\"\n\
             alpha = 2\n\
             zeta = \"1\"\n"
        );
    }

    #[test]
    fn strip_viewport_reports_whether_anything_changed() {
        let mut record = ConfigRecord::parse("custom_viewport_x = \"4\"\nvideo_scale = 2\n");
        assert!(record.has_viewport_keys());
        assert!(record.strip_viewport());
        assert!(!record.has_viewport_keys());
        assert!(!record.strip_viewport());
        assert_eq!(record.render(), "video_scale = 2\n");
    }

    #[test]
    fn load_missing_file_is_empty_and_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sf2.zip.cfg");
        assert!(ConfigRecord::load(&path).unwrap().is_empty());

        let record = ConfigRecord::parse("video_shader = \"crt.glslp\"\n");
        record.save(&path).unwrap();

        assert_eq!(ConfigRecord::load(&path).unwrap(), record);
        assert!(!dir.path().join("nested").join("sf2.zip.cfg.tmp").exists());
    }

    #[test]
    fn failed_rename_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sf2.zip.cfg");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupant"), "x").unwrap();

        let record = ConfigRecord::parse("video_scale = 2\n");
        assert!(record.save(&path).is_err());
        assert!(!dir.path().join("sf2.zip.cfg.tmp").exists());
    }
}
