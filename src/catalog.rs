use crate::log::LogSink;
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// A known catalog provider. Downloading is left to the caller; these are
/// only the locations the front-end offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSource {
    pub name: &'static str,
    pub url: &'static str,
    pub filename: &'static str,
}

pub const CATALOG_SOURCES: &[CatalogSource] = &[
    CatalogSource {
        name: "FBNeo (Arcade only)",
        url: "https://raw.githubusercontent.com/libretro/FBNeo/master/dats/FinalBurn%20Neo%20(ClrMame%20Pro%20XML%2C%20Arcade%20only).dat",
        filename: "fbneo_arcade.dat",
    },
    CatalogSource {
        name: "MAME 2003 Plus",
        url: "https://raw.githubusercontent.com/libretro/mame2003-plus-libretro/master/metadata/mame2003-plus.xml",
        filename: "mame2003-plus.xml",
    },
    CatalogSource {
        name: "MAME 2000 (0.37b5)",
        url: "https://raw.githubusercontent.com/libretro/mame2000-libretro/master/metadata/MAME%200.37b5%20XML.dat",
        filename: "mame2000.dat",
    },
    CatalogSource {
        name: "MAME 2003",
        url: "https://raw.githubusercontent.com/libretro/mame2003-libretro/master/metadata/mame2003.xml",
        filename: "mame2003.xml",
    },
    CatalogSource {
        name: "MAME 2010",
        url: "https://raw.githubusercontent.com/libretro/mame2010-libretro/master/metadata/mame2010.xml",
        filename: "mame2010.xml",
    },
    CatalogSource {
        name: "MAME 2015",
        url: "https://raw.githubusercontent.com/libretro/mame2015-libretro/master/metadata/mame2015-xml.zip",
        filename: "mame2015.zip",
    },
    CatalogSource {
        name: "MAME 2016 (0.174)",
        url: "https://raw.githubusercontent.com/libretro/mame2016-libretro/master/metadata/MAME%200.174%20Arcade%20XML%20DAT.zip",
        filename: "mame2016.zip",
    },
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("DAT file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("read DAT file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse DAT file {}: {message}", path.display())]
    Xml { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub description: String,
    pub year: String,
    pub manufacturer: String,
    pub cloneof: String,
    pub rotate: String,
    pub screen_type: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    /// Every `game`/`machine` element, named or not.
    pub elements: usize,
    /// `game`/`machine` elements carrying a name.
    pub entries: usize,
    /// Entries whose width/height did not parse as positive integers.
    pub invalid: usize,
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    games: HashMap<String, GameInfo>,
    stats: CatalogStats,
}

impl Catalog {
    pub fn parse(path: &Path, log: &dyn LogSink) -> Result<Self, CatalogError> {
        log.info(&format!("Parsing DAT file: {}", path.display()));
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let err = CatalogError::NotFound {
                    path: path.to_path_buf(),
                };
                log.error(&err.to_string());
                return Err(err);
            }
            Err(source) => {
                return Err(CatalogError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let entries = read_entries(&bytes).map_err(|message| {
            log.error(&format!("Error parsing DAT file: {message}"));
            CatalogError::Xml {
                path: path.to_path_buf(),
                message,
            }
        })?;
        Ok(Self::from_entries(entries, log))
    }

    #[cfg(test)]
    pub fn parse_str(raw: &str, log: &dyn LogSink) -> Result<Self, CatalogError> {
        let entries = read_entries(raw.as_bytes()).map_err(|message| CatalogError::Xml {
            path: PathBuf::new(),
            message,
        })?;
        Ok(Self::from_entries(entries, log))
    }

    fn from_entries(entries: Vec<Entry>, log: &dyn LogSink) -> Self {
        let mut catalog = Catalog::default();
        catalog.stats.elements = entries.len();
        for entry in entries {
            let Some(name) = entry.attr("name").filter(|name| !name.is_empty()) else {
                continue;
            };
            let name = name.to_string();
            catalog.stats.entries += 1;

            let Some(display) = RESOLUTION_STRATEGIES
                .iter()
                .find_map(|strategy| strategy(&entry))
            else {
                continue;
            };

            let (Some(width), Some(height)) =
                (parse_dimension(&display.width), parse_dimension(&display.height))
            else {
                log.warn(&format!(
                    "Invalid resolution for {name}: {}x{}",
                    display.width, display.height
                ));
                catalog.stats.invalid += 1;
                continue;
            };

            let info = GameInfo {
                name: name.clone(),
                width,
                height,
                description: entry.child_text("description"),
                year: entry.child_text("year"),
                manufacturer: entry.child_text("manufacturer"),
                cloneof: entry.attr("cloneof").unwrap_or_default().to_string(),
                rotate: display.rotate,
                screen_type: display.screen_type,
            };
            catalog.games.insert(name, info);
        }

        log.info(&format!(
            "Found {} games with resolution data",
            catalog.games.len()
        ));
        if catalog.games.is_empty() && catalog.stats.elements > 0 {
            log.warn(&format!(
                "Found {} game entries but none have resolution data.",
                catalog.stats.elements
            ));
            log.warn("This DAT file may not contain display/video information.");
            log.warn(
                "Please use a DAT file that includes resolution data (e.g., MAME XML, FinalBurn Neo DAT with display tags).",
            );
        }
        catalog
    }

    pub fn get(&self, name: &str) -> Option<&GameInfo> {
        self.games.get(name)
    }

    pub fn resolution(&self, name: &str) -> Option<(u32, u32)> {
        self.games.get(name).map(|info| (info.width, info.height))
    }

    pub fn games(&self) -> impl Iterator<Item = &GameInfo> {
        self.games.values()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn stats(&self) -> CatalogStats {
        self.stats
    }
}

#[derive(Debug)]
struct DisplayDecl {
    width: String,
    height: String,
    rotate: String,
    screen_type: String,
}

type ResolutionStrategy = fn(&Entry) -> Option<DisplayDecl>;

/// Tried in order; the first declaration carrying both width and height wins.
const RESOLUTION_STRATEGIES: &[ResolutionStrategy] = &[display_tag, video_tag];

/// FinalBurn Neo: `<display width=".." height=".." rotate=".." type=".."/>`.
fn display_tag(entry: &Entry) -> Option<DisplayDecl> {
    let node = entry.descendant("display")?;
    Some(DisplayDecl {
        width: node.attr("width")?.to_string(),
        height: node.attr("height")?.to_string(),
        rotate: first_attr(node, &["rotate", "orientation"]),
        screen_type: first_attr(node, &["type"]),
    })
    .filter(DisplayDecl::has_size)
}

/// MAME / ClrMamePro: `<video screen=".." width=".." height=".." orientation=".."/>`.
fn video_tag(entry: &Entry) -> Option<DisplayDecl> {
    let node = entry.descendant("video")?;
    Some(DisplayDecl {
        width: node.attr("width")?.to_string(),
        height: node.attr("height")?.to_string(),
        rotate: first_attr(node, &["rotate", "orientation"]),
        screen_type: first_attr(node, &["screen", "type"]),
    })
    .filter(DisplayDecl::has_size)
}

impl DisplayDecl {
    fn has_size(&self) -> bool {
        !self.width.is_empty() && !self.height.is_empty()
    }
}

fn first_attr(node: &Node, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| node.attr(key))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn parse_dimension(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|value| *value > 0)
}

/// One `game`/`machine` element with its descendants flattened in
/// document order.
#[derive(Debug, Default)]
struct Entry {
    attrs: Vec<(String, String)>,
    nodes: Vec<Node>,
}

#[derive(Debug)]
struct Node {
    name: String,
    depth: usize,
    attrs: Vec<(String, String)>,
    text: String,
}

impl Entry {
    fn attr(&self, key: &str) -> Option<&str> {
        lookup(&self.attrs, key)
    }

    fn descendant(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    fn child_text(&self, name: &str) -> String {
        self.nodes
            .iter()
            .find(|node| node.depth == 1 && node.name == name)
            .map(|node| node.text.clone())
            .unwrap_or_default()
    }
}

impl Node {
    fn attr(&self, key: &str) -> Option<&str> {
        lookup(&self.attrs, key)
    }
}

fn lookup<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

fn is_entry_tag(name: &[u8]) -> bool {
    name == b"game" || name == b"machine"
}

fn read_entries(bytes: &[u8]) -> Result<Vec<Entry>, String> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut current: Option<Entry> = None;
    let mut open_nodes: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| format!("{err} at position {}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                saw_root = true;
                depth += 1;
                match current.as_mut() {
                    Some(entry) => {
                        entry.nodes.push(Node {
                            name: tag_name(&e),
                            depth: open_nodes.len() + 1,
                            attrs: attributes(&e)?,
                            text: String::new(),
                        });
                        open_nodes.push(entry.nodes.len() - 1);
                    }
                    None if is_entry_tag(e.name().as_ref()) => {
                        current = Some(Entry {
                            attrs: attributes(&e)?,
                            nodes: Vec::new(),
                        });
                    }
                    None => {}
                }
            }
            Event::Empty(e) => {
                saw_root = true;
                match current.as_mut() {
                    Some(entry) => entry.nodes.push(Node {
                        name: tag_name(&e),
                        depth: open_nodes.len() + 1,
                        attrs: attributes(&e)?,
                        text: String::new(),
                    }),
                    None if is_entry_tag(e.name().as_ref()) => entries.push(Entry {
                        attrs: attributes(&e)?,
                        nodes: Vec::new(),
                    }),
                    None => {}
                }
            }
            Event::Text(e) => {
                if let (Some(entry), Some(&index)) = (current.as_mut(), open_nodes.last()) {
                    let text = e.unescape().map_err(|err| err.to_string())?;
                    entry.nodes[index].text.push_str(&text);
                }
            }
            Event::CData(e) => {
                if let (Some(entry), Some(&index)) = (current.as_mut(), open_nodes.last()) {
                    let raw = e.into_inner();
                    entry.nodes[index]
                        .text
                        .push_str(&String::from_utf8_lossy(&raw));
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if current.is_some() && open_nodes.pop().is_none() {
                    entries.extend(current.take());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth > 0 {
        return Err("unexpected end of document (unclosed element)".to_string());
    }
    if !saw_root {
        return Err("no element found".to_string());
    }
    Ok(entries)
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        out.push((key, value.into_owned()));
    }
    Ok(out)
}
