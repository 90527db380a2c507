// Lookups the compiler and decompiler need from the rest of the toolkit:
// IDS symbol tables and game resource existence / naming.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{bcsfile, error::Result};

// ── Traits ────────────────────────────────────────────────────────────────────

pub trait SymbolLookup {
    /// Symbol for `value` in the IDS table `ids` (lowercase, no extension).
    fn symbol(&self, ids: &str, value: i64) -> Option<String>;
}

pub trait ResourceLookup {
    /// `name` carries its extension, e.g. `SW1H01.ITM`.
    fn resource_exists(&self, name: &str) -> bool;
    /// Creature or area script name (death variable).
    fn script_name_exists(&self, name: &str) -> bool;
    fn display_name(&self, name: &str) -> Option<String>;
    fn strref_valid(&self, strref: i64) -> bool;
    fn string_text(&self, strref: i64) -> Option<String>;
}

/// No symbol tables at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolLookup for NoSymbols {
    fn symbol(&self, _ids: &str, _value: i64) -> Option<String> {
        None
    }
}

/// Resource service for when no game data is configured: every check passes
/// and nothing has a display name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResources;

impl ResourceLookup for NullResources {
    fn resource_exists(&self, _name: &str) -> bool {
        true
    }

    fn script_name_exists(&self, _name: &str) -> bool {
        true
    }

    fn display_name(&self, _name: &str) -> Option<String> {
        None
    }

    fn strref_valid(&self, _strref: i64) -> bool {
        true
    }

    fn string_text(&self, _strref: i64) -> Option<String> {
        None
    }
}

// ── Spell numbers ─────────────────────────────────────────────────────────────

/// Resource name for an engine spell number: `2101` → `SPWI101`.
pub fn spell_resref(value: i64) -> Option<String> {
    let prefix = match value / 1000 {
        1 => "SPPR",
        2 => "SPWI",
        3 => "SPIN",
        4 => "SPCL",
        _ => return None,
    };
    Some(format!("{}{:03}", prefix, value % 1000))
}

// ── IDS tables ────────────────────────────────────────────────────────────────

pub type IdsTable = HashMap<i64, String>;

fn parse_ids_value(token: &str) -> Option<i64> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(i64::from),
        None => token.parse().ok(),
    }
}

/// Parses `<value> <name>` lines. The optional `IDS V1.0` header and entry
/// count lines are skipped; the first name for a value wins.
pub fn parse_ids(text: &str) -> IdsTable {
    let mut table = IdsTable::new();
    for line in text.lines() {
        let line = line.trim();
        let Some((value, name)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let Some(value) = parse_ids_value(value) else {
            continue;
        };
        let name = name.trim();
        if !name.is_empty() {
            table.entry(value).or_insert_with(|| name.to_string());
        }
    }
    table
}

/// `*.IDS` files from one directory, loaded on first use.
#[derive(Debug)]
pub struct IdsDirectory {
    dir: PathBuf,
    key: Option<Vec<u8>>,
    tables: RefCell<HashMap<String, Option<IdsTable>>>,
}

impl IdsDirectory {
    pub fn new(dir: impl Into<PathBuf>, key: Option<Vec<u8>>) -> Self {
        Self { dir: dir.into(), key, tables: RefCell::new(HashMap::new()) }
    }

    fn find_file(&self, ids: &str) -> Option<PathBuf> {
        let wanted = format!("{ids}.ids");
        fs::read_dir(&self.dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case(&wanted))
            })
    }

    fn load(&self, ids: &str) -> Option<IdsTable> {
        let path = self.find_file(ids)?;
        match bcsfile::read_text(&path, self.key.as_deref()) {
            Ok(text) => {
                let table = parse_ids(&text);
                info!("loaded {} symbols from {}", table.len(), path.display());
                Some(table)
            }
            Err(e) => {
                debug!("cannot read {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl SymbolLookup for IdsDirectory {
    fn symbol(&self, ids: &str, value: i64) -> Option<String> {
        let ids = ids.to_ascii_lowercase();
        let mut tables = self.tables.borrow_mut();
        let table = tables.entry(ids.clone()).or_insert_with(|| self.load(&ids));
        table.as_ref()?.get(&value).cloned()
    }
}

impl SymbolLookup for HashMap<String, IdsTable> {
    fn symbol(&self, ids: &str, value: i64) -> Option<String> {
        self.get(&ids.to_ascii_lowercase())?.get(&value).cloned()
    }
}

// ── Resource directory ────────────────────────────────────────────────────────

/// Resource existence from a flat directory listing (an override folder).
///
/// Script names and string references cannot be checked from files alone,
/// so those checks always pass.
#[derive(Debug, Clone, Default)]
pub struct ResourceDirectory {
    names: HashSet<String>,
}

impl ResourceDirectory {
    pub fn open(dir: &Path) -> Result<Self> {
        let names: HashSet<String> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(str::to_ascii_uppercase))
            .collect();
        info!("indexed {} resources in {}", names.len(), dir.display());
        Ok(Self { names })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { names: names.into_iter().map(|n| n.as_ref().to_ascii_uppercase()).collect() }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl ResourceLookup for ResourceDirectory {
    fn resource_exists(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_uppercase())
    }

    fn script_name_exists(&self, _name: &str) -> bool {
        true
    }

    fn display_name(&self, _name: &str) -> Option<String> {
        None
    }

    fn strref_valid(&self, _strref: i64) -> bool {
        true
    }

    fn string_text(&self, _strref: i64) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spell_numbers() {
        assert_eq!(spell_resref(2101).as_deref(), Some("SPWI101"));
        assert_eq!(spell_resref(1005).as_deref(), Some("SPPR005"));
        assert_eq!(spell_resref(4321).as_deref(), Some("SPCL321"));
        assert_eq!(spell_resref(999), None);
        assert_eq!(spell_resref(5000), None);
    }

    #[test]
    fn ids_parsing() {
        let table = parse_ids("IDS V1.0\n3\n0 NONE\n0x10 SIXTEEN\n-1 MINUS\n0 DUPLICATE\n\n");
        assert_eq!(table.get(&0).map(String::as_str), Some("NONE"));
        assert_eq!(table.get(&16).map(String::as_str), Some("SIXTEEN"));
        assert_eq!(table.get(&-1).map(String::as_str), Some("MINUS"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn map_backed_lookup_is_case_insensitive_on_table() {
        let mut tables = HashMap::new();
        tables.insert("ea".to_string(), parse_ids("2 PC\n255 ENEMY"));
        assert_eq!(tables.symbol("EA", 2).as_deref(), Some("PC"));
        assert_eq!(tables.symbol("ea", 3), None);
        assert_eq!(tables.symbol("gender", 2), None);
    }

    #[test]
    fn resource_directory_ignores_case() {
        let res = ResourceDirectory::from_names(["sw1h01.itm", "AR0602.ARE"]);
        assert!(res.resource_exists("SW1H01.ITM"));
        assert!(res.resource_exists("ar0602.are"));
        assert!(!res.resource_exists("SW1H02.ITM"));
        assert_eq!(res.len(), 2);
    }

    #[test]
    fn ids_directory_loads_lazily() {
        let dir = std::env::temp_dir().join(format!("bcs-tools-ids-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("EA.IDS"), "IDS V1.0\n2 PC\n").unwrap();
        let ids = IdsDirectory::new(&dir, None);
        assert_eq!(ids.symbol("ea", 2).as_deref(), Some("PC"));
        assert_eq!(ids.symbol("race", 1), None);
        fs::remove_dir_all(&dir).unwrap();
    }
}
