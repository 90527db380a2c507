// Trigger/action signature registry.
//
// Signature lines look like the ones in TRIGGER.IDS / ACTION.IDS:
//   0x4034 Global(S:Name*,S:Area*,I:Value*)
//   31 Spell(O:Target*,I:Spell*Spell)

use std::{
    collections::HashMap,
    fmt,
    fs,
    path::Path,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::{
    error::Result,
    scriptinfo::{Dialect, VariantConfig},
};

/// Resource type used for parameters naming a creature/area script name (death variable).
pub const SCRIPT_NAME_TYPE: &str = "ScriptName";

// ── Parameter / function records ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    Trigger,
    Action,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Trigger => f.write_str("trigger"),
            FunctionKind::Action  => f.write_str("action"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Integer,
    String,
    Object,
    Point,
    Trigger,
    Action,
}

impl ParamType {
    /// `0` shows up in some shipped IDS files where `O` was meant.
    pub fn from_code(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'I'       => Some(ParamType::Integer),
            'S'       => Some(ParamType::String),
            'O' | '0' => Some(ParamType::Object),
            'P'       => Some(ParamType::Point),
            'T'       => Some(ParamType::Trigger),
            'A'       => Some(ParamType::Action),
            _         => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            ParamType::Integer => 'I',
            ParamType::String  => 'S',
            ParamType::Object  => 'O',
            ParamType::Point   => 'P',
            ParamType::Trigger => 'T',
            ParamType::Action  => 'A',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub param_type: ParamType,
    pub name: String,
    /// Lowercase IDS table name, e.g. `spell`.
    pub ids_ref: Option<String>,
    pub resource_types: Vec<String>,
    pub combined_string: bool,
    pub colon_separated: bool,
}

impl Parameter {
    pub fn new(param_type: ParamType, name: impl Into<String>, ids_ref: Option<&str>) -> Self {
        Self {
            param_type,
            name: name.into(),
            ids_ref: ids_ref.filter(|s| !s.is_empty()).map(|s| s.to_ascii_lowercase()),
            resource_types: Vec::new(),
            combined_string: false,
            colon_separated: false,
        }
    }

    /// Colon-joined resource type list (`WBM:MVE`), empty when none.
    pub fn resource_type_spec(&self) -> String {
        self.resource_types.join(":")
    }

    pub fn has_resource_type(&self, ty: &str) -> bool {
        self.resource_types.iter().any(|t| t.eq_ignore_ascii_case(ty))
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}*{}", self.param_type.code(), self.name, self.ids_ref.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: u32,
    pub name: String,
    pub kind: FunctionKind,
    pub parameters: Vec<Parameter>,
}

impl Function {
    /// Identity is the id plus the parameter type sequence; the name does not count.
    pub fn same_signature(&self, other: &Function) -> bool {
        self.id == other.id
            && self.parameters.len() == other.parameters.len()
            && self.parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| a.param_type == b.param_type)
    }

    pub fn count(&self, ty: ParamType) -> usize {
        self.parameters.iter().filter(|p| p.param_type == ty).count()
    }

    pub fn has_param_type(&self, ty: ParamType) -> bool {
        self.parameters.iter().any(|p| p.param_type == ty)
    }

    /// `TriggerOverride`/`NextTriggerObject` and `ActionOverride` style functions.
    pub fn is_override(&self) -> bool {
        match self.kind {
            FunctionKind::Trigger => self.has_param_type(ParamType::Trigger),
            FunctionKind::Action  => self.has_param_type(ParamType::Action),
        }
    }

    pub fn is_or(&self) -> bool {
        self.kind == FunctionKind::Trigger && self.name.eq_ignore_ascii_case("OR")
    }

    pub fn string_params(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.param_type == ParamType::String)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FunctionKind::Trigger => write!(f, "0x{:04X} {}(", self.id, self.name)?,
            FunctionKind::Action  => write!(f, "{} {}(", self.id, self.name)?,
        }
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{p}")?;
        }
        f.write_str(")")
    }
}

// ── Line parsing ──────────────────────────────────────────────────────────────

fn parse_id(token: &str) -> Option<u32> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_param(token: &str) -> Option<Parameter> {
    let (code, rest) = token.trim().split_once(':')?;
    let mut code_chars = code.trim().chars();
    let param_type = ParamType::from_code(code_chars.next()?)?;
    if code_chars.next().is_some() {
        return None;
    }
    let (name, ids_ref) = match rest.split_once('*') {
        Some((name, ids)) => (name.trim(), Some(ids.trim())),
        None => (rest.trim(), None),
    };
    Some(Parameter::new(param_type, name, ids_ref))
}

/// Parses one `<id> <name>(<params>)` line; `None` when it does not fit the grammar.
pub fn parse_signature_line(line: &str, kind: FunctionKind) -> Option<Function> {
    let line = line.trim();
    let (id_token, rest) = line.split_once(char::is_whitespace)?;
    let id = parse_id(id_token)?;

    let rest = rest.trim();
    let open = rest.find('(')?;
    let name = rest[..open].trim();
    if !is_identifier(name) {
        return None;
    }
    let inner = rest[open + 1..].strip_suffix(')')?;

    let parameters = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(parse_param).collect::<Option<Vec<_>>>()?
    };

    Some(Function { id, name: name.to_string(), kind, parameters })
}

// ── Derived parameter metadata ────────────────────────────────────────────────

/// Resource types guessed from a parameter's name when the variant tables say nothing.
pub fn derive_resource_types(name: &str, param_type: ParamType, ids_ref: Option<&str>) -> Vec<String> {
    let n = name.to_ascii_lowercase();
    let spec: &str = match param_type {
        ParamType::String => {
            if n.ends_with("scriptname") || n == "dv" {
                SCRIPT_NAME_TYPE
            } else if n.starts_with("spell") {
                "SPL"
            } else if n.starts_with("item") || n.ends_with("item") {
                "ITM"
            } else if n.starts_with("creature") || n.starts_with("newobject") {
                "CRE"
            } else if n.starts_with("area") {
                "ARE"
            } else if n.starts_with("dialog") {
                "DLG"
            } else if n.starts_with("script") || n.starts_with("cutscene") {
                "BCS"
            } else if n.starts_with("sound") || n.starts_with("voice") {
                "WAV"
            } else if n.starts_with("movie") {
                "MVE"
            } else if n.starts_with("store") {
                "STO"
            } else if n.starts_with("effect") || n.starts_with("animation") || n.ends_with("vvc") {
                "VVC:BAM"
            } else if n.starts_with("palette") || n.starts_with("bitmap") || n.starts_with("portrait") {
                "BMP"
            } else if n.starts_with("table") || n.contains("2da") {
                "2DA"
            } else if n.starts_with("worldmap") {
                "WMP"
            } else if n.starts_with("music") {
                "MUS"
            } else if n.starts_with("bam") || n.starts_with("icon") {
                "BAM"
            } else if n.starts_with("parchment") || n.starts_with("mos") {
                "MOS"
            } else {
                ""
            }
        }
        ParamType::Integer => {
            if n.starts_with("strref") || n.ends_with("strref") || n.contains("stringref") {
                "TLK"
            } else if ids_ref == Some("spell") || n.starts_with("spellres") {
                "SPL"
            } else {
                ""
            }
        }
        _ => "",
    };
    split_spec(spec)
}

fn split_spec(spec: &str) -> Vec<String> {
    spec.split(':')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn annotate(function: &mut Function, variant: &VariantConfig) {
    let param_count = function.parameters.len();
    let mut seen: HashMap<ParamType, usize> = HashMap::new();
    let mut slot = 0usize;
    let mut part = 0usize;

    for param in &mut function.parameters {
        let index = seen.entry(param.param_type).or_insert(0);
        let spec = variant.resource_type_for(function.kind, function.id, param.param_type, *index);
        *index += 1;

        param.resource_types = match spec {
            Some(spec) => split_spec(spec),
            None => derive_resource_types(&param.name, param.param_type, param.ids_ref.as_deref()),
        };

        if param.param_type == ParamType::String {
            if variant.is_combined_string(function.id, slot, param_count) {
                param.combined_string = true;
                param.colon_separated = variant.is_colon_separated(function.id, slot, param_count);
                part += 1;
                if part == 2 {
                    slot += 1;
                    part = 0;
                }
            } else {
                slot += 1;
            }
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// All trigger or all action signatures of one game.
#[derive(Debug, Clone)]
pub struct Signatures {
    kind: FunctionKind,
    dialect: Dialect,
    by_id: HashMap<u32, SmallVec<[Function; 2]>>,
    by_name: HashMap<String, (u32, usize)>,
}

impl Signatures {
    pub fn new(kind: FunctionKind, dialect: Dialect) -> Self {
        Self { kind, dialect, by_id: HashMap::new(), by_name: HashMap::new() }
    }

    /// Builds the registry from definition lines followed by the variant's
    /// hardcoded extras. Lines that do not parse are skipped.
    pub fn load<I, S>(lines: I, kind: FunctionKind, variant: &VariantConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sigs = Signatures::new(kind, variant.dialect);
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            match parse_signature_line(line, kind) {
                Some(mut f) => {
                    annotate(&mut f, variant);
                    sigs.insert(f, false);
                }
                None => debug!("skipping {} signature line `{}`", kind, line),
            }
        }
        for line in variant.extra_signatures(kind) {
            if let Some(mut f) = parse_signature_line(line, kind) {
                annotate(&mut f, variant);
                sigs.insert(f, true);
            }
        }
        sigs
    }

    pub fn load_file(path: &Path, kind: FunctionKind, variant: &VariantConfig) -> Result<Self> {
        let bytes = fs::read(path)?;
        let text = crate::bcsfile::decode_text(&bytes);
        let sigs = Self::load(text.lines(), kind, variant);
        info!("loaded {} {} signatures from {}", sigs.len(), kind, path.display());
        Ok(sigs)
    }

    /// Adds `f` unless an identical signature is already present. `prefer_name`
    /// lets the function take over its name in the lookup index. A dropped
    /// duplicate under another name still resolves to the retained one.
    pub fn insert(&mut self, f: Function, prefer_name: bool) -> bool {
        let key = f.name.to_ascii_lowercase();
        let set = self.by_id.entry(f.id).or_default();
        if let Some(existing) = set.iter().position(|g| g.same_signature(&f)) {
            self.by_name.entry(key).or_insert((f.id, existing));
            return false;
        }
        let pos = (f.id, set.len());
        set.push(f);
        if prefer_name {
            self.by_name.insert(key, pos);
        } else {
            self.by_name.entry(key).or_insert(pos);
        }
        true
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn len(&self) -> usize {
        self.by_id.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn functions_by_id(&self, id: u32) -> &[Function] {
        self.by_id.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn function_by_name(&self, name: &str, exact: bool) -> Option<&Function> {
        let &(id, idx) = self.by_name.get(&name.to_ascii_lowercase())?;
        let f = self.by_id.get(&id)?.get(idx)?;
        (!exact || f.name == name).then_some(f)
    }

    /// True when any signature registered under `id` redirects to another target.
    pub fn is_override_id(&self, id: u32) -> bool {
        self.functions_by_id(id).iter().any(Function::is_override)
    }

    /// Every signature, ordered by id then registration order.
    pub fn functions(&self) -> Vec<&Function> {
        let mut ids: Vec<_> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .flat_map(|id| self.by_id[&id].iter())
            .collect()
    }
}

// ── Caching ───────────────────────────────────────────────────────────────────

/// Process-lifetime memo of loaded signature tables, keyed by resource name and kind.
///
/// Entries are never mutated; `clear` drops them so the next access rebuilds.
#[derive(Debug, Default)]
pub struct SignatureCache {
    entries: HashMap<(String, FunctionKind), Arc<Signatures>>,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load<F>(&mut self, resource: &str, kind: FunctionKind, variant: &VariantConfig, source: F) -> Result<Arc<Signatures>>
    where
        F: FnOnce() -> Result<String>,
    {
        let key = (resource.to_ascii_uppercase(), kind);
        if let Some(sigs) = self.entries.get(&key) {
            return Ok(Arc::clone(sigs));
        }
        let text = source()?;
        let sigs = Arc::new(Signatures::load(text.lines(), kind, variant));
        info!("cached {} {} signatures for {}", sigs.len(), kind, key.0);
        self.entries.insert(key, Arc::clone(&sigs));
        Ok(sigs)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only services shared by the compiler and the decompiler.
#[derive(Debug, Clone)]
pub struct ScriptRegistry {
    pub variant: &'static VariantConfig,
    pub triggers: Arc<Signatures>,
    pub actions: Arc<Signatures>,
}

impl ScriptRegistry {
    pub fn new(variant: &'static VariantConfig, triggers: Arc<Signatures>, actions: Arc<Signatures>) -> Self {
        Self { variant, triggers, actions }
    }

    pub fn from_sources(dialect: Dialect, trigger_lines: &str, action_lines: &str) -> Self {
        let variant = VariantConfig::get(dialect);
        Self {
            variant,
            triggers: Arc::new(Signatures::load(trigger_lines.lines(), FunctionKind::Trigger, variant)),
            actions: Arc::new(Signatures::load(action_lines.lines(), FunctionKind::Action, variant)),
        }
    }

    pub fn signatures(&self, kind: FunctionKind) -> &Signatures {
        match kind {
            FunctionKind::Trigger => &self.triggers,
            FunctionKind::Action  => &self.actions,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.variant.dialect
    }
}
