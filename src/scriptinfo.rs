// Per-game script dialect tables.
//
// Three root layouts exist (7-field objects for the BG1/IWD family, 9-field
// objects for Torment, 10-field objects for IWD2). BG2 and the Enhanced
// Editions are derived by copying an earlier table and applying corrections.

use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::OnceLock,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::BcsError,
    signatures::{FunctionKind, ParamType},
};

// ── Dialects ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Bg1,
    Bg2,
    Iwd,
    Pst,
    Iwd2,
    Ee,
}

impl Dialect {
    pub const ALL: [Dialect; 6] = [
        Dialect::Bg1,
        Dialect::Bg2,
        Dialect::Iwd,
        Dialect::Pst,
        Dialect::Iwd2,
        Dialect::Ee,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Bg1  => "bg1",
            Dialect::Bg2  => "bg2",
            Dialect::Iwd  => "iwd",
            Dialect::Pst  => "pst",
            Dialect::Iwd2 => "iwd2",
            Dialect::Ee   => "ee",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = BcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BcsError::UnknownDialect(s.to_string()))
    }
}

// ── Combined string masks ─────────────────────────────────────────────────────
//
// Low 16 bits, one nibble each: slot 0 combined, slot 1 combined,
// slot 0 colon-separated, slot 1 colon-separated.
// High 16 bits: required parameter count, 0 = any.

const MASK_NIBBLE_BITS: u32 = 4;
const MASK_COLON_SHIFT: u32 = 8;

fn mask_applies(mask: u32, param_count: usize) -> bool {
    let count = (mask >> 16) as usize;
    count == 0 || count == param_count
}

fn mask_nibble(mask: u32, shift: u32) -> bool {
    (mask >> shift) & 0xF != 0
}

// ── Variant configuration ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverrideKey {
    pub kind: FunctionKind,
    pub id: u32,
    pub param_type: ParamType,
    pub index: usize,
}

impl OverrideKey {
    pub fn new(kind: FunctionKind, id: u32, param_type: ParamType, index: usize) -> Self {
        Self { kind, id, param_type, index }
    }
}

#[derive(Debug, Clone)]
pub struct VariantConfig {
    pub dialect: Dialect,
    object_field_order: Vec<&'static str>,
    global_scope_names: Vec<&'static str>,
    resource_type_overrides: HashMap<OverrideKey, &'static str>,
    combined_string_masks: HashMap<u32, u32>,
    param_comment_start: HashMap<u32, usize>,
    extra_signatures: Vec<(FunctionKind, &'static str)>,
    trigger_int_slots: usize,
    trigger_has_point: bool,
    object_has_region: bool,
}

impl VariantConfig {
    /// Built-in table for `dialect`, constructed once per process.
    pub fn get(dialect: Dialect) -> &'static VariantConfig {
        static VARIANTS: OnceLock<HashMap<Dialect, VariantConfig>> = OnceLock::new();
        let variants = VARIANTS.get_or_init(build_variants);
        &variants[&dialect]
    }

    pub fn object_field_order(&self) -> &[&'static str] {
        &self.object_field_order
    }

    /// Exact six character, case-insensitive scope match (`GLOBAL`, `LOCALS`, ...).
    pub fn is_global_scope(&self, name: &str) -> bool {
        name.len() == 6
            && self.global_scope_names.iter().any(|s| s.eq_ignore_ascii_case(name))
    }

    pub fn resource_type_for(&self, kind: FunctionKind, id: u32, param_type: ParamType, index: usize) -> Option<&'static str> {
        self.resource_type_overrides
            .get(&OverrideKey::new(kind, id, param_type, index))
            .copied()
    }

    pub fn is_combined_string(&self, id: u32, pos: usize, param_count: usize) -> bool {
        self.slot_flag(id, pos, param_count, 0)
    }

    pub fn is_colon_separated(&self, id: u32, pos: usize, param_count: usize) -> bool {
        self.slot_flag(id, pos, param_count, MASK_COLON_SHIFT)
    }

    fn slot_flag(&self, id: u32, pos: usize, param_count: usize, base_shift: u32) -> bool {
        if pos > 1 {
            return false;
        }
        match self.combined_string_masks.get(&id) {
            Some(&mask) if mask_applies(mask, param_count) => {
                mask_nibble(mask, base_shift + pos as u32 * MASK_NIBBLE_BITS)
            }
            _ => false,
        }
    }

    pub fn comment_allowed(&self, id: u32, param_index: usize) -> bool {
        self.param_comment_start
            .get(&id)
            .is_none_or(|&start| param_index >= start)
    }

    pub fn extra_signatures(&self, kind: FunctionKind) -> impl Iterator<Item = &'static str> + '_ {
        self.extra_signatures
            .iter()
            .filter(move |(k, _)| *k == kind)
            .map(|(_, line)| *line)
    }

    /// Numeric slots in a trigger record: 4 for Torment, 3 elsewhere.
    pub fn trigger_int_slots(&self) -> usize {
        self.trigger_int_slots
    }

    pub fn trigger_has_point(&self) -> bool {
        self.trigger_has_point
    }

    pub fn object_has_region(&self) -> bool {
        self.object_has_region
    }

    fn derive(&self, dialect: Dialect) -> VariantConfig {
        let mut copy = self.clone();
        copy.dialect = dialect;
        copy
    }

    fn set_override(&mut self, kind: FunctionKind, id: u32, param_type: ParamType, index: usize, spec: &'static str) {
        self.resource_type_overrides
            .insert(OverrideKey::new(kind, id, param_type, index), spec);
    }

    fn remove_override(&mut self, kind: FunctionKind, id: u32, param_type: ParamType, index: usize) {
        self.resource_type_overrides
            .remove(&OverrideKey::new(kind, id, param_type, index));
    }
}

// ── Built-in tables ───────────────────────────────────────────────────────────

use FunctionKind::{Action as A, Trigger as T};
use ParamType::{Integer as I, String as S};

const FIELDS_7: [&str; 7] = ["EA", "GENERAL", "RACE", "CLASS", "SPECIFIC", "GENDER", "ALIGN"];
const FIELDS_9: [&str; 9] = ["EA", "FACTION", "TEAM", "GENERAL", "RACE", "CLASS", "SPECIFIC", "GENDER", "ALIGN"];
const FIELDS_10: [&str; 10] = [
    "EA", "GENERAL", "RACE", "CLASS", "SPECIFIC", "GENDER", "ALIGNMNT", "SUBRACE", "AVCLASS", "CLASSMSK",
];

// Signatures the engine understands but the shipped IDS files omit or get wrong.
const EXTRA_COMMON: [(FunctionKind, &str); 2] = [
    (T, "0x4089 OR(I:OrCount*)"),
    (A, "1 ActionOverride(O:Actor*,A:Action*)"),
];

fn base_7field() -> VariantConfig {
    let mut cfg = VariantConfig {
        dialect: Dialect::Bg1,
        object_field_order: FIELDS_7.to_vec(),
        global_scope_names: vec!["GLOBAL", "LOCALS"],
        resource_type_overrides: HashMap::new(),
        combined_string_masks: HashMap::new(),
        param_comment_start: HashMap::new(),
        extra_signatures: EXTRA_COMMON.to_vec(),
        trigger_int_slots: 3,
        trigger_has_point: false,
        object_has_region: false,
    };

    // Global / GlobalGT / GlobalLT / GlobalTimer checks
    for id in [0x4034, 0x4035, 0x4036, 0x4068, 0x4069] {
        cfg.combined_string_masks.insert(id, 0x0001);
    }
    // SetGlobal / IncrementGlobal / SetGlobalTimer
    for id in [30, 109, 115] {
        cfg.combined_string_masks.insert(id, 0x0001);
    }

    cfg.set_override(T, 0x401F, S, 0, "ITM");     // HasItem
    cfg.set_override(T, 0x4020, S, 0, "ARE");     // AreaCheck
    cfg.set_override(A, 7, S, 0, "CRE");          // CreateCreature
    cfg.set_override(A, 40, S, 0, "DLG");         // StartDialog
    cfg.set_override(A, 97, S, 0, "ITM");         // DropItem
    cfg.set_override(A, 106, S, 0, "WAV");        // PlaySound
    cfg.set_override(A, 111, S, 0, "MVE");        // StartMovie
    cfg.set_override(A, 31, I, 0, "SPL");         // Spell
    cfg.set_override(A, 95, I, 0, "SPL");         // SpellPoint
    cfg.set_override(A, 174, I, 0, "TLK");        // DisplayString
    cfg
}

fn bg2(bg1: &VariantConfig) -> VariantConfig {
    let mut cfg = bg1.derive(Dialect::Bg2);
    cfg.global_scope_names.push("MYAREA");

    // CreateCreatureAtLocation: "GLOBALname" in slot 0, creature in slot 1
    cfg.combined_string_masks.insert(249, 0x0001);
    cfg.param_comment_start.insert(249, 2);
    cfg.set_override(A, 249, S, 2, "CRE");

    // SetTokenGlobal
    cfg.combined_string_masks.insert(325, 0x0001);
    // RealSetGlobalTimer
    cfg.combined_string_masks.insert(268, 0x0001);

    // ChangeAnimation takes a creature, not an item
    cfg.set_override(A, 151, S, 0, "CRE");
    cfg
}

fn ee(bg2: &VariantConfig) -> VariantConfig {
    let mut cfg = bg2.derive(Dialect::Ee);
    cfg.object_has_region = true;
    cfg.extra_signatures.push((T, "0x40E0 NextTriggerObject(O:Object*)"));
    cfg.extra_signatures.push((T, "0x40E0 TriggerOverride(O:Object*,T:Trigger*)"));

    // SetTokenGlobal stores "area:name" in the enhanced engine
    cfg.combined_string_masks.insert(325, 0x0101);

    cfg.set_override(A, 111, S, 0, "WBM:MVE");
    cfg.remove_override(A, 151, S, 0);
    cfg
}

fn pst() -> VariantConfig {
    let mut cfg = base_7field();
    cfg.dialect = Dialect::Pst;
    cfg.object_field_order = FIELDS_9.to_vec();
    cfg.global_scope_names = vec!["GLOBAL", "LOCALS", "KAPUTZ"];
    cfg.trigger_int_slots = 4;

    // Torment ships a second, two argument Global at the same id
    cfg.combined_string_masks.insert(0x4034, 0x0003_0001);
    cfg.remove_override(A, 95, I, 0);
    cfg
}

fn iwd2() -> VariantConfig {
    let mut cfg = base_7field();
    cfg.dialect = Dialect::Iwd2;
    cfg.object_field_order = FIELDS_10.to_vec();
    cfg.global_scope_names.push("MYAREA");
    cfg.trigger_has_point = true;
    cfg.object_has_region = true;
    cfg.set_override(A, 111, S, 0, "MVE");
    cfg
}

fn build_variants() -> HashMap<Dialect, VariantConfig> {
    let bg1 = base_7field();
    let iwd = {
        let mut cfg = bg1.derive(Dialect::Iwd);
        cfg.object_has_region = true;
        cfg
    };
    let bg2 = bg2(&bg1);
    let ee = ee(&bg2);

    [bg1, bg2, iwd, pst(), iwd2(), ee]
        .into_iter()
        .map(|cfg| (cfg.dialect, cfg))
        .collect()
}
