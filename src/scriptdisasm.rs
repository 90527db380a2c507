// src/scriptdisasm.rs
// BCS bytecode → BAF source.
//
// Records are read with the same token cursor the record parsers use, the
// matching signature is picked per record, and arguments are rendered with
// IDS symbols and resource comments where the lookups know them. Lookups
// that miss are reported per output line instead of failing.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
    bcsaction::Action,
    bcsobject::Object,
    bcsrecord::{classify, logical_string_usage, parse_int, quote, Arg, FieldType, SlotUsage, TokenCursor},
    bcstrigger::Trigger,
    scriptcompiler::DEFAULT_WEIGHT,
    scriptinfo::Dialect,
    signatures::{Function, ParamType, Parameter, ScriptRegistry, SCRIPT_NAME_TYPE},
    symbols::{spell_resref, ResourceLookup, SymbolLookup},
};

/// IDS tables whose values are bit sets.
const BITMASK_TABLES: [&str; 4] = ["areatype", "bits", "splcast", "state"];

/// Resource type a function's string argument names, by function.
const EXTENSION_HINTS: &[(&str, &str)] = &[
    ("AreaCheck", "ARE"),
    ("AreaCheckObject", "ARE"),
    ("ChangeAIScript", "BCS"),
    ("Contains", "ITM"),
    ("CreateCreature", "CRE"),
    ("CreateCreatureDoor", "CRE"),
    ("CreateCreatureImpassable", "CRE"),
    ("CreateCreatureObject", "CRE"),
    ("CreateCreatureOffScreen", "CRE"),
    ("CreateItem", "ITM"),
    ("DestroyItem", "ITM"),
    ("DropItem", "ITM"),
    ("GiveItemCreate", "ITM"),
    ("HasItem", "ITM"),
    ("LeaveAreaLUA", "ARE"),
    ("PlaySound", "WAV"),
    ("SetDialog", "DLG"),
    ("StartCutScene", "BCS"),
    ("StartDialog", "DLG"),
    ("StartDialogNoSet", "DLG"),
    ("StartMovie", "MVE"),
    ("StartStore", "STO"),
    ("TakePartyItem", "ITM"),
];

fn extension_hint(function: &str, dialect: Dialect) -> Option<&'static str> {
    if dialect == Dialect::Ee && function.eq_ignore_ascii_case("StartMovie") {
        return Some("WBM:MVE");
    }
    EXTENSION_HINTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(function))
        .map(|(_, ext)| *ext)
}

/// True when the record holds more arguments of some type than `base` declares.
fn exceeds(base: &Function, usage: &SlotUsage, strings: &[bool]) -> bool {
    SlotUsage::count(&usage.integers) > base.count(ParamType::Integer)
        || SlotUsage::count(&usage.points) > base.count(ParamType::Point)
        || SlotUsage::count(&usage.objects) > base.count(ParamType::Object)
        || SlotUsage::count(strings) > base.count(ParamType::String)
}

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DecompileResult {
    pub source: String,
    /// `NAME.EXT`, uppercase.
    pub used_resources: BTreeSet<String>,
    pub used_strrefs: BTreeSet<i64>,
    /// 1-based source line → lookup failures on that line.
    pub messages: BTreeMap<usize, String>,
}

#[derive(Debug, Default)]
struct DisasmState {
    lines: Vec<String>,
    used_resources: BTreeSet<String>,
    used_strrefs: BTreeSet<i64>,
    messages: BTreeMap<usize, String>,
    // collected while the current line is rendered
    notes: Vec<String>,
    comments: Vec<String>,
}

impl DisasmState {
    fn note(&mut self, text: String) {
        self.notes.push(text);
    }

    fn comment(&mut self, text: String) {
        self.comments.push(text);
    }

    fn emit(&mut self, indent: usize, text: &str) {
        let mut line = format!("{}{}", "  ".repeat(indent), text);
        if !self.comments.is_empty() {
            line.push_str("  // ");
            line.push_str(&self.comments.join(", "));
            self.comments.clear();
        }
        self.lines.push(line);
        if !self.notes.is_empty() {
            self.messages.insert(self.lines.len(), self.notes.join("; "));
            self.notes.clear();
        }
    }

    fn finish(self) -> DecompileResult {
        let mut source = self.lines.join("\n");
        if !source.is_empty() {
            source.push('\n');
        }
        DecompileResult {
            source,
            used_resources: self.used_resources,
            used_strrefs: self.used_strrefs,
            messages: self.messages,
        }
    }
}

struct Response {
    weight: i64,
    actions: Vec<Action>,
}

// ── Decompiler ────────────────────────────────────────────────────────────────

pub struct Decompiler<'a> {
    registry: &'a ScriptRegistry,
    symbols: &'a dyn SymbolLookup,
    resources: &'a dyn ResourceLookup,
}

impl<'a> Decompiler<'a> {
    pub fn new(registry: &'a ScriptRegistry, symbols: &'a dyn SymbolLookup, resources: &'a dyn ResourceLookup) -> Self {
        Self { registry, symbols, resources }
    }

    /// Decompiles a whole script or a bare run of `TR` / `AC` records.
    /// Never fails; unreadable parts become `// Error:` lines.
    pub fn decompile(&self, code: &str) -> DecompileResult {
        let mut cursor = TokenCursor::new(code);
        let mut state = DisasmState::default();

        while let Some(token) = cursor.peek() {
            match token {
                "SC" => {
                    cursor.next_token();
                    self.script(&mut cursor, &mut state);
                }
                "TR" => {
                    let triggers = self.read_triggers(&mut cursor, None);
                    self.render_triggers(&triggers, 0, &mut state);
                }
                "AC" => {
                    for action in self.read_actions(&mut cursor, None) {
                        let text = self.render_action(&action, &mut state);
                        state.emit(0, &text);
                    }
                }
                other => {
                    cursor.next_token();
                    state.emit(0, &format!("// Error: unexpected token `{other}`"));
                }
            }
        }

        debug!("decompiled {} lines, {} notes", state.lines.len(), state.messages.len());
        state.finish()
    }

    // ── Structure ─────────────────────────────────────────────────────────────

    fn script(&self, cursor: &mut TokenCursor<'_>, state: &mut DisasmState) {
        while let Some(token) = cursor.next_token() {
            match token {
                "CR" => self.block(cursor, state),
                "SC" => return,
                other => state.emit(0, &format!("// Error: unexpected token `{other}` in script")),
            }
        }
    }

    fn block(&self, cursor: &mut TokenCursor<'_>, state: &mut DisasmState) {
        let mut triggers = Vec::new();
        let mut responses = Vec::new();

        while let Some(token) = cursor.next_token() {
            match token {
                "CO" => triggers = self.read_triggers(cursor, Some("CO")),
                "RS" => responses = self.read_responses(cursor),
                "CR" => break,
                other => debug!("skipping `{}` in condition-response block", other),
            }
        }

        state.emit(0, "IF");
        self.render_triggers(&triggers, 1, state);
        state.emit(0, "THEN");
        for response in &responses {
            state.emit(1, &format!("RESPONSE #{}", response.weight));
            for action in &response.actions {
                let text = self.render_action(action, state);
                state.emit(2, &text);
            }
        }
        state.emit(0, "END");
        state.emit(0, "");
    }

    /// `TR` records up to `end` (consumed) or the first other token.
    fn read_triggers(&self, cursor: &mut TokenCursor<'_>, end: Option<&str>) -> Vec<Trigger> {
        let variant = self.registry.variant;
        let mut out = Vec::new();
        while let Some(token) = cursor.peek() {
            if token == "TR" {
                cursor.next_token();
                out.push(Trigger::parse(cursor, variant));
            } else {
                if Some(token) == end {
                    cursor.next_token();
                }
                break;
            }
        }
        out
    }

    fn read_actions(&self, cursor: &mut TokenCursor<'_>, end: Option<&str>) -> Vec<Action> {
        let variant = self.registry.variant;
        let mut out = Vec::new();
        while let Some(token) = cursor.peek() {
            if token == "AC" {
                cursor.next_token();
                out.push(Action::parse(cursor, variant));
            } else {
                if Some(token) == end {
                    cursor.next_token();
                }
                break;
            }
        }
        out
    }

    fn read_responses(&self, cursor: &mut TokenCursor<'_>) -> Vec<Response> {
        let mut out = Vec::new();
        while let Some(token) = cursor.next_token() {
            match token {
                "RE" => {
                    let weight = match cursor.peek() {
                        Some(t) if classify(t) == Some(FieldType::Integer) => {
                            cursor.next_token();
                            parse_int(t).unwrap_or(DEFAULT_WEIGHT)
                        }
                        _ => DEFAULT_WEIGHT,
                    };
                    let actions = self.read_actions(cursor, Some("RE"));
                    out.push(Response { weight, actions });
                }
                "RS" => break,
                other => debug!("skipping `{}` in response set", other),
            }
        }
        out
    }

    // ── Signature selection ───────────────────────────────────────────────────

    fn trigger_function(&self, trigger: &Trigger) -> Option<&'a Function> {
        let candidates = self.registry.triggers.functions_by_id(trigger.id);
        let base = candidates.first()?;
        let strings = logical_string_usage(base, &trigger.strings);
        if candidates.len() == 1 || !exceeds(base, &trigger.usage(), &strings) {
            return Some(base);
        }
        trigger.matching_function(candidates)
    }

    fn action_function(&self, action: &Action) -> Option<&'a Function> {
        let candidates = self.registry.actions.functions_by_id(action.id);
        let base = candidates.first()?;
        let strings = logical_string_usage(base, &action.strings);
        if candidates.len() == 1 || !exceeds(base, &action.usage(), &strings) {
            return Some(base);
        }
        action.matching_function(candidates)
    }

    // ── Triggers ──────────────────────────────────────────────────────────────

    fn render_triggers(&self, triggers: &[Trigger], indent: usize, state: &mut DisasmState) {
        let mut or_remaining = 0i64;
        let mut records = triggers.iter();

        while let Some(trigger) = records.next() {
            let level = indent + usize::from(or_remaining > 0);
            let function = self.trigger_function(trigger);

            // the record after a TriggerOverride is its argument
            let takes_trigger = function.is_some_and(|f| f.has_param_type(ParamType::Trigger));
            let child = if takes_trigger { records.next() } else { None };

            let text = self.render_trigger(trigger, function, child, trigger.is_negated(), state);
            state.emit(level, &text);

            match function {
                Some(f) if f.is_or() => or_remaining = trigger.numeric[0],
                Some(f) if self.registry.triggers.is_override_id(f.id) && !takes_trigger => {}
                _ => or_remaining = (or_remaining - 1).max(0),
            }
        }
    }

    fn render_trigger(
        &self,
        trigger: &Trigger,
        function: Option<&Function>,
        child: Option<&Trigger>,
        negated: bool,
        state: &mut DisasmState,
    ) -> String {
        let Some(function) = function else {
            return format!("// Error: unknown trigger 0x{:04X}", trigger.id);
        };

        let args: Vec<String> = function
            .parameters
            .iter()
            .zip(trigger.arguments(function))
            .enumerate()
            .map(|(index, (param, arg))| match arg {
                Arg::Nested => match child {
                    Some(inner) => {
                        let inner_fn = self.trigger_function(inner);
                        // the nested record carries the outer negation as well
                        let inner_negated = inner.is_negated() && !trigger.is_negated();
                        self.render_trigger(inner, inner_fn, None, inner_negated, state)
                    }
                    None => String::new(),
                },
                other => self.render_arg(function, index, param, other, state),
            })
            .collect();

        format!("{}{}({})", if negated { "!" } else { "" }, function.name, args.join(","))
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    fn render_action(&self, action: &Action, state: &mut DisasmState) -> String {
        let Some(function) = self.action_function(action) else {
            return format!("// Error: unknown action {}", action.id);
        };

        let args: Vec<String> = function
            .parameters
            .iter()
            .zip(action.arguments(function))
            .enumerate()
            .map(|(index, (param, arg))| self.render_arg(function, index, param, arg, state))
            .collect();
        let call = format!("{}({})", function.name, args.join(","));

        match action.override_target() {
            Some(target) => {
                let name = self
                    .registry
                    .actions
                    .function_by_name("ActionOverride", false)
                    .map_or("ActionOverride", |f| f.name.as_str());
                format!("{}({},{})", name, self.render_object(target, state), call)
            }
            None => call,
        }
    }

    // ── Arguments ─────────────────────────────────────────────────────────────

    fn render_arg(&self, function: &Function, index: usize, param: &Parameter, arg: Arg<'_>, state: &mut DisasmState) -> String {
        match arg {
            Arg::Integer(v) => self.render_int(function, index, param, v, state),
            Arg::String(s) => {
                self.note_resource(function, index, param, &s, state);
                quote(&s)
            }
            Arg::Object(o) => self.render_object(o, state),
            Arg::Point(p) => p.to_string(),
            Arg::Nested => String::new(),
        }
    }

    fn render_int(&self, function: &Function, index: usize, param: &Parameter, value: i64, state: &mut DisasmState) -> String {
        let comment = self.registry.variant.comment_allowed(function.id, index);

        if param.has_resource_type("TLK") && value >= 0 {
            state.used_strrefs.insert(value);
            if let Some(text) = self.resources.string_text(value).filter(|_| comment) {
                state.comment(quote(&text));
            }
        }
        if param.has_resource_type("SPL") {
            if let Some(resref) = spell_resref(value) {
                let name = format!("{resref}.SPL");
                if let Some(display) = self.resources.display_name(&name).filter(|_| comment) {
                    state.comment(display);
                }
                state.used_resources.insert(name);
            }
        }

        match &param.ids_ref {
            Some(ids) => self.symbolic(ids, value, state),
            None => value.to_string(),
        }
    }

    /// IDS symbol for `value`, a `|` list of bit symbols for bitmask tables,
    /// else the number itself.
    fn symbolic(&self, ids: &str, value: i64, state: &mut DisasmState) -> String {
        if let Some(name) = self.symbols.symbol(ids, value) {
            return name;
        }

        let is_bitmask = BITMASK_TABLES.iter().any(|t| t.eq_ignore_ascii_case(ids));
        if let Some(bits) = u32::try_from(value).ok().filter(|&b| is_bitmask && b != 0) {
            let mut names = Vec::new();
            let mut residual = 0u32;
            for shift in 0..u32::BITS {
                let mask = 1u32 << shift;
                if bits & mask == 0 {
                    continue;
                }
                match self.symbols.symbol(ids, i64::from(mask)) {
                    Some(name) => names.push(name),
                    None => residual |= mask,
                }
            }
            if !names.is_empty() {
                if residual != 0 {
                    state.note(format!("{}.IDS: no symbol for bits 0x{:X}", ids.to_ascii_uppercase(), residual));
                    names.push(residual.to_string());
                }
                return names.join(" | ");
            }
        }

        state.note(format!("{}.IDS: no symbol for {}", ids.to_ascii_uppercase(), value));
        value.to_string()
    }

    fn note_resource(&self, function: &Function, index: usize, param: &Parameter, value: &str, state: &mut DisasmState) {
        let variant = self.registry.variant;
        if value.is_empty()
            || param.resource_types.is_empty()
            || param.has_resource_type(SCRIPT_NAME_TYPE)
            || variant.is_global_scope(value)
        {
            return;
        }

        let types: Vec<&str> = match extension_hint(&function.name, variant.dialect) {
            Some(spec) => spec.split(':').collect(),
            None => param.resource_types.iter().map(String::as_str).collect(),
        };
        let found = types
            .iter()
            .map(|ext| format!("{}.{}", value.to_ascii_uppercase(), ext))
            .find(|name| self.resources.resource_exists(name));

        match found {
            Some(name) => {
                if variant.comment_allowed(function.id, index) {
                    if let Some(display) = self.resources.display_name(&name) {
                        state.comment(display);
                    }
                }
                state.used_resources.insert(name);
            }
            None => debug!("no resource for `{}` ({})", value, types.join(":")),
        }
    }

    // ── Objects ───────────────────────────────────────────────────────────────

    fn render_object(&self, object: &Object, state: &mut DisasmState) -> String {
        if object.is_empty() {
            return "[ANYONE]".to_string();
        }
        if !object.name.is_empty() {
            return quote(&object.name);
        }

        let region = if object.region.is_empty() { String::new() } else { object.region.to_string() };

        if object.has_identifiers() {
            let identifiers: Vec<i64> = object.identifiers.iter().copied().filter(|&v| v != 0).collect();
            let names: Vec<Option<String>> = identifiers.iter().map(|&v| self.symbols.symbol("object", v)).collect();

            if names.iter().any(Option::is_some) {
                let targets_set = object.targets.iter().any(|&v| v != 0);
                let mut text = if targets_set { self.target_list(object, state) } else { String::new() };
                for (value, name) in identifiers.iter().zip(names) {
                    let name = name.unwrap_or_else(|| {
                        state.note(format!("OBJECT.IDS: no symbol for {value}"));
                        value.to_string()
                    });
                    text = if text.is_empty() { name } else { format!("{name}({text})") };
                }
                return text + &region;
            }
            state.note(format!("OBJECT.IDS: no symbol for {identifiers:?}"));
        }

        self.target_list(object, state) + &region
    }

    /// `[EA.GENERAL.RACE...]` with trailing zero fields dropped.
    fn target_list(&self, object: &Object, state: &mut DisasmState) -> String {
        let fields = self.registry.variant.object_field_order();
        let used = object.targets[..fields.len()]
            .iter()
            .rposition(|&v| v != 0)
            .map_or(0, |i| i + 1);
        if used == 0 {
            return "[ANYONE]".to_string();
        }

        let parts: Vec<String> = fields[..used]
            .iter()
            .zip(&object.targets)
            .map(|(field, &value)| {
                if value == 0 {
                    return "0".to_string();
                }
                let ids = field.to_ascii_lowercase();
                self.symbols.symbol(&ids, value).unwrap_or_else(|| {
                    state.note(format!("{field}.IDS: no symbol for {value}"));
                    value.to_string()
                })
            })
            .collect();
        format!("[{}]", parts.join("."))
    }
}
