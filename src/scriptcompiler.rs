// src/scriptcompiler.rs
// BAF syntax tree → BCS bytecode.
//
// The tree comes from the grammar parser (see scriptnode.rs). Each TR / AC /
// OB node is packed into its fixed-slot record and serialized in the active
// game's layout. Problems the engine would tolerate are warnings; structural
// problems drop the offending subtree and are errors.

use tracing::{debug, trace};

use crate::{
    bcsaction::{Action, ACTION_INTS},
    bcsobject::{Object, IDENTIFIERS},
    bcsrecord::join_strings,
    bcstrigger::Trigger,
    error::{BcsError, Result},
    scriptmessage::{Diagnostics, ScriptMessage, SourceToken},
    scriptnode::{NodeKind, ScriptNode},
    signatures::{Function, ParamType, Parameter, ScriptRegistry, SCRIPT_NAME_TYPE},
    symbols::{spell_resref, ResourceLookup},
};

/// Weight written for a response without an explicit `#n`.
pub const DEFAULT_WEIGHT: i64 = 100;

// ── Result ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    pub code: String,
    pub diagnostics: Diagnostics,
}

impl CompileResult {
    pub fn errors(&self) -> impl Iterator<Item = &ScriptMessage> {
        self.diagnostics.errors.iter()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ScriptMessage> {
        self.diagnostics.warnings.iter()
    }

    /// Output with errors is only written when the user insists.
    pub fn can_save(&self, force: bool) -> bool {
        force || !self.diagnostics.has_errors()
    }
}

// ── Per-compile state ─────────────────────────────────────────────────────────

/// Bookkeeping that spans sibling triggers of one condition block.
#[derive(Debug, Default)]
struct CompileState {
    diagnostics: Diagnostics,
    /// Triggers the last `OR()` still expects.
    or_count: i64,
    or_token: SourceToken,
    /// Set while the previous trigger only redirects the next one.
    pending_override: Option<SourceToken>,
}

impl CompileState {
    fn warn(&mut self, token: &SourceToken, text: impl Into<String>) {
        self.diagnostics.warning(token, text);
    }

    fn error(&mut self, token: &SourceToken, text: impl Into<String>) {
        self.diagnostics.error(token, text);
    }
}

fn fill_slots(slots: &mut [i64], values: &[i64]) -> bool {
    for (slot, &v) in slots.iter_mut().zip(values) {
        *slot = v;
    }
    values.len() > slots.len()
}

// ── Compiler ──────────────────────────────────────────────────────────────────

pub struct Compiler<'a> {
    registry: &'a ScriptRegistry,
    resources: &'a dyn ResourceLookup,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a ScriptRegistry, resources: &'a dyn ResourceLookup) -> Self {
        Self { registry, resources }
    }

    /// Compiles a whole script (`SC`) or a bare trigger / action list.
    ///
    /// Only a root of any other kind fails outright; everything else is
    /// reported through the returned diagnostics.
    pub fn compile(&self, root: &ScriptNode) -> Result<CompileResult> {
        let mut state = CompileState::default();
        let mut root = root.clone();
        root.resolve_functions(self.registry, &mut state.diagnostics);

        let code = match root.kind {
            NodeKind::Sc => self.emit_script(&root, &mut state),
            NodeKind::SeqTr => {
                let code = self.emit_triggers(&root, &mut state);
                self.close_condition(&mut state);
                code
            }
            NodeKind::SeqAc => root
                .children
                .iter()
                .filter_map(|c| self.emit_action(c, &mut state))
                .collect(),
            other => {
                return Err(BcsError::Syntax {
                    message: format!("unexpected {other} node at script root"),
                    line: root.token.line,
                    column: root.token.column,
                    expected: [NodeKind::Sc, NodeKind::SeqTr, NodeKind::SeqAc]
                        .iter()
                        .map(|k| k.tag().to_string())
                        .collect(),
                });
            }
        };

        debug!(
            "compiled {} bytes, {} errors, {} warnings",
            code.len(),
            state.diagnostics.errors.len(),
            state.diagnostics.warnings.len()
        );
        Ok(CompileResult { code, diagnostics: state.diagnostics })
    }

    // ── Blocks ────────────────────────────────────────────────────────────────

    fn unexpected(&self, node: &ScriptNode, parent: NodeKind, state: &mut CompileState) {
        state.error(&node.token, format!("unexpected {} inside {}", node.kind, parent));
    }

    fn emit_script(&self, node: &ScriptNode, state: &mut CompileState) -> String {
        let mut out = String::from("SC\n");
        for child in &node.children {
            match child.kind {
                NodeKind::Cr => out.push_str(&self.emit_block(child, state)),
                _ => self.unexpected(child, node.kind, state),
            }
        }
        out.push_str("SC\n");
        out
    }

    fn emit_block(&self, node: &ScriptNode, state: &mut CompileState) -> String {
        let mut out = String::from("CR\n");
        for child in &node.children {
            match child.kind {
                NodeKind::Co => {
                    out.push_str("CO\n");
                    out.push_str(&self.emit_triggers(child, state));
                    out.push_str("CO\n");
                }
                NodeKind::Rs => out.push_str(&self.emit_responses(child, state)),
                _ => self.unexpected(child, node.kind, state),
            }
        }
        self.close_condition(state);
        out.push_str("CR\n");
        out
    }

    fn emit_triggers(&self, node: &ScriptNode, state: &mut CompileState) -> String {
        let variant = self.registry.variant;
        let mut out = String::new();
        for child in &node.children {
            if child.kind != NodeKind::Tr {
                self.unexpected(child, node.kind, state);
                continue;
            }
            if let Some(trigger) = self.build_trigger(child, state, false, false) {
                out.push_str(&trigger.to_code(variant));
            }
        }
        out
    }

    /// Condition boundary: everything an `OR()` or an override trigger
    /// promised must have been delivered by now.
    fn close_condition(&self, state: &mut CompileState) {
        if let Some(token) = state.pending_override.take() {
            state.warn(&token, "override trigger is not followed by a trigger");
        }
        if state.or_count > 0 {
            let token = std::mem::take(&mut state.or_token);
            state.warn(&token, format!("OR() is missing {} trigger(s)", state.or_count));
        }
        state.or_count = 0;
    }

    fn emit_responses(&self, node: &ScriptNode, state: &mut CompileState) -> String {
        self.close_condition(state);
        let mut out = String::from("RS\n");
        for child in &node.children {
            match child.kind {
                NodeKind::Re => out.push_str(&self.emit_response(child, state)),
                _ => self.unexpected(child, node.kind, state),
            }
        }
        out.push_str("RS\n");
        out
    }

    fn emit_response(&self, node: &ScriptNode, state: &mut CompileState) -> String {
        let weight = node.numbers.first().copied().unwrap_or(DEFAULT_WEIGHT);
        let mut out = format!("RE\n{weight}");
        for child in &node.children {
            match child.kind {
                NodeKind::Ac => {
                    if let Some(code) = self.emit_action(child, state) {
                        out.push_str(&code);
                    }
                }
                _ => self.unexpected(child, node.kind, state),
            }
        }
        out.push_str("RE\n");
        out
    }

    // ── Triggers ──────────────────────────────────────────────────────────────

    fn track_condition(&self, node: &ScriptNode, function: &Function, state: &mut CompileState) {
        let redirects_next = self.registry.triggers.is_override_id(function.id)
            && !function.has_param_type(ParamType::Trigger);

        if redirects_next {
            if state.pending_override.is_some() {
                state.warn(&node.token, "consecutive override triggers");
            }
            state.pending_override = Some(node.token.clone());
            return;
        }
        state.pending_override = None;

        if function.is_or() {
            if state.or_count > 0 {
                state.warn(
                    &node.token,
                    format!("nested OR() while {} trigger(s) of the previous OR() are outstanding", state.or_count),
                );
            }
            state.or_count = node.numbers.first().copied().unwrap_or(0);
            state.or_token = node.token.clone();
        } else if state.or_count > 0 {
            state.or_count -= 1;
        }
    }

    fn build_trigger(&self, node: &ScriptNode, state: &mut CompileState, nested: bool, inherited_negation: bool) -> Option<Trigger> {
        let function = node.function.as_ref()?;
        let variant = self.registry.variant;
        trace!("trigger {}", function);

        if !nested {
            self.track_condition(node, function, state);
        }

        let mut trigger = Trigger::new(function.id);
        trigger.set_negated(node.negated || inherited_negation);

        let int_slots = variant.trigger_int_slots();
        if fill_slots(&mut trigger.numeric[..int_slots], &node.numbers) {
            state.warn(&node.token, "too many integer arguments");
        }

        let (strings, overflow) = join_strings::<2>(function, &node.strings);
        trigger.strings = strings;
        if overflow {
            state.warn(&node.token, "too many string arguments");
        }

        if let Some(point) = node.point {
            if variant.trigger_has_point() {
                trigger.point = point;
            } else {
                state.warn(&node.token, "too many point arguments");
            }
        }

        let mut objects = 0;
        for child in &node.children {
            match child.kind {
                NodeKind::Ob => {
                    objects += 1;
                    match objects {
                        1 => trigger.object = self.build_object(child, state),
                        _ => state.warn(&child.token, "too many object arguments"),
                    }
                }
                NodeKind::Tr if function.has_param_type(ParamType::Trigger) && trigger.override_child.is_none() => {
                    if let Some(inner) = self.build_trigger(child, state, true, trigger.is_negated()) {
                        trigger.override_child = Some(Box::new(inner));
                    }
                }
                NodeKind::Tr => state.warn(&child.token, "too many trigger arguments"),
                _ => self.unexpected(child, node.kind, state),
            }
        }
        if function.has_param_type(ParamType::Trigger) && trigger.override_child.is_none() {
            state.warn(&node.token, format!("{} needs a trigger argument", function.name));
        }

        self.check_params(function, node, state);
        Some(trigger)
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    fn emit_action(&self, node: &ScriptNode, state: &mut CompileState) -> Option<String> {
        let action = self.build_action(node, state, None)?;
        Some(action.to_code(self.registry.variant))
    }

    fn build_action(&self, node: &ScriptNode, state: &mut CompileState, override_target: Option<Object>) -> Option<Action> {
        if node.kind != NodeKind::Ac {
            self.unexpected(node, NodeKind::Ac, state);
            return None;
        }
        let function = node.function.as_ref()?;
        trace!("action {}", function);

        if function.is_override() {
            if override_target.is_some() {
                state.error(&node.token, format!("nested {} is not allowed", function.name));
                return None;
            }
            let target = node
                .children_of(NodeKind::Ob)
                .next()
                .map(|ob| self.build_object(ob, state))
                .unwrap_or_default();
            let Some(inner) = node.children_of(NodeKind::Ac).next() else {
                state.error(&node.token, format!("{} without an action", function.name));
                return None;
            };
            return self.build_action(inner, state, Some(target));
        }

        let mut action = Action::new(function.id);
        if let Some(target) = override_target {
            action.objects[0] = target;
        }

        if fill_slots(&mut action.numeric[..ACTION_INTS], &node.numbers) {
            state.warn(&node.token, "too many integer arguments");
        }
        if let Some(point) = node.point {
            action.point = point;
        }

        let (strings, overflow) = join_strings::<2>(function, &node.strings);
        action.strings = strings;
        if overflow {
            state.warn(&node.token, "too many string arguments");
        }

        let mut slots = action.objects[1..].iter_mut();
        for child in &node.children {
            match child.kind {
                NodeKind::Ob => {
                    let object = self.build_object(child, state);
                    match slots.next() {
                        Some(slot) => *slot = object,
                        None => state.warn(&child.token, "too many object arguments"),
                    }
                }
                _ => self.unexpected(child, node.kind, state),
            }
        }

        self.check_params(function, node, state);
        Some(action)
    }

    // ── Objects ───────────────────────────────────────────────────────────────

    fn build_object(&self, node: &ScriptNode, state: &mut CompileState) -> Object {
        let variant = self.registry.variant;
        let fields = variant.object_field_order().len();
        let mut object = Object::default();

        if fill_slots(&mut object.targets[..fields], &node.numbers) {
            state.warn(&node.token, "too many object fields");
        }

        // identifiers arrive outermost first and are stored innermost first
        if node.numbers2.len() > IDENTIFIERS {
            state.warn(&node.token, "too many object identifiers");
        }
        for (slot, &v) in object.identifiers.iter_mut().zip(node.numbers2.iter().rev()) {
            *slot = v;
        }

        let mut names = node.strings.iter();
        if let Some(name) = names.next() {
            object.name = name.clone();
        }
        if names.next().is_some() {
            state.warn(&node.token, "too many string arguments");
        }

        if let Some(region) = node.region {
            if variant.object_has_region() {
                object.region = region;
            } else {
                state.warn(&node.token, format!("object regions are not supported by {}", variant.dialect));
            }
        }

        if !object.name.is_empty() && !self.resources.script_name_exists(&object.name) {
            state.warn(&node.token, format!("unknown script name \"{}\"", object.name));
        }
        object
    }

    // ── Parameter checks ──────────────────────────────────────────────────────

    fn check_params(&self, function: &Function, node: &ScriptNode, state: &mut CompileState) {
        let mut strings = node.strings.iter();
        let mut ints = node.numbers.iter();

        for param in &function.parameters {
            match param.param_type {
                ParamType::String => {
                    let Some(value) = strings.next() else { continue };
                    if value.is_empty() || param.resource_types.is_empty() {
                        continue;
                    }
                    if let Some(problem) = self.check_resource(value, param) {
                        state.warn(&node.token, problem);
                    }
                }
                ParamType::Integer => {
                    let Some(&value) = ints.next() else { continue };
                    if value <= 0 {
                        continue;
                    }
                    if param.has_resource_type("TLK") && !self.resources.strref_valid(value) {
                        state.warn(&node.token, format!("invalid string reference {value}"));
                    }
                    if param.has_resource_type("SPL") {
                        let found = spell_resref(value)
                            .is_some_and(|res| self.resources.resource_exists(&format!("{res}.SPL")));
                        if !found {
                            state.warn(&node.token, format!("spell {value} not found"));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn check_resource(&self, value: &str, param: &Parameter) -> Option<String> {
        if param.has_resource_type(SCRIPT_NAME_TYPE) {
            return (!self.resources.script_name_exists(value))
                .then(|| format!("unknown script name \"{value}\""));
        }
        if self.registry.variant.is_global_scope(value) {
            return None;
        }
        let found = param
            .resource_types
            .iter()
            .any(|ext| self.resources.resource_exists(&format!("{value}.{ext}")));
        (!found).then(|| format!("resource not found: {}.{}", value, param.resource_type_spec()))
    }
}
