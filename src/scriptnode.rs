// Syntax tree handed to the compiler by the BAF grammar parser.
//
// The parser lives outside this crate; trees arrive either built in code or
// as RON documents. A node may carry its resolved `Function` or just the
// function `name`, which `resolve_functions` looks up in the registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    bcsobject::{Point, Region},
    error::Result,
    scriptmessage::{Diagnostics, SourceToken},
    signatures::{Function, FunctionKind, ScriptRegistry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Sc,
    Cr,
    Co,
    Rs,
    Re,
    Tr,
    Ac,
    Ob,
    /// Bare trigger list (dialog conditions).
    SeqTr,
    /// Bare action list (dialog actions).
    SeqAc,
}

impl NodeKind {
    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::Sc    => "SC",
            NodeKind::Cr    => "CR",
            NodeKind::Co    => "CO",
            NodeKind::Rs    => "RS",
            NodeKind::Re    => "RE",
            NodeKind::Tr    => "TR",
            NodeKind::Ac    => "AC",
            NodeKind::Ob    => "OB",
            NodeKind::SeqTr => "SEQ_TR",
            NodeKind::SeqAc => "SEQ_AC",
        }
    }

    /// Kind of call a `TR` / `AC` node names.
    pub fn function_kind(self) -> Option<FunctionKind> {
        match self {
            NodeKind::Tr => Some(FunctionKind::Trigger),
            NodeKind::Ac => Some(FunctionKind::Action),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One node of the parsed script.
///
/// Literal lists are per type, in source order: `numbers` for integers,
/// `strings` for logical string arguments, object arguments as `OB`
/// children, nested trigger/action arguments as `TR`/`AC` children.
/// On `OB` nodes `numbers` are the target fields and `numbers2` the
/// identifier calls, outermost first. On `RE` nodes `numbers[0]` is the weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub token: SourceToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<Function>,
    #[serde(default)]
    pub negated: bool,
    #[serde(default)]
    pub numbers: Vec<i64>,
    #[serde(default)]
    pub numbers2: Vec<i64>,
    #[serde(default)]
    pub strings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(default)]
    pub children: Vec<ScriptNode>,
}

impl ScriptNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            token: SourceToken::default(),
            name: None,
            function: None,
            negated: false,
            numbers: Vec::new(),
            numbers2: Vec::new(),
            strings: Vec::new(),
            point: None,
            region: None,
            children: Vec::new(),
        }
    }

    /// A `TR` or `AC` node naming its function.
    pub fn call(kind: NodeKind, name: &str) -> Self {
        let mut node = Self::new(kind);
        node.token = SourceToken::new(name, 0, 0);
        node.name = Some(name.to_string());
        node
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        let text = std::mem::take(&mut self.token.text);
        self.token = SourceToken::new(text, line, column);
        self
    }

    pub fn negate(mut self) -> Self {
        self.negated = true;
        self
    }

    pub fn with_numbers(mut self, numbers: impl IntoIterator<Item = i64>) -> Self {
        self.numbers.extend(numbers);
        self
    }

    pub fn with_identifiers(mut self, numbers: impl IntoIterator<Item = i64>) -> Self {
        self.numbers2.extend(numbers);
        self
    }

    pub fn with_strings<S: Into<String>>(mut self, strings: impl IntoIterator<Item = S>) -> Self {
        self.strings.extend(strings.into_iter().map(Into::into));
        self
    }

    pub fn with_point(mut self, point: Point) -> Self {
        self.point = Some(point);
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_child(mut self, child: ScriptNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = ScriptNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn children_of(&self, kind: NodeKind) -> impl Iterator<Item = &ScriptNode> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    pub fn function_name(&self) -> &str {
        self.function
            .as_ref()
            .map(|f| f.name.as_str())
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    /// Fills `function` on every `TR`/`AC` node that only names it.
    /// Unknown names are reported as errors on the node's token.
    pub fn resolve_functions(&mut self, registry: &ScriptRegistry, diagnostics: &mut Diagnostics) {
        if let (Some(kind), None) = (self.kind.function_kind(), &self.function) {
            match &self.name {
                Some(name) => match registry.signatures(kind).function_by_name(name, false) {
                    Some(f) => self.function = Some(f.clone()),
                    None => diagnostics.error(&self.token, format!("unknown {kind} `{name}`")),
                },
                None => diagnostics.error(&self.token, format!("{} node without a function", self.kind)),
            }
        }
        for child in &mut self.children {
            child.resolve_functions(registry, diagnostics);
        }
    }

    pub fn from_ron(text: &str) -> Result<ScriptNode> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron(&self) -> Result<String> {
        let pretty = ron::ser::PrettyConfig::new().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scriptinfo::Dialect;

    fn registry() -> ScriptRegistry {
        ScriptRegistry::from_sources(Dialect::Bg2, "0x4000 True()\n", "80 Wait(I:Seconds*)\n")
    }

    #[test]
    fn kind_tags_match_serde_names() {
        for kind in [NodeKind::Sc, NodeKind::SeqTr, NodeKind::SeqAc, NodeKind::Ob] {
            let ron = ron::to_string(&kind).unwrap();
            assert_eq!(ron, kind.tag());
        }
    }

    #[test]
    fn resolves_by_name_case_insensitively() {
        let mut tree = ScriptNode::new(NodeKind::SeqAc).with_child(ScriptNode::call(NodeKind::Ac, "WAIT"));
        let mut diags = Diagnostics::default();
        tree.resolve_functions(&registry(), &mut diags);
        assert!(diags.is_clean());
        assert_eq!(tree.children[0].function.as_ref().unwrap().id, 80);
        assert_eq!(tree.children[0].function_name(), "Wait");
    }

    #[test]
    fn unknown_names_are_errors() {
        let mut tree = ScriptNode::new(NodeKind::SeqTr)
            .with_child(ScriptNode::call(NodeKind::Tr, "Nope").at(3, 2));
        let mut diags = Diagnostics::default();
        tree.resolve_functions(&registry(), &mut diags);
        let err = diags.errors.iter().next().unwrap();
        assert_eq!((err.line, err.column), (3, 2));
        assert!(err.text.contains("Nope"));
    }

    #[test]
    fn minimal_ron_document() {
        let text = r#"(
            kind: SEQ_TR,
            children: [
                (kind: TR, name: Some("True"), negated: true),
            ],
        )"#;
        let tree = ScriptNode::from_ron(text).unwrap();
        assert_eq!(tree.kind, NodeKind::SeqTr);
        assert!(tree.children[0].negated);
        assert_eq!(tree.children[0].name.as_deref(), Some("True"));

        let dumped = tree.to_ron().unwrap();
        let again = ScriptNode::from_ron(&dumped).unwrap();
        assert_eq!(again.to_ron().unwrap(), dumped);
    }
}
