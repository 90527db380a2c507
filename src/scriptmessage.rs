use std::{cmp::Ordering, collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

// ── Source positions ──────────────────────────────────────────────────────────

/// Position handle of the source construct a syntax node was parsed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceToken {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub column: usize,
    #[serde(default)]
    pub end_line: usize,
    #[serde(default)]
    pub end_column: usize,
}

impl SourceToken {
    pub fn new(text: impl Into<String>, line: usize, column: usize) -> Self {
        let text = text.into();
        let end_column = column + text.chars().count();
        Self { text, line, column, end_line: line, end_column }
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// A compiler diagnostic or a decompiler lookup notice.
///
/// Messages order by `(line, column, text)`; the end position does not take
/// part in comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptMessage {
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl ScriptMessage {
    pub fn new(text: impl Into<String>, line: usize, column: usize, end_line: usize, end_column: usize) -> Self {
        Self { text: text.into(), line, column, end_line, end_column }
    }

    pub fn at(token: &SourceToken, text: impl Into<String>) -> Self {
        Self::new(text, token.line, token.column, token.end_line, token.end_column)
    }

    fn key(&self) -> (usize, usize, &str) {
        (self.line, self.column, &self.text)
    }
}

impl PartialEq for ScriptMessage {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScriptMessage {}

impl PartialOrd for ScriptMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScriptMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for ScriptMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.line, self.column, self.text)
    }
}

// ── Collections ───────────────────────────────────────────────────────────────

/// Sorted error and warning sets collected during one compilation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub errors: BTreeSet<ScriptMessage>,
    pub warnings: BTreeSet<ScriptMessage>,
}

impl Diagnostics {
    pub fn error(&mut self, token: &SourceToken, text: impl Into<String>) {
        self.errors.insert(ScriptMessage::at(token, text));
    }

    pub fn warning(&mut self, token: &SourceToken, text: impl Into<String>) {
        self.warnings.insert(ScriptMessage::at(token, text));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_uses_line_column_text() {
        let a = ScriptMessage::new("b", 1, 5, 1, 9);
        let b = ScriptMessage::new("a", 2, 0, 2, 1);
        let c = ScriptMessage::new("a", 1, 5, 3, 3);
        let set: BTreeSet<_> = [b.clone(), a.clone(), c.clone()].into_iter().collect();
        let order: Vec<_> = set.iter().map(|m| (m.line, m.text.as_str())).collect();
        assert_eq!(order, vec![(1, "a"), (1, "b"), (2, "a")]);
    }

    #[test]
    fn end_position_is_not_identity() {
        let a = ScriptMessage::new("same", 4, 2, 4, 3);
        let b = ScriptMessage::new("same", 4, 2, 9, 9);
        assert_eq!(a, b);
        let mut diags = Diagnostics::default();
        let token = SourceToken::new("See", 4, 2);
        diags.warning(&token, "same");
        diags.warning(&token, "same");
        assert_eq!(diags.warnings.len(), 1);
        assert!(!diags.has_errors());
    }

    #[test]
    fn token_end_column_follows_text() {
        let token = SourceToken::new("Global", 3, 4);
        assert_eq!(token.end_column, 10);
        assert_eq!(token.end_line, 3);
    }
}
