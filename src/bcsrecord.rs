// Token-level helpers shared by the TR / AC / OB records.
//
// Records are parsed by classifying each token from its first character and
// handing it to the next slot of the same type in a fixed per-record parse
// code. Tokens that fail to parse are skipped and the slot keeps its default.

use tracing::{debug, trace};

use crate::{
    bcsobject::{Object, Point, Region},
    scriptinfo::VariantConfig,
    signatures::Function,
};

// ── Tokenizer ─────────────────────────────────────────────────────────────────

/// Splits bytecode text into tokens.
///
/// Quoted strings run to the next `"` (no escapes), brackets to the next `]`,
/// and a number glued to a trailing tag (`7OB`, `100AC`) is split in two.
pub fn tokenize(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        match c {
            b'"' => {
                i = match text[i + 1..].find('"') {
                    Some(end) => i + 1 + end + 1,
                    None => bytes.len(),
                };
                out.push(&text[start..i]);
            }
            b'[' => {
                i = match text[i..].find(|ch: char| ch == ']' || ch.is_whitespace()) {
                    Some(end) if bytes[i + end] == b']' => i + end + 1,
                    Some(end) => i + end,
                    None => bytes.len(),
                };
                out.push(&text[start..i]);
            }
            _ => {
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && bytes[i] != b'"'
                    && bytes[i] != b'['
                {
                    i += 1;
                }
                let word = &text[start..i];
                match split_glued_tag(word) {
                    Some((head, tag)) => {
                        out.push(head);
                        out.push(tag);
                    }
                    None => out.push(word),
                }
            }
        }
    }
    out
}

/// Block tags in the order they nest.
pub const TAGS: [&str; 8] = ["SC", "CR", "CO", "TR", "RS", "RE", "AC", "OB"];

// `7OB`, `100AC`
fn split_glued_tag(word: &str) -> Option<(&str, &str)> {
    if word.len() <= 2 || !word.is_char_boundary(word.len() - 2) {
        return None;
    }
    let (head, tag) = word.split_at(word.len() - 2);
    (TAGS.contains(&tag) && looks_numeric(head)).then_some((head, tag))
}

fn looks_numeric(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

// ── Token classification ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    String,
    Point,
    Object,
}

/// Type of a token judged by its first character; `None` for structural tags.
pub fn classify(token: &str) -> Option<FieldType> {
    if token == "OB" {
        return Some(FieldType::Object);
    }
    match token.as_bytes().first()? {
        b'-' | b'0'..=b'9' => Some(FieldType::Integer),
        b'"'               => Some(FieldType::String),
        b'['               => Some(FieldType::Point),
        _                  => None,
    }
}

pub fn parse_int(token: &str) -> Option<i64> {
    token.parse().ok()
}

pub fn parse_string(token: &str) -> Option<String> {
    let inner = token.strip_prefix('"')?;
    Some(inner.strip_suffix('"').unwrap_or(inner).to_string())
}

fn bracket_values(token: &str) -> Option<Vec<i64>> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    inner.split('.').map(|v| v.trim().parse().ok()).collect()
}

pub fn parse_point(token: &str) -> Option<Point> {
    match bracket_values(token)?.as_slice() {
        &[x, y] => Some(Point::new(x, y)),
        _ => None,
    }
}

pub fn parse_region(token: &str) -> Option<Region> {
    match bracket_values(token)?.as_slice() {
        &[x, y, w, h] => Some(Region::new(x, y, w, h)),
        _ => None,
    }
}

pub fn quote(s: &str) -> String {
    format!("\"{s}\"")
}

// ── Cursor ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TokenCursor<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { tokens: tokenize(text), pos: 0 }
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    pub fn next_token(&mut self) -> Option<&'a str> {
        let tok = self.peek()?;
        self.pos += 1;
        Some(tok)
    }

    /// Consumes the next token if it equals `tag`.
    pub fn accept(&mut self, tag: &str) -> bool {
        if self.peek() == Some(tag) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

// ── Record parsing ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Integer(i64),
    String(String),
    Point(Point),
    Region(Region),
    Object(Object),
}

fn next_slot(code: &[FieldType], from: usize, ty: FieldType) -> Option<usize> {
    code.iter()
        .enumerate()
        .skip(from)
        .find(|(_, t)| **t == ty)
        .map(|(i, _)| i)
}

fn parse_field(token: &str, ty: FieldType) -> Option<Field> {
    match ty {
        FieldType::Integer => parse_int(token).map(Field::Integer),
        FieldType::String  => parse_string(token).map(Field::String),
        FieldType::Point   => parse_point(token)
            .map(Field::Point)
            .or_else(|| parse_region(token).map(Field::Region)),
        FieldType::Object  => None,
    }
}

/// Reads the body of a record whose opening tag was already consumed, up to
/// and including `end_tag`. `assign` receives `(slot index in code, value)`.
///
/// Stops without consuming at any other structural tag, so a truncated
/// record does not swallow its neighbours.
pub fn parse_record<F>(cursor: &mut TokenCursor<'_>, code: &[FieldType], end_tag: &str, variant: &VariantConfig, mut assign: F)
where
    F: FnMut(usize, Field),
{
    let mut slot = 0;
    while let Some(token) = cursor.peek() {
        if token == end_tag {
            cursor.next_token();
            return;
        }
        let Some(ty) = classify(token) else {
            debug!("record {} ended early at `{}`", end_tag, token);
            return;
        };
        cursor.next_token();

        if ty == FieldType::Object {
            let object = Object::parse(cursor, variant);
            match next_slot(code, slot, ty) {
                Some(s) => {
                    assign(s, Field::Object(object));
                    slot = s + 1;
                }
                None => debug!("surplus object in {} record", end_tag),
            }
            continue;
        }

        match next_slot(code, slot, ty) {
            Some(s) => {
                match parse_field(token, ty) {
                    Some(value) => {
                        trace!("{} slot {} <- {}", end_tag, s, token);
                        assign(s, value);
                    }
                    None => debug!("skipping malformed field `{}` in {} record", token, end_tag),
                }
                slot = s + 1;
            }
            None => debug!("surplus field `{}` in {} record", token, end_tag),
        }
    }
}

// ── Arguments ─────────────────────────────────────────────────────────────────

/// Value a record holds for one declared parameter of its matched signature.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg<'a> {
    Integer(i64),
    String(String),
    Object(&'a Object),
    Point(Point),
    /// Trigger / action parameter of an override function.
    Nested,
}

/// Per-type usage of a record's physical slots, for overload selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotUsage {
    pub integers: Vec<bool>,
    pub objects: Vec<bool>,
    pub points: Vec<bool>,
}

impl SlotUsage {
    pub fn count(slots: &[bool]) -> usize {
        slots.iter().filter(|&&used| used).count()
    }

    /// Number of leading positions needed to hold every used value.
    pub fn extent(slots: &[bool]) -> usize {
        slots.iter().rposition(|&used| used).map_or(0, |i| i + 1)
    }
}

// ── Combined strings ──────────────────────────────────────────────────────────

fn split_combined(raw: &str, colon: bool) -> (&str, &str) {
    if colon {
        raw.split_once(':').unwrap_or(("", raw))
    } else {
        match raw.char_indices().nth(6) {
            Some((at, _)) => raw.split_at(at),
            None => (raw, ""),
        }
    }
}

/// Logical string arguments of `function` unpacked from the two physical
/// slots, plus the number of physical slots the signature touched.
pub fn split_strings(function: &Function, physical: &[String]) -> (Vec<String>, usize) {
    let mut out = Vec::new();
    let mut slot = 0;
    let mut part = 0;

    for param in function.string_params() {
        if param.combined_string {
            let raw = physical.get(slot).map(String::as_str).unwrap_or("");
            let (prefix, suffix) = split_combined(raw, param.colon_separated);
            if part == 0 {
                out.push(suffix.to_string());
                part = 1;
            } else {
                out.push(prefix.to_string());
                part = 0;
                slot += 1;
            }
        } else {
            if part == 1 {
                slot += 1;
                part = 0;
            }
            out.push(physical.get(slot).cloned().unwrap_or_default());
            slot += 1;
        }
    }
    let touched = if part == 1 { slot + 1 } else { slot };
    (out, touched.min(physical.len()))
}

/// The `index`-th logical string argument of `function`.
pub fn string_param(function: &Function, physical: &[String], index: usize) -> String {
    split_strings(function, physical).0.into_iter().nth(index).unwrap_or_default()
}

/// Logical string usage for overload scoring: the unpacked values followed by
/// any physical slots the signature does not account for.
pub fn logical_string_usage(function: &Function, physical: &[String]) -> Vec<bool> {
    let (values, touched) = split_strings(function, physical);
    values
        .iter()
        .map(|v| !v.is_empty())
        .chain(physical[touched..].iter().map(|v| !v.is_empty()))
        .collect()
}

/// Packs logical string arguments into `N` physical slots. Returns the slots
/// and whether some arguments did not fit.
pub fn join_strings<const N: usize>(function: &Function, logical: &[String]) -> ([String; N], bool) {
    let mut slots: [String; N] = std::array::from_fn(|_| String::new());
    let mut slot = 0;
    let mut part = 0;
    let mut values = logical.iter();
    let mut overflow = false;

    for param in function.string_params() {
        let Some(value) = values.next() else { break };
        if !param.combined_string && part == 1 {
            slot += 1;
            part = 0;
        }
        if slot >= N {
            overflow |= !value.is_empty();
            continue;
        }
        if param.combined_string {
            if part == 0 {
                slots[slot] = if param.colon_separated { format!(":{value}") } else { value.clone() };
                part = 1;
            } else {
                slots[slot] = format!("{value}{}", slots[slot]);
                part = 0;
                slot += 1;
            }
        } else {
            slots[slot] = value.clone();
            slot += 1;
        }
    }
    overflow |= values.any(|v| !v.is_empty());
    (slots, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scriptinfo::Dialect,
        signatures::{FunctionKind, Signatures},
    };

    fn function(line: &str, dialect: Dialect) -> Function {
        let sigs = Signatures::load([line], FunctionKind::Action, VariantConfig::get(dialect));
        let name = line.split(|c| c == ' ' || c == '(').nth(1).unwrap();
        sigs.function_by_name(name, true).unwrap().clone()
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tokenizer_handles_spaces_in_strings_and_glued_tags() {
        let toks = tokenize("AC\n7OB\n0 -1 \"two words\"OB\n[10.20] \"\" AC\n");
        assert_eq!(toks, vec!["AC", "7", "OB", "0", "-1", "\"two words\"", "OB", "[10.20]", "\"\"", "AC"]);
    }

    #[test]
    fn tokenizer_splits_response_weight() {
        assert_eq!(tokenize("RE\n100AC\n"), vec!["RE", "100", "AC"]);
        assert_eq!(tokenize("-1OB XOB"), vec!["-1", "OB", "XOB"]);
    }

    #[test]
    fn tokenizer_keeps_unterminated_string() {
        let toks = tokenize("\"abc def");
        assert_eq!(toks, vec!["\"abc def"]);
        assert_eq!(parse_string(toks[0]).unwrap(), "abc def");
    }

    #[test]
    fn classification_by_first_char() {
        assert_eq!(classify("-5"), Some(FieldType::Integer));
        assert_eq!(classify("12"), Some(FieldType::Integer));
        assert_eq!(classify("\"x\""), Some(FieldType::String));
        assert_eq!(classify("[1.2]"), Some(FieldType::Point));
        assert_eq!(classify("OB"), Some(FieldType::Object));
        assert_eq!(classify("TR"), None);
    }

    #[test]
    fn bracket_values() {
        assert_eq!(parse_point("[3.-4]"), Some(Point::new(3, -4)));
        assert_eq!(parse_region("[-1.-1.-1.-1]"), Some(Region::EMPTY));
        assert_eq!(parse_point("[1.2.3.4]"), None);
        assert_eq!(parse_point("[a.b]"), None);
    }

    #[test]
    fn malformed_field_is_skipped_and_slot_kept_default() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let code = [FieldType::Integer, FieldType::Integer, FieldType::String];
        let mut cursor = TokenCursor::new("5 12x \"s\" XX\n");
        let mut got = Vec::new();
        parse_record(&mut cursor, &code, "XX", variant, |slot, field| got.push((slot, field)));
        assert_eq!(got, vec![(0, Field::Integer(5)), (2, Field::String("s".into()))]);
        assert!(cursor.at_end());
    }

    #[test]
    fn missing_fields_fill_next_slot_of_type() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let code = [FieldType::Integer, FieldType::Integer, FieldType::Integer, FieldType::String];
        let mut cursor = TokenCursor::new("1 \"s\" 7 XX");
        let mut got = Vec::new();
        parse_record(&mut cursor, &code, "XX", variant, |slot, field| got.push((slot, field)));
        // the trailing integer has no slot left after the string
        assert_eq!(got, vec![(0, Field::Integer(1)), (3, Field::String("s".into()))]);
    }

    #[test]
    fn combined_colon_round_trip() {
        let f = function("325 SetTokenGlobal(S:Name*,S:Area*,S:Token*)", Dialect::Ee);
        assert!(f.parameters[0].combined_string && f.parameters[0].colon_separated);
        let (slots, overflow) = join_strings::<2>(&f, &strings(&["AREA01", "foo", "TOK"]));
        assert!(!overflow);
        assert_eq!(slots, ["foo:AREA01".to_string(), "TOK".to_string()]);
        let (logical, touched) = split_strings(&f, &slots);
        assert_eq!(logical, strings(&["AREA01", "foo", "TOK"]));
        assert_eq!(touched, 2);
    }

    #[test]
    fn colon_placeholder_when_prefix_missing() {
        let f = function("325 SetTokenGlobal(S:Name*,S:Area*,S:Token*)", Dialect::Ee);
        let (slots, _) = join_strings::<2>(&f, &strings(&["var", "", "TOK"]));
        assert_eq!(slots[0], ":var");
        assert_eq!(string_param(&f, &slots, 0), "var");
        assert_eq!(string_param(&f, &slots, 1), "");
    }

    #[test]
    fn fixed_prefix_round_trip() {
        let f = function("30 SetGlobal(S:Name*,S:Area*,I:Value*)", Dialect::Bg2);
        let (slots, _) = join_strings::<2>(&f, &strings(&["MyVar", "GLOBAL"]));
        assert_eq!(slots[0], "GLOBALMyVar");
        assert_eq!(slots[1], "");
        assert_eq!(split_strings(&f, &slots).0, strings(&["MyVar", "GLOBAL"]));
    }

    #[test]
    fn fixed_prefix_short_value() {
        let f = function("30 SetGlobal(S:Name*,S:Area*,I:Value*)", Dialect::Bg2);
        let (logical, _) = split_strings(&f, &strings(&["GLOB", ""]));
        assert_eq!(logical, strings(&["", "GLOB"]));
    }

    #[test]
    fn overflowing_strings_are_reported() {
        let f = function("40 StartDialog(S:Dialog*,O:Target*)", Dialect::Bg2);
        let (slots, overflow) = join_strings::<2>(&f, &strings(&["DLG", "extra"]));
        assert_eq!(slots[0], "DLG");
        assert!(overflow);
    }

    #[test]
    fn usage_counts_untouched_slots() {
        let f = function("80 Wait()", Dialect::Bg2);
        let usage = logical_string_usage(&f, &strings(&["x", ""]));
        assert_eq!(usage, vec![true, false]);
    }
}
