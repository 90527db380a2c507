use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    bcsrecord::{parse_record, quote, Field, FieldType, TokenCursor},
    scriptinfo::VariantConfig,
};

pub const MAX_TARGETS: usize = 12;
pub const IDENTIFIERS: usize = 5;

// ── Point / Region ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}.{}]", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl Region {
    pub const EMPTY: Region = Region { x: -1, y: -1, w: -1, h: -1 };

    pub fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        *self == Region::EMPTY
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::EMPTY
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}.{}.{}.{}]", self.x, self.y, self.w, self.h)
    }
}

// ── Object ────────────────────────────────────────────────────────────────────

/// All-default object, for arguments a record has no slot for.
pub static EMPTY_OBJECT: Object = Object {
    targets: [0; MAX_TARGETS],
    identifiers: [0; IDENTIFIERS],
    region: Region::EMPTY,
    name: String::new(),
};

/// Object specifier (`OB` block).
///
/// `targets` follow the variant's field order; `identifiers` are OBJECT.IDS
/// values stored innermost first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub targets: [i64; MAX_TARGETS],
    pub identifiers: [i64; IDENTIFIERS],
    pub region: Region,
    pub name: String,
}

impl Object {
    pub fn is_empty(&self) -> bool {
        self.targets.iter().all(|&v| v == 0)
            && self.identifiers.iter().all(|&v| v == 0)
            && self.region.is_empty()
            && self.name.is_empty()
    }

    pub fn has_identifiers(&self) -> bool {
        self.identifiers.iter().any(|&v| v != 0)
    }

    fn parse_code(variant: &VariantConfig) -> Vec<FieldType> {
        let fields = variant.object_field_order().len();
        let mut code = vec![FieldType::Integer; fields + IDENTIFIERS];
        code.push(FieldType::Point);
        code.push(FieldType::String);
        code
    }

    /// Reads an object body; the opening `OB` has already been consumed.
    pub fn parse(cursor: &mut TokenCursor<'_>, variant: &VariantConfig) -> Object {
        let fields = variant.object_field_order().len();
        let code = Self::parse_code(variant);
        let mut obj = Object::default();
        parse_record(cursor, &code, "OB", variant, |slot, field| match field {
            Field::Integer(v) if slot < fields => obj.targets[slot] = v,
            Field::Integer(v) if slot < fields + IDENTIFIERS => obj.identifiers[slot - fields] = v,
            Field::Region(r) => obj.region = r,
            Field::String(s) => obj.name = s,
            _ => {}
        });
        obj
    }

    /// `OB\n<targets> <identifiers> [region] "name"OB\n`
    pub fn to_code(&self, variant: &VariantConfig) -> String {
        let fields = variant.object_field_order().len();
        let mut parts: Vec<String> = self.targets[..fields]
            .iter()
            .chain(self.identifiers.iter())
            .map(|v| v.to_string())
            .collect();
        if variant.object_has_region() {
            parts.push(self.region.to_string());
        }
        parts.push(quote(&self.name));
        format!("OB\n{}OB\n", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scriptinfo::Dialect;

    #[test]
    fn default_is_empty() {
        assert!(Object::default().is_empty());
    }

    #[test]
    fn any_single_field_makes_non_empty() {
        for i in 0..MAX_TARGETS {
            let mut o = Object::default();
            o.targets[i] = 1;
            assert!(!o.is_empty(), "target {i}");
        }
        for i in 0..IDENTIFIERS {
            let mut o = Object::default();
            o.identifiers[i] = 3;
            assert!(!o.is_empty(), "identifier {i}");
        }
        let setters: [fn(&mut Region); 4] = [
            |r| r.x = 0,
            |r| r.y = 5,
            |r| r.w = 10,
            |r| r.h = 0,
        ];
        for set in setters {
            let mut o = Object::default();
            set(&mut o.region);
            assert!(!o.is_empty());
        }
        let o = Object { name: "Imoen".into(), ..Object::default() };
        assert!(!o.is_empty());
    }

    #[test]
    fn parse_bg2_object() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let mut cursor = TokenCursor::new("2 0 0 0 0 0 0 21 0 0 0 0 \"Imoen\"OB\nTR");
        let obj = Object::parse(&mut cursor, variant);
        assert_eq!(obj.targets[0], 2);
        assert_eq!(obj.identifiers[0], 21);
        assert_eq!(obj.name, "Imoen");
        assert_eq!(cursor.peek(), Some("TR"));
    }

    #[test]
    fn parse_short_object_keeps_defaults() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let mut cursor = TokenCursor::new("0 0 0 0 0 0 0 0 0 OB");
        let obj = Object::parse(&mut cursor, variant);
        assert!(obj.is_empty());
        assert!(cursor.at_end());
    }

    #[test]
    fn serialize_per_variant() {
        let mut obj = Object::default();
        obj.targets[0] = 255;
        obj.name = "Gorion".into();
        assert_eq!(
            obj.to_code(VariantConfig::get(Dialect::Bg2)),
            "OB\n255 0 0 0 0 0 0 0 0 0 0 0 \"Gorion\"OB\n"
        );
        assert_eq!(
            obj.to_code(VariantConfig::get(Dialect::Ee)),
            "OB\n255 0 0 0 0 0 0 0 0 0 0 0 [-1.-1.-1.-1] \"Gorion\"OB\n"
        );
        let pst = obj.to_code(VariantConfig::get(Dialect::Pst));
        assert_eq!(pst.split_whitespace().count(), 1 + 9 + 5 + 1);
    }

    #[test]
    fn region_is_parsed_into_object() {
        let variant = VariantConfig::get(Dialect::Ee);
        let mut obj = Object::default();
        obj.region = Region::new(10, 20, 30, 40);
        obj.identifiers[0] = 1;
        let code = obj.to_code(variant);
        let mut cursor = TokenCursor::new(&code);
        assert!(cursor.accept("OB"));
        assert_eq!(Object::parse(&mut cursor, variant), obj);
    }
}
