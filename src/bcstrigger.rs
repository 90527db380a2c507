use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    bcsobject::{Object, Point, EMPTY_OBJECT},
    bcsrecord::{logical_string_usage, parse_record, quote, split_strings, Arg, Field, FieldType, SlotUsage, TokenCursor},
    scriptinfo::VariantConfig,
    signatures::{Function, ParamType},
};

pub const TRIGGER_INTS: usize = 4;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TriggerFlags: u32 {
        const NEGATE = 0x1;
    }
}

// ── Record layout ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Id,
    Int(usize),
    Flags,
    Point,
    Str(usize),
    Object,
}

impl Slot {
    fn field_type(self) -> FieldType {
        match self {
            Slot::Id | Slot::Int(_) | Slot::Flags => FieldType::Integer,
            Slot::Point => FieldType::Point,
            Slot::Str(_) => FieldType::String,
            Slot::Object => FieldType::Object,
        }
    }
}

// id int0 flags int1 int2 [int3] [point] str0 str1 object
fn layout(variant: &VariantConfig) -> Vec<Slot> {
    let mut slots = vec![Slot::Id, Slot::Int(0), Slot::Flags];
    slots.extend((1..variant.trigger_int_slots()).map(Slot::Int));
    if variant.trigger_has_point() {
        slots.push(Slot::Point);
    }
    slots.extend([Slot::Str(0), Slot::Str(1), Slot::Object]);
    slots
}

// ── Trigger ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: u32,
    pub flags: TriggerFlags,
    pub numeric: [i64; TRIGGER_INTS],
    pub object: Object,
    pub point: Point,
    pub strings: [String; 2],
    /// Trigger redirected by this one (`TriggerOverride`), emitted right after it.
    pub override_child: Option<Box<Trigger>>,
}

impl Trigger {
    pub fn new(id: u32) -> Self {
        Self { id, ..Self::default() }
    }

    pub fn is_negated(&self) -> bool {
        self.flags.contains(TriggerFlags::NEGATE)
    }

    pub fn set_negated(&mut self, negated: bool) {
        self.flags.set(TriggerFlags::NEGATE, negated);
    }

    /// Reads a trigger body; the opening `TR` has already been consumed.
    pub fn parse(cursor: &mut TokenCursor<'_>, variant: &VariantConfig) -> Trigger {
        let slots = layout(variant);
        let code: Vec<_> = slots.iter().map(|s| s.field_type()).collect();
        let mut trigger = Trigger::default();
        parse_record(cursor, &code, "TR", variant, |index, field| match (slots[index], field) {
            (Slot::Id, Field::Integer(v)) => trigger.id = u32::try_from(v).unwrap_or_default(),
            (Slot::Int(i), Field::Integer(v)) => trigger.numeric[i] = v,
            (Slot::Flags, Field::Integer(v)) => {
                trigger.flags = TriggerFlags::from_bits_retain(v as u32)
            }
            (Slot::Point, Field::Point(p)) => trigger.point = p,
            (Slot::Str(i), Field::String(s)) => trigger.strings[i] = s,
            (Slot::Object, Field::Object(o)) => trigger.object = o,
            _ => {}
        });
        trigger
    }

    /// Bytecode for this trigger followed by its override child, if any.
    pub fn to_code(&self, variant: &VariantConfig) -> String {
        let mut fields = Vec::new();
        for slot in layout(variant) {
            match slot {
                Slot::Id => fields.push(self.id.to_string()),
                Slot::Int(i) => fields.push(self.numeric[i].to_string()),
                Slot::Flags => fields.push(self.flags.bits().to_string()),
                Slot::Point => fields.push(self.point.to_string()),
                Slot::Str(i) => fields.push(quote(&self.strings[i])),
                Slot::Object => {}
            }
        }
        let mut out = format!("TR\n{} {}TR\n", fields.join(" "), self.object.to_code(variant));
        if let Some(child) = &self.override_child {
            out.push_str(&child.to_code(variant));
        }
        out
    }

    pub fn usage(&self) -> SlotUsage {
        SlotUsage {
            integers: self.numeric.iter().map(|&v| v != 0).collect(),
            objects: vec![!self.object.is_empty()],
            points: vec![!self.point.is_zero()],
        }
    }

    /// Picks the signature that best explains the populated slots.
    ///
    /// Per type the score is how many used values the signature cannot hold;
    /// lowest worst score wins, then lowest total, then the shortest signature.
    pub fn matching_function<'a>(&self, candidates: &'a [Function]) -> Option<&'a Function> {
        match candidates {
            [] => None,
            [only] => Some(only),
            _ => {
                let usage = self.usage();
                candidates.iter().min_by_key(|f| {
                    let used_strings = SlotUsage::count(&logical_string_usage(f, &self.strings));
                    let scores = [
                        SlotUsage::count(&usage.integers).saturating_sub(f.count(ParamType::Integer)),
                        used_strings.saturating_sub(f.count(ParamType::String)),
                        SlotUsage::count(&usage.objects).saturating_sub(f.count(ParamType::Object)),
                        SlotUsage::count(&usage.points).saturating_sub(f.count(ParamType::Point)),
                    ];
                    let worst = scores.iter().copied().max().unwrap_or(0);
                    let total: usize = scores.iter().sum();
                    (worst, total, f.parameters.len())
                })
            }
        }
    }

    /// Values for each declared parameter of `function`, in declaration order.
    pub fn arguments<'a>(&'a self, function: &Function) -> Vec<Arg<'a>> {
        let mut strings = split_strings(function, &self.strings).0.into_iter();
        let mut ints = self.numeric.iter();
        let mut objects = 0;
        let mut points = 0;

        function.parameters.iter().map(|p| match p.param_type {
            ParamType::Integer => Arg::Integer(ints.next().copied().unwrap_or(0)),
            ParamType::String => Arg::String(strings.next().unwrap_or_default()),
            ParamType::Object => {
                objects += 1;
                Arg::Object(if objects == 1 { &self.object } else { &EMPTY_OBJECT })
            }
            ParamType::Point => {
                points += 1;
                Arg::Point(if points == 1 { self.point } else { Point::default() })
            }
            ParamType::Trigger | ParamType::Action => Arg::Nested,
        }).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scriptinfo::Dialect,
        signatures::{FunctionKind, Signatures},
    };

    fn sigs(text: &str) -> Signatures {
        Signatures::load(text.lines(), FunctionKind::Trigger, VariantConfig::get(Dialect::Bg2))
    }

    #[test]
    fn parses_minimal_trigger() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let mut cursor = TokenCursor::new("TR\n0 0 0 0 \"\" \"\" OB\n0 0 0 0 0 0 0 0 0 OB\nTR\n");
        assert!(cursor.accept("TR"));
        let t = Trigger::parse(&mut cursor, variant);
        assert_eq!(t.id, 0);
        assert!(!t.is_negated());
        assert!(t.object.is_empty());
        assert!(cursor.at_end());
    }

    #[test]
    fn parses_negation_and_strings() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let text = "16436 1 1 0 0 \"GLOBALvar\" \"\" OB\n0 0 0 0 0 0 0 0 0 0 0 0 \"\"OB\nTR\n";
        let mut cursor = TokenCursor::new(text);
        let t = Trigger::parse(&mut cursor, variant);
        assert_eq!(t.id, 0x4034);
        assert!(t.is_negated());
        assert_eq!(t.numeric[0], 1);
        assert_eq!(t.strings[0], "GLOBALvar");
    }

    #[test]
    fn code_round_trip_per_variant() {
        for dialect in [Dialect::Bg2, Dialect::Pst, Dialect::Iwd2] {
            let variant = VariantConfig::get(dialect);
            let mut t = Trigger::new(0x4034);
            t.set_negated(true);
            t.numeric = [5, 6, 7, if dialect == Dialect::Pst { 8 } else { 0 }];
            if variant.trigger_has_point() {
                t.point = Point::new(3, 4);
            }
            t.strings[0] = "LOCALSfoo bar".into();
            t.object.name = "Viconia".into();
            let code = t.to_code(variant);
            let mut cursor = TokenCursor::new(&code);
            assert!(cursor.accept("TR"));
            assert_eq!(Trigger::parse(&mut cursor, variant), t, "{dialect}");
        }
    }

    #[test]
    fn bg2_layout() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let mut t = Trigger::new(0x4000);
        t.set_negated(true);
        assert_eq!(
            t.to_code(variant),
            "TR\n16384 0 1 0 0 \"\" \"\" OB\n0 0 0 0 0 0 0 0 0 0 0 0 \"\"OB\nTR\n"
        );
    }

    #[test]
    fn unknown_flag_bits_survive() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let mut cursor = TokenCursor::new("16384 0 3 0 0 \"\" \"\" OB\n\"\"OB\nTR\n");
        let t = Trigger::parse(&mut cursor, variant);
        assert!(t.is_negated());
        assert_eq!(t.flags.bits(), 3);
    }

    #[test]
    fn single_candidate_always_wins() {
        let s = sigs("0x4000 True()");
        let mut t = Trigger::new(0x4000);
        t.numeric = [1, 2, 3, 0];
        t.strings[0] = "junk".into();
        assert_eq!(t.matching_function(s.functions_by_id(0x4000)).unwrap().name, "True");
    }

    #[test]
    fn picks_signature_covering_used_slots() {
        let s = sigs("0x4050 Short(O:Object*)\n0x4050 Long(O:Object*,I:Value*,S:Name*)\n");
        let set = s.functions_by_id(0x4050);

        let mut t = Trigger::new(0x4050);
        t.object.name = "x".into();
        assert_eq!(t.matching_function(set).unwrap().name, "Short");

        t.numeric[0] = 4;
        assert_eq!(t.matching_function(set).unwrap().name, "Long");
    }

    #[test]
    fn tie_breaks_on_total_then_size() {
        let s = sigs("0x4051 A(I:X*)\n0x4051 B(S:Y*)\n0x4051 C(I:X*,S:Y*,I:Z*)\n");
        let set = s.functions_by_id(0x4051);
        let mut t = Trigger::new(0x4051);
        t.numeric[0] = 1;
        t.strings[0] = "s".into();
        // A and B each miss one value, only C holds both
        assert_eq!(t.matching_function(set).unwrap().name, "C");

        let t = Trigger::new(0x4051);
        assert_eq!(t.matching_function(set).unwrap().name, "A");
    }

    #[test]
    fn arguments_follow_declaration_order() {
        let s = sigs("0x4034 Global(S:Name*,S:Area*,I:Value*)");
        let f = &s.functions_by_id(0x4034)[0];
        let mut t = Trigger::new(0x4034);
        t.strings[0] = "GLOBALdone".into();
        t.numeric[0] = 2;
        assert_eq!(
            t.arguments(f),
            vec![Arg::String("done".into()), Arg::String("GLOBAL".into()), Arg::Integer(2)]
        );
    }
}
