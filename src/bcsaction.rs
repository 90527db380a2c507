use serde::{Deserialize, Serialize};

use crate::{
    bcsobject::{Object, Point, EMPTY_OBJECT},
    bcsrecord::{logical_string_usage, parse_record, quote, split_strings, Arg, Field, FieldType, SlotUsage, TokenCursor},
    scriptinfo::VariantConfig,
    signatures::{Function, ParamType},
};

pub const ACTION_OBJECTS: usize = 3;
pub const ACTION_INTS: usize = 3;

// id, three objects, int0 x y int1 int2, two strings
const PARSE_CODE: [FieldType; 11] = [
    FieldType::Integer,
    FieldType::Object,
    FieldType::Object,
    FieldType::Object,
    FieldType::Integer,
    FieldType::Integer,
    FieldType::Integer,
    FieldType::Integer,
    FieldType::Integer,
    FieldType::String,
    FieldType::String,
];

/// Effect call (`AC` block). `objects[0]` is the `ActionOverride` actor and
/// stays empty for plain actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: u32,
    pub objects: [Object; ACTION_OBJECTS],
    pub numeric: [i64; ACTION_INTS],
    pub point: Point,
    pub strings: [String; 2],
}

impl Action {
    pub fn new(id: u32) -> Self {
        Self { id, ..Self::default() }
    }

    pub fn override_target(&self) -> Option<&Object> {
        let actor = &self.objects[0];
        (!actor.is_empty()).then_some(actor)
    }

    /// Reads an action body; the opening `AC` has already been consumed.
    pub fn parse(cursor: &mut TokenCursor<'_>, variant: &VariantConfig) -> Action {
        let mut action = Action::default();
        parse_record(cursor, &PARSE_CODE, "AC", variant, |slot, field| match (slot, field) {
            (0, Field::Integer(v)) => action.id = u32::try_from(v).unwrap_or_default(),
            (1..=3, Field::Object(o)) => action.objects[slot - 1] = o,
            (4, Field::Integer(v)) => action.numeric[0] = v,
            (5, Field::Integer(v)) => action.point.x = v,
            (6, Field::Integer(v)) => action.point.y = v,
            (7 | 8, Field::Integer(v)) => action.numeric[slot - 6] = v,
            (9 | 10, Field::String(s)) => action.strings[slot - 9] = s,
            _ => {}
        });
        action
    }

    pub fn to_code(&self, variant: &VariantConfig) -> String {
        let objects: String = self.objects.iter().map(|o| o.to_code(variant)).collect();
        format!(
            "AC\n{}{}{} {} {} {} {} {} {} AC\n",
            self.id,
            objects,
            self.numeric[0],
            self.point.x,
            self.point.y,
            self.numeric[1],
            self.numeric[2],
            quote(&self.strings[0]),
            quote(&self.strings[1]),
        )
    }

    /// Usage of the argument slots; the override actor is not an argument.
    pub fn usage(&self) -> SlotUsage {
        SlotUsage {
            integers: self.numeric.iter().map(|&v| v != 0).collect(),
            objects: self.objects[1..].iter().map(|o| !o.is_empty()).collect(),
            points: vec![!self.point.is_zero()],
        }
    }

    /// Picks the signature that best explains the populated slots.
    ///
    /// Per type the score is the declared count minus the highest used
    /// position. Signatures that leave a used value uncovered are rejected;
    /// among the rest the tightest worst score wins, then the shortest
    /// signature. With no fitting candidate the first one taking strings is
    /// preferred, then simply the first.
    pub fn matching_function<'a>(&self, candidates: &'a [Function]) -> Option<&'a Function> {
        match candidates {
            [] => return None,
            [only] => return Some(only),
            _ => {}
        }

        let usage = self.usage();
        let shortfall = |declared: usize, used: &[bool]| declared as i64 - SlotUsage::extent(used) as i64;

        let fitting = candidates
            .iter()
            .filter_map(|f| {
                let strings = logical_string_usage(f, &self.strings);
                let scores = [
                    shortfall(f.count(ParamType::Integer), &usage.integers),
                    shortfall(f.count(ParamType::String), &strings),
                    shortfall(f.count(ParamType::Object), &usage.objects),
                    shortfall(f.count(ParamType::Point), &usage.points),
                ];
                scores.iter().all(|&s| s >= 0).then(|| {
                    let worst = scores.iter().copied().max().unwrap_or(0);
                    (f, worst)
                })
            })
            .min_by_key(|&(f, worst)| (worst, f.parameters.len()))
            .map(|(f, _)| f);

        fitting
            .or_else(|| candidates.iter().find(|f| f.has_param_type(ParamType::String)))
            .or_else(|| candidates.first())
    }

    /// Values for each declared parameter of `function`, in declaration order.
    pub fn arguments<'a>(&'a self, function: &Function) -> Vec<Arg<'a>> {
        let mut strings = split_strings(function, &self.strings).0.into_iter();
        let mut ints = self.numeric.iter();
        let mut objects = self.objects[1..].iter();
        let mut points = 0;

        function.parameters.iter().map(|p| match p.param_type {
            ParamType::Integer => Arg::Integer(ints.next().copied().unwrap_or(0)),
            ParamType::String => Arg::String(strings.next().unwrap_or_default()),
            ParamType::Object => Arg::Object(objects.next().unwrap_or(&EMPTY_OBJECT)),
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
        Signatures::load(text.lines(), FunctionKind::Action, VariantConfig::get(Dialect::Bg2))
    }

    const EMPTY_OB: &str = "OB\n0 0 0 0 0 0 0 0 0 0 0 0 \"\"OB\n";

    #[test]
    fn parses_wait_action() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let text = "AC\n80 OB\n0 0 0 0 0 0 0 0 0 OB\nOB\n0 0 0 0 0 0 0 0 0 OB\nOB\n0 0 0 0 0 0 0 0 0 OB\n0 0 0 0 \"\" \"\" AC\n";
        let mut cursor = TokenCursor::new(text);
        assert!(cursor.accept("AC"));
        let a = Action::parse(&mut cursor, variant);
        assert_eq!(a, Action::new(80));
        assert!(cursor.at_end());
    }

    #[test]
    fn serialized_layout() {
        let variant = VariantConfig::get(Dialect::Bg2);
        let mut a = Action::new(30);
        a.numeric = [1, 2, 3];
        a.point = Point::new(10, 20);
        a.strings[0] = "GLOBALfoo".into();
        let expected = format!("AC\n30{EMPTY_OB}{EMPTY_OB}{EMPTY_OB}1 10 20 2 3 \"GLOBALfoo\" \"\" AC\n");
        assert_eq!(a.to_code(variant), expected);

        let mut cursor = TokenCursor::new(&expected);
        assert!(cursor.accept("AC"));
        assert_eq!(Action::parse(&mut cursor, variant), a);
    }

    #[test]
    fn override_actor_round_trips() {
        let variant = VariantConfig::get(Dialect::Ee);
        let mut a = Action::new(3);
        a.objects[0].name = "Jaheira".into();
        a.objects[1].targets[0] = 255;
        assert_eq!(a.override_target().unwrap().name, "Jaheira");
        let code = a.to_code(variant);
        let mut cursor = TokenCursor::new(&code);
        assert!(cursor.accept("AC"));
        assert_eq!(Action::parse(&mut cursor, variant), a);
    }

    #[test]
    fn single_candidate_is_used_even_when_args_overflow() {
        let s = sigs("80 Wait(I:Seconds*)");
        let mut a = Action::new(80);
        a.numeric = [1, 2, 3];
        assert_eq!(a.matching_function(s.functions_by_id(80)).unwrap().name, "Wait");
        assert!(a.matching_function(&[]).is_none());
    }

    #[test]
    fn prefers_tight_fitting_signature() {
        let s = sigs("61 Small(I:A*)\n61 Large(I:A*,I:B*,O:Who*)\n");
        let set = s.functions_by_id(61);

        let mut a = Action::new(61);
        a.numeric[0] = 5;
        assert_eq!(a.matching_function(set).unwrap().name, "Small");

        a.objects[1].name = "Imoen".into();
        assert_eq!(a.matching_function(set).unwrap().name, "Large");
    }

    #[test]
    fn used_position_counts_not_just_quantity() {
        let s = sigs("62 One(I:A*)\n62 Three(I:A*,I:B*,I:C*)\n");
        let mut a = Action::new(62);
        // a lone value in the third slot needs three declared integers
        a.numeric[2] = 9;
        assert_eq!(a.matching_function(s.functions_by_id(62)).unwrap().name, "Three");
    }

    #[test]
    fn falls_back_to_string_taking_candidate() {
        let s = sigs("63 NoStr(I:A*)\n63 WithStr(S:Name*)\n");
        let mut a = Action::new(63);
        a.numeric[0] = 1;
        a.strings[0] = "x".into();
        a.point = Point::new(1, 1);
        assert_eq!(a.matching_function(s.functions_by_id(63)).unwrap().name, "WithStr");

        let s = sigs("64 First(I:A*)\n64 Second(O:Who*)\n");
        let mut a = Action::new(64);
        a.point = Point::new(1, 1);
        assert_eq!(a.matching_function(s.functions_by_id(64)).unwrap().name, "First");
    }

    #[test]
    fn arguments_skip_override_slot() {
        let s = sigs("40 StartDialog(S:Dialog*,O:Target*)");
        let f = &s.functions_by_id(40)[0];
        let mut a = Action::new(40);
        a.objects[0].name = "actor".into();
        a.objects[1].name = "target".into();
        a.strings[0] = "DLG".into();
        match a.arguments(f).as_slice() {
            [Arg::String(dlg), Arg::Object(o)] => {
                assert_eq!(dlg, "DLG");
                assert_eq!(o.name, "target");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
