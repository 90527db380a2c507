use std::{collections::HashMap, fs, path::Path};

use bcs_tools::{
    bcsfile,
    config::ToolkitConfig,
    scriptcompiler::Compiler,
    scriptdisasm::Decompiler,
    scriptinfo::{Dialect, VariantConfig},
    scriptnode::{NodeKind, ScriptNode},
    signatures::{FunctionKind, ScriptRegistry, SignatureCache, Signatures},
    symbols::{parse_ids, IdsTable, NoSymbols, NullResources},
};

fn load() -> (ToolkitConfig, ScriptRegistry) {
    let config = ToolkitConfig::load(Path::new("tests/data/toolkit.toml")).expect("valid config");
    let registry = config.registry(&mut SignatureCache::new()).expect("signature tables");
    (config, registry)
}

#[test]
fn compiled_script_decompiles_to_readable_source() {
    let (config, registry) = load();
    let tree = ScriptNode::from_ron(&fs::read_to_string("tests/data/block.ron").unwrap()).expect("valid tree");

    let compiled = Compiler::new(&registry, &NullResources).compile(&tree).unwrap();
    assert!(compiled.diagnostics.is_clean(), "{:?}", compiled.diagnostics);

    let symbols = config.symbols();
    let result = Decompiler::new(&registry, symbols.as_ref(), &NullResources).decompile(&compiled.code);
    assert_eq!(
        result.source,
        "IF\n\
         \x20 OR(2)\n\
         \x20   See(Nearest([ENEMY]))\n\
         \x20   !Global(\"chapter\",\"GLOBAL\",3)\n\
         \x20 StateCheck(Myself,STATE_SLEEPING)\n\
         THEN\n\
         \x20 RESPONSE #100\n\
         \x20   SetGlobal(\"chapter\",\"GLOBAL\",4)\n\
         \x20   ActionOverride(\"Imoen\",Attack([PC]))\n\
         \x20 RESPONSE #25\n\
         \x20   Wait(2)\n\
         END\n\n"
    );
    assert!(result.messages.is_empty(), "{:?}", result.messages);
}

#[test]
fn compilation_is_deterministic() {
    let (_, registry) = load();
    let tree = ScriptNode::from_ron(&fs::read_to_string("tests/data/block.ron").unwrap()).unwrap();
    let first = Compiler::new(&registry, &NullResources).compile(&tree).unwrap();
    let again = Compiler::new(&registry, &NullResources).compile(&tree).unwrap();
    assert_eq!(first.code, again.code);
    assert!(first.code.starts_with("SC\nCR\nCO\nTR\n16521 2 0 0 0"));
    assert!(first.code.ends_with("RE\nRS\nCR\nSC\n"));
}

#[test]
fn or_short_of_members_warns_once() {
    let (_, registry) = load();
    let tree = ScriptNode::new(NodeKind::SeqTr).with_children([
        ScriptNode::call(NodeKind::Tr, "OR").with_numbers([2]).at(1, 1),
        ScriptNode::call(NodeKind::Tr, "True").at(2, 3),
    ]);
    let result = Compiler::new(&registry, &NullResources).compile(&tree).unwrap();
    let warnings: Vec<_> = result.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].text.contains('1'));
    assert_eq!(warnings[0].line, 1);
    assert!(result.errors().next().is_none());
}

#[test]
fn duplicate_signatures_are_dropped() {
    let variant = VariantConfig::get(Dialect::Bg2);
    let sigs = Signatures::load(
        ["0x4000 True()", "0x4000 AlwaysTrue()", "0x4000 TrueWith(I:X*)"],
        FunctionKind::Trigger,
        variant,
    );
    let names: Vec<_> = sigs.functions_by_id(0x4000).iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["True", "TrueWith"]);
    assert_eq!(sigs.function_by_name("AlwaysTrue", false).map(|f| f.name.as_str()), Some("True"));
}

#[test]
fn lone_records_decompile_to_single_calls() {
    let registry = ScriptRegistry::from_sources(Dialect::Bg2, "0 True()", "80 NoAction()");
    let decompiler = Decompiler::new(&registry, &NoSymbols, &NullResources);

    let trigger = decompiler.decompile("TR\n0 0 0 0 \"\" \"\" OB\n0 0 0 0 0 0 0 0 0 OB\nTR\n");
    assert_eq!(trigger.source, "True()\n");

    let action = decompiler.decompile(
        "AC\n80OB\n0 0 0 0 0 0 0 0 0 0 0 0 \"\"OB\nOB\n0 0 0 0 0 0 0 0 0 0 0 0 \"\"OB\n\
         OB\n0 0 0 0 0 0 0 0 0 0 0 0 \"\"OB\n0 0 0 0 0 \"\" \"\" AC\n",
    );
    assert_eq!(action.source, "NoAction()\n");
}

#[test]
fn in_memory_symbol_tables() {
    let registry = ScriptRegistry::from_sources(Dialect::Bg2, "", "31 Spell(O:Target*,I:Spell*Spell)");
    let mut tables: HashMap<String, IdsTable> = HashMap::new();
    tables.insert("ea".into(), parse_ids("2 PC"));
    tables.insert("spell".into(), parse_ids("2112 WIZARD_MAGIC_MISSILE"));

    let tree = ScriptNode::new(NodeKind::SeqAc).with_child(
        ScriptNode::call(NodeKind::Ac, "Spell")
            .with_numbers([2112])
            .with_child(ScriptNode::new(NodeKind::Ob).with_numbers([2])),
    );
    let compiled = Compiler::new(&registry, &NullResources).compile(&tree).unwrap();
    let result = Decompiler::new(&registry, &tables, &NullResources).decompile(&compiled.code);
    assert_eq!(result.source, "Spell([PC],WIZARD_MAGIC_MISSILE)\n");
    assert!(result.used_resources.contains("SPWI112.SPL"));
}

#[test]
fn encrypted_script_file() {
    let (config, registry) = load();
    let path = std::env::temp_dir().join(format!("bcs-tools-roundtrip-{}.bcs", std::process::id()));
    let key = [0x88, 0xA8, 0x8F];
    let plain = "SC\nCR\nCO\nTR\n16384 0 0 0 0 \"\" \"\" OB\n0 0 0 0 0 0 0 0 0 0 0 0 \"\"OB\nTR\nCO\nRS\nRS\nCR\nSC\n";
    fs::write(&path, bcsfile::encode(plain.as_bytes(), &key).unwrap()).unwrap();

    assert!(bcsfile::read_text(&path, None).is_err());
    let text = bcsfile::read_text(&path, Some(&key)).unwrap();
    let symbols = config.symbols();
    let result = Decompiler::new(&registry, symbols.as_ref(), &NullResources).decompile(&text);
    assert_eq!(result.source, "IF\n  True()\nTHEN\nEND\n\n");
    fs::remove_file(&path).unwrap();
}
