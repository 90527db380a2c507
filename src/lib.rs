pub mod bcsaction;
pub mod bcsfile;
pub mod bcsobject;
pub mod bcsrecord;
pub mod bcstrigger;
pub mod cli;
pub mod config;
pub mod error;
pub mod scriptcompiler;
pub mod scriptdisasm;
pub mod scriptinfo;
pub mod scriptmessage;
pub mod scriptnode;
pub mod signatures;
pub mod symbols;

use std::{fs, path::Path};

use anyhow::{bail, Context};
use ron::ser::{to_string_pretty, PrettyConfig};
use tracing::{error, info, warn};

use crate::{
    cli::{Cli, Command},
    config::ToolkitConfig,
    scriptcompiler::Compiler,
    scriptdisasm::Decompiler,
    scriptnode::ScriptNode,
    signatures::{ScriptRegistry, SignatureCache},
};

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => ToolkitConfig::load(path).with_context(|| format!("Reading {}", path.display()))?,
        None => ToolkitConfig::default(),
    };
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }

    let mut cache = SignatureCache::new();
    let registry = config.registry(&mut cache).context("Loading signature tables")?;
    info!("{} dialect: {} triggers, {} actions", config.dialect, registry.triggers.len(), registry.actions.len());

    match cli.command {
        Command::Decompile { input, output, resources } => {
            decompile(&config, &registry, &input, output.as_deref(), resources)
        }
        Command::Compile { input, output, force } => compile(&config, &registry, &input, output.as_deref(), force),
        Command::Signatures { kind } => {
            let sigs = registry.signatures(kind.into());
            let functions = sigs.functions();
            info!("{} {} signatures for {}", functions.len(), sigs.kind(), sigs.dialect());
            let pretty = PrettyConfig::new().struct_names(true);
            println!("{}", to_string_pretty(&functions, pretty).context("Serializing signatures")?);
            Ok(())
        }
    }
}

fn decompile(
    config: &ToolkitConfig,
    registry: &ScriptRegistry,
    input: &Path,
    output: Option<&Path>,
    list_resources: bool,
) -> anyhow::Result<()> {
    let text = bcsfile::read_text(input, config.xor_key.as_deref())
        .with_context(|| format!("Reading {}", input.display()))?;

    let symbols = config.symbols();
    let resources = config.resources().context("Indexing resources")?;
    let result = Decompiler::new(registry, symbols.as_ref(), resources.as_ref()).decompile(&text);

    for (line, message) in &result.messages {
        warn!("{}:{}: {}", input.display(), line, message);
    }

    match output {
        Some(path) => {
            fs::write(path, bcsfile::encode_text(&result.source))
                .with_context(|| format!("Writing {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => print!("{}", result.source),
    }

    if list_resources {
        for name in &result.used_resources {
            println!("// uses {name}");
        }
        for strref in &result.used_strrefs {
            println!("// uses string #{strref}");
        }
    }
    Ok(())
}

fn compile(
    config: &ToolkitConfig,
    registry: &ScriptRegistry,
    input: &Path,
    output: Option<&Path>,
    force: bool,
) -> anyhow::Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("Reading {}", input.display()))?;
    let tree = ScriptNode::from_ron(&text).with_context(|| format!("Parsing syntax tree {}", input.display()))?;

    let resources = config.resources().context("Indexing resources")?;
    let result = Compiler::new(registry, resources.as_ref())
        .compile(&tree)
        .with_context(|| format!("Compiling {}", input.display()))?;

    for message in result.errors() {
        error!("{}: {}", input.display(), message);
    }
    for message in result.warnings() {
        warn!("{}: {}", input.display(), message);
    }

    if !result.can_save(force) {
        bail!(
            "{}: {} error(s), nothing written (use --force to write anyway)",
            input.display(),
            result.diagnostics.errors.len()
        );
    }

    let path = output.map(Path::to_path_buf).unwrap_or_else(|| input.with_extension("bcs"));
    fs::write(&path, bcsfile::encode_text(&result.code)).with_context(|| format!("Writing {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}
