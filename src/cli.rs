use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::{scriptinfo::Dialect, signatures::FunctionKind};

/// Infinity Engine BCS script compiler and decompiler
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Toolkit configuration (toolkit.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the configured game dialect (bg1, bg2, iwd, pst, iwd2, ee)
    #[arg(short, long, global = true)]
    pub dialect: Option<Dialect>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decompile a BCS file to BAF source
    Decompile {
        input: PathBuf,
        /// Write the source here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// List the resources and string references the script uses
        #[arg(long)]
        resources: bool,
    },

    /// Compile a RON syntax tree to BCS
    Compile {
        input: PathBuf,
        /// Defaults to the input path with a .bcs extension
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the output even when compilation reported errors
        #[arg(long)]
        force: bool,
    },

    /// Dump the loaded trigger or action signatures as RON
    Signatures {
        #[arg(value_enum)]
        kind: SignatureKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SignatureKind {
    Trigger,
    Action,
}

impl From<SignatureKind> for FunctionKind {
    fn from(kind: SignatureKind) -> Self {
        match kind {
            SignatureKind::Trigger => FunctionKind::Trigger,
            SignatureKind::Action => FunctionKind::Action,
        }
    }
}
