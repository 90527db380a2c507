// Toolkit configuration (`toolkit.toml`).
//
// dialect = "bg2"
// trigger_ids = "data/TRIGGER.IDS"
// action_ids = "data/ACTION.IDS"
// ids_dir = "data/ids"
// resource_dir = "data/override"
// xor_key = [0x88, 0xA8]

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::info;

use crate::{
    bcsfile,
    error::{BcsError, Result},
    scriptinfo::{Dialect, VariantConfig},
    signatures::{FunctionKind, ScriptRegistry, SignatureCache},
    symbols::{IdsDirectory, NoSymbols, NullResources, ResourceDirectory, ResourceLookup, SymbolLookup},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolkitConfig {
    #[serde(default = "default_dialect")]
    pub dialect: Dialect,
    #[serde(default = "default_trigger_ids")]
    pub trigger_ids: PathBuf,
    #[serde(default = "default_action_ids")]
    pub action_ids: PathBuf,
    #[serde(default)]
    pub ids_dir: Option<PathBuf>,
    #[serde(default)]
    pub resource_dir: Option<PathBuf>,
    #[serde(default)]
    pub xor_key: Option<Vec<u8>>,
}

fn default_dialect() -> Dialect {
    Dialect::Bg2
}

fn default_trigger_ids() -> PathBuf {
    PathBuf::from("TRIGGER.IDS")
}

fn default_action_ids() -> PathBuf {
    PathBuf::from("ACTION.IDS")
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            trigger_ids: default_trigger_ids(),
            action_ids: default_action_ids(),
            ids_dir: None,
            resource_dir: None,
            xor_key: None,
        }
    }
}

impl ToolkitConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`; relative paths inside resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.trigger_ids);
        join(&mut self.action_ids);
        if let Some(p) = self.ids_dir.as_mut() {
            join(p);
        }
        if let Some(p) = self.resource_dir.as_mut() {
            join(p);
        }
    }

    pub fn variant(&self) -> &'static VariantConfig {
        VariantConfig::get(self.dialect)
    }

    fn signature_text(&self, path: &Path) -> Result<String> {
        bcsfile::read_text(path, self.xor_key.as_deref()).map_err(|e| match e {
            BcsError::Io(io) => BcsError::Config(format!("cannot read {}: {}", path.display(), io)),
            other => other,
        })
    }

    /// Trigger and action tables for the configured dialect, through `cache`.
    pub fn registry(&self, cache: &mut SignatureCache) -> Result<ScriptRegistry> {
        let variant = self.variant();
        let resource = |p: &Path| format!("{}:{}", self.dialect, p.display());
        let triggers = cache.get_or_load(&resource(&self.trigger_ids), FunctionKind::Trigger, variant, || {
            self.signature_text(&self.trigger_ids)
        })?;
        let actions = cache.get_or_load(&resource(&self.action_ids), FunctionKind::Action, variant, || {
            self.signature_text(&self.action_ids)
        })?;
        Ok(ScriptRegistry::new(variant, triggers, actions))
    }

    pub fn symbols(&self) -> Box<dyn SymbolLookup> {
        match &self.ids_dir {
            Some(dir) => Box::new(IdsDirectory::new(dir, self.xor_key.clone())),
            None => Box::new(NoSymbols),
        }
    }

    pub fn resources(&self) -> Result<Box<dyn ResourceLookup>> {
        Ok(match &self.resource_dir {
            Some(dir) => Box::new(ResourceDirectory::open(dir)?),
            None => Box::new(NullResources),
        })
    }
}
