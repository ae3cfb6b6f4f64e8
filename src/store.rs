//! The merged configuration store.
//!
//! Every source writes into its own [`Layer`]. A read walks the layers from
//! highest to lowest precedence and returns the first hit, so overrides are
//! flat: a higher layer that sets `log.level` replaces only that key, never
//! its siblings.
//!
//! Keys are dotted paths stored lower-cased; lookups are case-insensitive.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::merge::insert_dotted;
use crate::value::Value;

/// Source layers, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    /// Defaults of bound flags the user did not set.
    FlagDefault,
    /// `/etc/{org}/{app}/{name}.yaml`
    SystemFile,
    /// `$HOME/.config/{org}/{app}/{name}.yaml`
    UserFile,
    /// A file named with `--config` or by the caller.
    ExplicitFile,
    /// `{APP}_{KEY}` environment variables.
    Env,
    /// Flags set on the command line.
    Flag,
}

impl Layer {
    pub const ALL: [Layer; 6] = [
        Layer::FlagDefault,
        Layer::SystemFile,
        Layer::UserFile,
        Layer::ExplicitFile,
        Layer::Env,
        Layer::Flag,
    ];
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::FlagDefault => "flag default",
            Layer::SystemFile => "system file",
            Layer::UserFile => "user file",
            Layer::ExplicitFile => "config file",
            Layer::Env => "environment",
            Layer::Flag => "flag",
        };
        f.write_str(name)
    }
}

/// A resolved key, its value, and the layer that supplied it.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub key: String,
    pub value: Value,
    pub layer: Layer,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    layers: BTreeMap<Layer, BTreeMap<String, Value>>,
}

/// The store as shared between a loader and its file watcher.
pub type SharedStore = Arc<RwLock<ConfigStore>>;

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    /// Replace `layer` with `entries`. Keys are lower-cased.
    pub fn set_layer(&mut self, layer: Layer, entries: impl IntoIterator<Item = (String, Value)>) {
        let entries: BTreeMap<String, Value> = entries
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        self.layers.insert(layer, entries);
    }

    /// Set one key in `layer`, leaving the rest of the layer alone.
    pub fn set(&mut self, layer: Layer, key: &str, value: Value) {
        self.layers
            .entry(layer)
            .or_default()
            .insert(key.to_lowercase(), value);
    }

    pub fn clear_layer(&mut self, layer: Layer) {
        self.layers.remove(&layer);
    }

    pub fn layer(&self, layer: Layer) -> Option<&BTreeMap<String, Value>> {
        self.layers.get(&layer)
    }

    /// The value from the highest layer that defines `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.lookup(key).map(|(value, _)| value)
    }

    /// The layer that supplies `key`.
    pub fn source_of(&self, key: &str) -> Option<Layer> {
        self.lookup(key).map(|(_, layer)| layer)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn lookup(&self, key: &str) -> Option<(&Value, Layer)> {
        let key = key.to_lowercase();
        self.layers
            .iter()
            .rev()
            .find_map(|(layer, entries)| entries.get(&key).map(|v| (v, *layer)))
    }

    /// Every key defined by any layer, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .layers
            .values()
            .flat_map(|entries| entries.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Every resolved key with its winning value and layer.
    pub fn settings(&self) -> Vec<Setting> {
        self.keys()
            .into_iter()
            .filter_map(|key| {
                let (value, layer) = self.lookup(&key)?;
                Some(Setting {
                    value: value.clone(),
                    layer,
                    key,
                })
            })
            .collect()
    }

    /// The merged view as a nested map. Layers are applied lowest first so
    /// a higher layer's leaf replaces a lower one's.
    pub fn tree(&self) -> BTreeMap<String, Value> {
        let mut tree = BTreeMap::new();
        for entries in self.layers.values() {
            for (key, value) in entries {
                insert_dotted(&mut tree, key, value.clone());
            }
        }
        tree
    }

    /// The merged subtree under `prefix`, e.g. `log`.
    pub fn sub_tree(&self, prefix: &str) -> BTreeMap<String, Value> {
        let prefix = prefix.to_lowercase();
        let mut node = Value::Map(self.tree());
        for segment in prefix.split('.').filter(|s| !s.is_empty()) {
            node = match node {
                Value::Map(mut map) => map.remove(segment).unwrap_or_default(),
                _ => Value::Null,
            };
        }
        match node {
            Value::Map(map) => map,
            _ => BTreeMap::new(),
        }
    }
}
