//! Core resolution pipeline: merge the store onto a target's current values
//! and decode the result back into the target's type.
//!
//! Operates on an already-filled [`ConfigStore`] with no I/O, so the full
//! pipeline is testable with synthetic layers. Steps:
//!
//! 1. Serialize the target into a tree; these are the defaults
//! 2. Deep-merge the store's merged view on top (keys match case-insensitively)
//! 3. Decode the merged tree through the hook chain
//!
//! Keys absent from every layer keep the target's value, and keys no field
//! claims are ignored.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::decode::{HookChain, decode};
use crate::error::ClapwireError;
use crate::flatten::{flatten, to_tree};
use crate::merge::deep_merge;
use crate::store::ConfigStore;
use crate::value::Value;

/// Decode `store` on top of `current`, returning a new value. `current` is
/// left alone so a failed decode changes nothing.
pub fn resolve<T>(current: &T, store: &ConfigStore, hooks: &HookChain) -> Result<T, ClapwireError>
where
    T: Serialize + DeserializeOwned,
{
    let defaults = to_tree(current)?;
    let merged = deep_merge(defaults, store.tree());
    Ok(decode(Value::Map(merged), hooks)?)
}

/// Like [`resolve`] but writes into `target` on success.
pub fn resolve_into<T>(target: &mut T, store: &ConfigStore, hooks: &HookChain) -> Result<(), ClapwireError>
where
    T: Serialize + DeserializeOwned,
{
    *target = resolve(target, store, hooks)?;
    Ok(())
}

/// Every leaf key `value` declares, lower-cased. These are the keys the
/// environment is searched for.
pub fn known_keys<T: Serialize + ?Sized>(value: &T) -> Result<Vec<String>, ClapwireError> {
    let mut keys: Vec<String> = flatten(value)?
        .into_iter()
        .filter(|entry| !entry.key.is_empty())
        .map(|entry| entry.key.to_lowercase())
        .collect();
    keys.sort();
    keys.dedup();
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{Mode, ModeConfig, TestConfig};
    use crate::store::Layer;
    use crate::types::{IpNet, Masked};
    use std::time::Duration;

    fn store(layers: &[(Layer, &[(&str, Value)])]) -> ConfigStore {
        let mut store = ConfigStore::new();
        for (layer, entries) in layers {
            store.set_layer(
                *layer,
                entries.iter().map(|(k, v)| (k.to_string(), v.clone())),
            );
        }
        store
    }

    fn hooks() -> HookChain {
        HookChain::default()
    }

    #[test]
    fn defaults_only() {
        let config = resolve(&TestConfig::default(), &ConfigStore::new(), &hooks()).unwrap();
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn file_overrides_default() {
        let store = store(&[(Layer::UserFile, &[("port", Value::Int(3000))])]);
        let config = resolve(&TestConfig::default(), &store, &hooks()).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "localhost");
    }

    #[test]
    fn env_strings_are_coerced() {
        let store = store(&[(
            Layer::Env,
            &[
                ("port", Value::from("5000")),
                ("debug", Value::from("true")),
                ("database.pool_size", Value::from("12")),
            ],
        )]);
        let config = resolve(&TestConfig::default(), &store, &hooks()).unwrap();
        assert_eq!(config.port, 5000);
        assert!(config.debug);
        assert_eq!(config.database.pool_size, 12);
    }

    #[test]
    fn sparse_merge_across_layers() {
        let store = store(&[
            (Layer::UserFile, &[("host", Value::from("filehost")), ("database.pool_size", Value::Int(20))]),
            (Layer::Env, &[("port", Value::from("4000"))]),
            (Layer::Flag, &[("debug", Value::from("true"))]),
        ]);
        let config = resolve(&TestConfig::default(), &store, &hooks()).unwrap();
        assert_eq!(config.host, "filehost");
        assert_eq!(config.port, 4000);
        assert!(config.debug);
        assert_eq!(config.database.pool_size, 20);
        assert_eq!(config.database.url, None);
    }

    #[test]
    fn hooks_convert_special_types() {
        let store = store(&[(
            Layer::UserFile,
            &[
                ("timeout", Value::from("1h30m")),
                ("allowed", Value::from("a, b,c")),
                ("network", Value::from("10.1.2.3/8")),
                ("token", Value::from("s3cret")),
            ],
        )]);
        let config = resolve(&TestConfig::default(), &store, &hooks()).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5400));
        assert_eq!(config.allowed, vec!["a", "b", "c"]);
        assert_eq!(config.network, Some("10.0.0.0/8".parse::<IpNet>().unwrap()));
        assert_eq!(config.token, Masked::new("s3cret".to_string()));
    }

    #[test]
    fn mixed_case_keys_reach_fields() {
        let store = store(&[(Layer::Env, &[("DATABASE.URL", Value::from("pg://x"))])]);
        let config = resolve(&TestConfig::default(), &store, &hooks()).unwrap();
        assert_eq!(config.database.url.as_deref(), Some("pg://x"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let store = store(&[(Layer::UserFile, &[("typo", Value::Int(1)), ("port", Value::Int(1))])]);
        let config = resolve(&TestConfig::default(), &store, &hooks()).unwrap();
        assert_eq!(config.port, 1);
    }

    #[test]
    fn bad_value_names_the_key_and_keeps_target() {
        let store = store(&[(Layer::UserFile, &[("database.pool_size", Value::from("lots"))])]);
        let mut config = TestConfig::default();
        let err = resolve_into(&mut config, &store, &hooks()).unwrap_err();
        match err {
            ClapwireError::Decode(e) => assert_eq!(e.key(), "database.pool_size"),
            other => panic!("expected decode error, got {other:?}"),
        }
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn current_values_are_the_baseline() {
        let current = TestConfig {
            host: "example.org".into(),
            ..TestConfig::default()
        };
        let store = store(&[(Layer::Env, &[("port", Value::from("1"))])]);
        let config = resolve(&current, &store, &hooks()).unwrap();
        assert_eq!(config.host, "example.org");
        assert_eq!(config.port, 1);
    }

    #[test]
    fn enums_from_strings() {
        let store = store(&[(Layer::UserFile, &[("mode", Value::from("slow"))])]);
        let config = resolve(&ModeConfig::default(), &store, &hooks()).unwrap();
        assert_eq!(config.mode, Mode::Slow);

        let store = store_of_mode("warp");
        assert!(resolve(&ModeConfig::default(), &store, &hooks()).is_err());
    }

    fn store_of_mode(mode: &str) -> ConfigStore {
        store(&[(Layer::UserFile, &[("mode", Value::from(mode))])])
    }

    #[test]
    fn known_keys_cover_every_leaf() {
        let keys = known_keys(&TestConfig::default()).unwrap();
        for key in ["host", "port", "debug", "database.url", "database.pool_size", "timeout", "token"] {
            assert!(keys.contains(&key.to_string()), "{key} missing from {keys:?}");
        }
    }
}
