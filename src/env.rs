use std::collections::HashMap;

use crate::value::Value;

/// The environment variable prefix for `app_name`: upper-cased, with `-`
/// and `.` turned into `_`. `my-app` → `MY_APP`.
pub fn env_prefix(app_name: &str) -> String {
    normalize(app_name)
}

/// The variable that overrides `key`: `log.max-size` under prefix `MYAPP`
/// is `MYAPP_LOG_MAX_SIZE`.
pub fn env_var_name(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        normalize(key)
    } else {
        format!("{prefix}_{}", normalize(key))
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Look up every known key in `vars` and collect the ones that are set.
///
/// Only `keys` are consulted: an env var cannot introduce a key nobody
/// asked for. Values stay strings; the decoder coerces them.
///
/// Takes an iterator so tests can pass synthetic data instead of `std::env::vars()`.
pub fn env_to_entries<'k>(
    prefix: &str,
    keys: impl IntoIterator<Item = &'k str>,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Vec<(String, Value)> {
    let vars: HashMap<String, String> = vars.into_iter().collect();
    let mut out: Vec<(String, Value)> = keys
        .into_iter()
        .filter_map(|key| {
            let value = vars.get(&env_var_name(prefix, key))?;
            Some((key.to_lowercase(), Value::String(value.clone())))
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out.dedup_by(|a, b| a.0 == b.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn prefix_normalization() {
        assert_eq!(env_prefix("myapp"), "MYAPP");
        assert_eq!(env_prefix("my-app"), "MY_APP");
        assert_eq!(env_prefix("my.app"), "MY_APP");
    }

    #[test]
    fn var_names() {
        assert_eq!(env_var_name("MYAPP", "log.max-size"), "MYAPP_LOG_MAX_SIZE");
        assert_eq!(env_var_name("MYAPP", "port"), "MYAPP_PORT");
        assert_eq!(env_var_name("", "log.level"), "LOG_LEVEL");
    }

    #[test]
    fn known_keys_are_read() {
        let entries = env_to_entries(
            "MYAPP",
            ["log.level", "log.max-size", "port"],
            vars(&[("MYAPP_LOG_LEVEL", "debug"), ("MYAPP_LOG_MAX_SIZE", "10")]),
        );
        assert_eq!(
            entries,
            vec![
                ("log.level".into(), Value::from("debug")),
                ("log.max-size".into(), Value::from("10")),
            ]
        );
    }

    #[test]
    fn unknown_vars_are_ignored() {
        let entries = env_to_entries("MYAPP", ["port"], vars(&[("MYAPP_HOST", "x")]));
        assert!(entries.is_empty());
    }

    #[test]
    fn other_prefixes_are_ignored() {
        let entries = env_to_entries("MYAPP", ["port"], vars(&[("OTHER_PORT", "1")]));
        assert!(entries.is_empty());
    }

    #[test]
    fn values_stay_strings() {
        let entries = env_to_entries("APP", ["debug"], vars(&[("APP_DEBUG", "true")]));
        assert_eq!(entries, vec![("debug".into(), Value::from("true"))]);
    }

    #[test]
    fn empty_value_is_still_set() {
        let entries = env_to_entries("APP", ["name"], vars(&[("APP_NAME", "")]));
        assert_eq!(entries, vec![("name".into(), Value::from(""))]);
    }

    #[test]
    fn duplicate_keys_collapse() {
        let entries = env_to_entries("APP", ["port", "PORT"], vars(&[("APP_PORT", "1")]));
        assert_eq!(entries.len(), 1);
    }
}
