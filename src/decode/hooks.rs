//! Decode hooks: value conversions keyed on the type being decoded.
//!
//! Before the deserializer hands a value to a visitor it describes what the
//! visitor asked for as a [`Target`], and every hook whose predicate matches
//! gets to rewrite the value, in chain order. A hook that fails aborts the
//! decode with its message attached to the current key.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::duration::{format_duration, parse_duration};
use crate::types::IpNet;
use crate::value::Value;

/// What the visitor asked the deserializer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Any,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Option,
    Unit,
    Seq,
    Map,
    Struct {
        name: &'static str,
        fields: &'static [&'static str],
    },
    Newtype(&'static str),
    Enum(&'static str),
}

type Predicate = Arc<dyn Fn(&Target) -> bool + Send + Sync>;
type Convert = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
pub struct DecodeHook {
    name: &'static str,
    matches: Predicate,
    convert: Convert,
}

impl std::fmt::Debug for DecodeHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DecodeHook").field(&self.name).finish()
    }
}

impl DecodeHook {
    pub fn new<P, C>(name: &'static str, matches: P, convert: C) -> Self
    where
        P: Fn(&Target) -> bool + Send + Sync + 'static,
        C: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name,
            matches: Arc::new(matches),
            convert: Arc::new(convert),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// An ordered list of hooks.
#[derive(Debug, Clone)]
pub struct HookChain {
    hooks: Vec<DecodeHook>,
}

impl Default for HookChain {
    /// `duration`, `ip_net`, `string_to_seq`, `masked`, in that order.
    fn default() -> Self {
        Self {
            hooks: vec![duration(), ip_net(), string_to_seq(), masked()],
        }
    }
}

impl HookChain {
    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn push(mut self, hook: DecodeHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(DecodeHook::name).collect()
    }

    pub fn apply(&self, target: &Target, mut value: Value) -> Result<Value, String> {
        for hook in &self.hooks {
            if (hook.matches)(target) {
                value = (hook.convert)(value)?;
            }
        }
        Ok(value)
    }
}

/// `std::time::Duration` from `"1h30m"`-style strings or integer seconds.
pub fn duration() -> DecodeHook {
    DecodeHook::new(
        "duration",
        |t| matches!(t, Target::Struct { name: "Duration", fields } if fields.contains(&"secs")),
        |v| {
            let parsed = match &v {
                Value::String(s) => parse_duration(s)?,
                Value::Int(secs) => Duration::from_secs(
                    u64::try_from(*secs).map_err(|_| format!("negative duration {secs}"))?,
                ),
                Value::Float(secs) => Duration::try_from_secs_f64(*secs)
                    .map_err(|_| format!("invalid duration {secs}"))?,
                _ => return Ok(v),
            };
            Ok(duration_value(parsed))
        },
    )
}

/// `IpNet` from `"a.b.c.d/len"`, normalized to its network address.
pub fn ip_net() -> DecodeHook {
    DecodeHook::new(
        "ip_net",
        |t| *t == Target::Newtype("IpNet"),
        |v| match v {
            Value::String(s) => Ok(Value::String(s.parse::<IpNet>()?.to_string())),
            other => Err(format!("expected a CIDR string, found {}", other.kind())),
        },
    )
}

/// Sequences from comma-separated strings. An empty string is an empty
/// sequence.
pub fn string_to_seq() -> DecodeHook {
    DecodeHook::new(
        "string_to_seq",
        |t| *t == Target::Seq,
        |v| match v {
            Value::String(s) if s.trim().is_empty() => Ok(Value::Seq(Vec::new())),
            Value::String(s) => Ok(Value::Seq(
                s.split(',').map(|part| Value::String(part.trim().to_string())).collect(),
            )),
            other => Ok(other),
        },
    )
}

/// Secrets often arrive through `$(cat file)` or a mounted file with a
/// trailing newline; strip surrounding whitespace from masked strings.
pub fn masked() -> DecodeHook {
    DecodeHook::new(
        "masked",
        |t| *t == Target::Newtype("Masked"),
        |v| match v {
            Value::String(s) => Ok(Value::String(s.trim().to_string())),
            other => Ok(other),
        },
    )
}

/// The shape serde uses for `Duration`: `{ secs, nanos }`.
pub(crate) fn duration_value(d: Duration) -> Value {
    Value::Map(BTreeMap::from([
        ("secs".to_string(), Value::Int(d.as_secs() as i64)),
        ("nanos".to_string(), Value::Int(i64::from(d.subsec_nanos()))),
    ]))
}

/// Render a serialized leaf struct back into the string a user would write.
/// Returns `None` for structs that are not leaves.
pub(crate) fn render_leaf_struct(name: &str, fields: &BTreeMap<String, Value>) -> Option<Value> {
    match name {
        "Duration" => {
            let secs = match fields.get("secs")? {
                Value::Int(s) => u64::try_from(*s).ok()?,
                _ => return None,
            };
            let nanos = match fields.get("nanos")? {
                Value::Int(n) => u32::try_from(*n).ok()?,
                _ => return None,
            };
            Some(Value::String(format_duration(Duration::new(secs, nanos))))
        }
        _ => None,
    }
}

pub(crate) fn is_leaf_struct(name: &str) -> bool {
    name == "Duration"
}
