//! Weakly-typed serde deserialization from [`Value`] trees.
//!
//! Configuration arrives as strings more often than not (environment
//! variables, flags), so the deserializer coerces where the target type is
//! unambiguous:
//!
//! - strings parse into booleans (`1`, `t`, `true`, `0`, `f`, `false`, any
//!   case), integers, and floats;
//! - numbers and booleans render into strings;
//! - booleans become `0`/`1` for numeric targets, numbers become booleans
//!   by comparing against zero;
//! - a single scalar decodes as a one-element sequence;
//! - `null` decodes as the zero value of a non-optional scalar.
//!
//! Before each typed read the [`HookChain`] may rewrite the value (see
//! [`hooks`]). Every error carries the dotted key where it happened.

pub mod duration;
pub mod hooks;

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    VariantAccess, Visitor,
};
use thiserror::Error;

pub use hooks::{DecodeHook, HookChain, Target};

use crate::value::Value;

/// A decode failure at a dotted key.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", describe(.key, .message))]
pub struct DecodeError {
    key: String,
    message: String,
}

impl DecodeError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }

    /// The dotted key, empty for the document root.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn at(mut self, path: &str) -> Self {
        if self.key.is_empty() {
            self.key = path.to_string();
        }
        self
    }
}

fn describe(key: &str, message: &str) -> String {
    if key.is_empty() {
        format!("Failed to decode configuration: {message}")
    } else {
        format!("Failed to decode '{key}': {message}")
    }
}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DecodeError::new("", msg.to_string())
    }
}

/// Decode `value` into a `T`.
pub fn decode<T: DeserializeOwned>(value: Value, hooks: &HookChain) -> Result<T, DecodeError> {
    T::deserialize(ValueDeserializer::new(value, String::new(), hooks))
}

pub struct ValueDeserializer<'h> {
    value: Value,
    path: String,
    hooks: &'h HookChain,
}

impl<'h> ValueDeserializer<'h> {
    pub fn new(value: Value, path: String, hooks: &'h HookChain) -> Self {
        Self { value, path, hooks }
    }

    fn hooked(mut self, target: Target) -> Result<Self, DecodeError> {
        self.value = self
            .hooks
            .apply(&target, self.value)
            .map_err(|msg| DecodeError::new(&self.path, msg))?;
        Ok(self)
    }

    fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::new(&self.path, message)
    }

    fn mismatch(&self, expected: &str) -> DecodeError {
        self.error(format!("expected {expected}, found {}", self.value.kind()))
    }

    fn visit_seq<'de, V: Visitor<'de>>(
        path: String,
        hooks: &'h HookChain,
        items: Vec<Value>,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        let mut access = SeqDeserializer {
            items: items.into_iter().enumerate(),
            path,
            hooks,
        };
        let out = visitor
            .visit_seq(&mut access)
            .map_err(|e: DecodeError| e.at(&access.path))?;
        if access.items.next().is_some() {
            return Err(DecodeError::new(access.path, "too many elements in sequence"));
        }
        Ok(out)
    }

    fn visit_map<'de, V: Visitor<'de>>(
        path: String,
        hooks: &'h HookChain,
        entries: BTreeMap<String, Value>,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        let mut access = MapDeserializer {
            entries: entries.into_iter(),
            pending: None,
            path,
            hooks,
        };
        visitor
            .visit_map(&mut access)
            .map_err(|e: DecodeError| e.at(&access.path))
    }

    fn integer<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let path = self.path.clone();
        let result = match &self.value {
            Value::Null => visitor.visit_i64(0),
            Value::Bool(b) => visitor.visit_i64(i64::from(*b)),
            Value::Int(i) => visitor.visit_i64(*i),
            Value::Float(x) if x.fract() == 0.0 && x.abs() < 9.2e18 => visitor.visit_i64(*x as i64),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    visitor.visit_i64(i)
                } else if let Ok(u) = s.parse::<u64>() {
                    visitor.visit_u64(u)
                } else {
                    return Err(self.error(format!("cannot parse '{s}' as an integer")));
                }
            }
            _ => return Err(self.mismatch("an integer")),
        };
        result.map_err(|e: DecodeError| e.at(&path))
    }

    fn float<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let x = match &self.value {
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Int(i) => *i as f64,
            Value::Float(x) => *x,
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.error(format!("cannot parse '{s}' as a number")))?,
            _ => return Err(self.mismatch("a number")),
        };
        visitor.visit_f64(x).map_err(|e: DecodeError| e.at(&self.path))
    }

    fn string<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let path = self.path.clone();
        let s = match self.value {
            Value::Null => String::new(),
            Value::String(s) => s,
            scalar @ (Value::Bool(_) | Value::Int(_) | Value::Float(_)) => scalar.to_string(),
            _ => return Err(self.mismatch("a string")),
        };
        visitor.visit_string(s).map_err(|e: DecodeError| e.at(&path))
    }
}

/// `1`, `t`, `true` or `0`, `f`, `false`, in any case.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

macro_rules! integer_methods {
    ($($method:ident),*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
                self.hooked(Target::Int)?.integer(visitor)
            }
        )*
    };
}

impl<'de, 'h> de::Deserializer<'de> for ValueDeserializer<'h> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Any)?;
        let path = this.path;
        let result = match this.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Int(i) => visitor.visit_i64(i),
            Value::Float(x) => visitor.visit_f64(x),
            Value::String(s) => visitor.visit_string(s),
            Value::Seq(items) => return Self::visit_seq(path, this.hooks, items, visitor),
            Value::Map(entries) => return Self::visit_map(path, this.hooks, entries, visitor),
        };
        result.map_err(|e: DecodeError| e.at(&path))
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Bool)?;
        let b = match &this.value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::String(s) if s.trim().is_empty() => false,
            Value::String(s) => parse_bool(s)
                .ok_or_else(|| this.error(format!("cannot parse '{s}' as a boolean")))?,
            _ => return Err(this.mismatch("a boolean")),
        };
        visitor.visit_bool(b).map_err(|e: DecodeError| e.at(&this.path))
    }

    integer_methods!(
        deserialize_i8,
        deserialize_i16,
        deserialize_i32,
        deserialize_i64,
        deserialize_i128,
        deserialize_u8,
        deserialize_u16,
        deserialize_u32,
        deserialize_u64,
        deserialize_u128
    );

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.hooked(Target::Float)?.float(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.hooked(Target::Float)?.float(visitor)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.hooked(Target::Str)?.string(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.hooked(Target::Str)?.string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.hooked(Target::Str)?.string(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Bytes)?;
        match this.value {
            Value::String(s) => visitor
                .visit_byte_buf(s.into_bytes())
                .map_err(|e: DecodeError| e.at(&this.path)),
            Value::Seq(items) => Self::visit_seq(this.path, this.hooks, items, visitor),
            _ => Err(this.mismatch("bytes")),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Option)?;
        let path = this.path.clone();
        let result = match this.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(this),
        };
        result.map_err(|e: DecodeError| e.at(&path))
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Unit)?;
        visitor.visit_unit().map_err(|e: DecodeError| e.at(&this.path))
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Newtype(name))?;
        let path = this.path.clone();
        visitor.visit_newtype_struct(this).map_err(|e: DecodeError| e.at(&path))
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Seq)?;
        let items = match this.value {
            Value::Null => Vec::new(),
            Value::Seq(items) => items,
            Value::Map(_) => return Err(this.mismatch("a sequence")),
            scalar => vec![scalar],
        };
        Self::visit_seq(this.path, this.hooks, items, visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Map)?;
        this.into_map(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Struct { name, fields })?;
        this.into_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        let this = self.hooked(Target::Enum(name))?;
        let path = this.path.clone();
        let (variant, value) = match this.value {
            Value::String(s) => (s, None),
            Value::Map(map) if map.len() == 1 => match map.into_iter().next() {
                Some((variant, value)) => (variant, Some(value)),
                None => return Err(DecodeError::new(path, "empty enum map")),
            },
            other => {
                return Err(DecodeError::new(
                    path,
                    format!("expected an enum variant, found {}", other.kind()),
                ));
            }
        };
        visitor
            .visit_enum(EnumDeserializer {
                variant,
                value,
                path: path.clone(),
                hooks: this.hooks,
            })
            .map_err(|e: DecodeError| e.at(&path))
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.string(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }
}

impl<'h> ValueDeserializer<'h> {
    fn into_map<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Null => Self::visit_map(self.path, self.hooks, BTreeMap::new(), visitor),
            Value::Map(entries) => Self::visit_map(self.path, self.hooks, entries, visitor),
            _ => Err(self.mismatch("a map")),
        }
    }
}

struct SeqDeserializer<'h> {
    items: std::iter::Enumerate<std::vec::IntoIter<Value>>,
    path: String,
    hooks: &'h HookChain,
}

impl<'de, 'h> SeqAccess<'de> for SeqDeserializer<'h> {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, DecodeError> {
        match self.items.next() {
            Some((index, value)) => {
                let path = format!("{}[{index}]", self.path);
                seed.deserialize(ValueDeserializer::new(value, path, self.hooks))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct MapDeserializer<'h> {
    entries: std::collections::btree_map::IntoIter<String, Value>,
    pending: Option<(String, Value)>,
    path: String,
    hooks: &'h HookChain,
}

impl<'de, 'h> MapAccess<'de> for MapDeserializer<'h> {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, DecodeError> {
        let Some((key, value)) = self.entries.next() else {
            return Ok(None);
        };
        let key_path = crate::value::join_key(&self.path, &key);
        let out = seed.deserialize(ValueDeserializer::new(
            Value::String(key.clone()),
            key_path,
            self.hooks,
        ))?;
        self.pending = Some((key, value));
        Ok(Some(out))
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, DecodeError> {
        let (key, value) = self
            .pending
            .take()
            .ok_or_else(|| DecodeError::new(&self.path, "map value requested before key"))?;
        let path = crate::value::join_key(&self.path, &key);
        seed.deserialize(ValueDeserializer::new(value, path, self.hooks))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

struct EnumDeserializer<'h> {
    variant: String,
    value: Option<Value>,
    path: String,
    hooks: &'h HookChain,
}

impl<'de, 'h> EnumAccess<'de> for EnumDeserializer<'h> {
    type Error = DecodeError;
    type Variant = VariantDeserializer<'h>;

    fn variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<(S::Value, Self::Variant), DecodeError> {
        let name: de::value::StringDeserializer<DecodeError> = self.variant.into_deserializer();
        let variant = seed.deserialize(name)?;
        Ok((
            variant,
            VariantDeserializer {
                value: self.value,
                path: self.path,
                hooks: self.hooks,
            },
        ))
    }
}

struct VariantDeserializer<'h> {
    value: Option<Value>,
    path: String,
    hooks: &'h HookChain,
}

impl<'h> VariantDeserializer<'h> {
    fn inner(self, expected: &str) -> Result<ValueDeserializer<'h>, DecodeError> {
        match self.value {
            Some(value) => Ok(ValueDeserializer::new(value, self.path, self.hooks)),
            None => Err(DecodeError::new(self.path, format!("expected {expected}"))),
        }
    }
}

impl<'de, 'h> VariantAccess<'de> for VariantDeserializer<'h> {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<(), DecodeError> {
        match self.value {
            None | Some(Value::Null) => Ok(()),
            Some(other) => Err(DecodeError::new(
                self.path,
                format!("expected a unit variant, found {}", other.kind()),
            )),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, DecodeError> {
        seed.deserialize(self.inner("a newtype variant")?)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DecodeError> {
        de::Deserializer::deserialize_seq(self.inner("a tuple variant")?, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        de::Deserializer::deserialize_map(self.inner("a struct variant")?, visitor)
    }
}
