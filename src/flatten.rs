//! Custom serde Serializer that flattens any `Serialize` value into dotted
//! key-value pairs, handling `Option::None` without requiring
//! `#[serde(skip_serializing_if)]`.
//!
//! The flattened form drives two things: the defaults tree that file, env,
//! and flag values are merged onto before decoding, and the per-key flags
//! the command adapter generates. Leaf types that serde represents as
//! structs (`Duration`) are rendered back into the string a user would
//! type, and anything wrapped in [`Masked`](crate::types::Masked) is marked
//! sensitive.

use std::collections::BTreeMap;

use serde::ser::{self, Serialize};

use crate::decode::hooks::{is_leaf_struct, render_leaf_struct};
use crate::merge::insert_dotted;
use crate::value::{Value, join_key};

/// One leaf of a flattened value.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatEntry {
    pub key: String,
    /// `None` for `Option::None` fields.
    pub value: Option<Value>,
    /// Set for values wrapped in `Masked`.
    pub sensitive: bool,
}

/// Flatten a `Serialize` value into dotted key-value pairs.
///
/// Structs and maps are recursed into, building dotted key paths:
/// `Outer { database: Inner { url: "pg://" } }` → `[("database.url", Some(String("pg://")))]`.
/// Sequences are leaves. Empty structs and maps below the root are emitted
/// as an empty `Map` so the key survives a rebuild.
pub fn flatten<S: Serialize + ?Sized>(source: &S) -> Result<Vec<FlatEntry>, FlattenError> {
    let mut out = Vec::new();
    let serializer = FlattenSerializer {
        prefix: String::new(),
        sensitive: false,
        out: &mut out,
    };
    source.serialize(serializer)?;
    Ok(out)
}

/// Flatten then rebuild into a nested map. `None` leaves become `Null`.
pub fn to_tree<S: Serialize + ?Sized>(source: &S) -> Result<BTreeMap<String, Value>, FlattenError> {
    let mut tree = BTreeMap::new();
    for entry in flatten(source)? {
        if entry.key.is_empty() {
            return Err(FlattenError("expected a struct or map at the root".into()));
        }
        insert_dotted(&mut tree, &entry.key, entry.value.unwrap_or(Value::Null));
    }
    Ok(tree)
}

/// Serialize any value into a single [`Value`].
pub fn to_value<S: Serialize + ?Sized>(source: &S) -> Result<Value, FlattenError> {
    let entries = flatten(source)?;
    if let [only] = entries.as_slice()
        && only.key.is_empty()
    {
        return Ok(only.value.clone().unwrap_or(Value::Null));
    }
    let mut tree = BTreeMap::new();
    for entry in entries {
        insert_dotted(&mut tree, &entry.key, entry.value.unwrap_or(Value::Null));
    }
    Ok(Value::Map(tree))
}

#[derive(Debug)]
pub struct FlattenError(String);

impl std::fmt::Display for FlattenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "flatten error: {}", self.0)
    }
}

impl std::error::Error for FlattenError {}

impl ser::Error for FlattenError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        FlattenError(msg.to_string())
    }
}

struct FlattenSerializer<'a> {
    prefix: String,
    sensitive: bool,
    out: &'a mut Vec<FlatEntry>,
}

impl<'a> FlattenSerializer<'a> {
    fn emit(self, value: Option<Value>) -> Result<(), FlattenError> {
        self.out.push(FlatEntry {
            key: self.prefix,
            value,
            sensitive: self.sensitive,
        });
        Ok(())
    }
}

impl<'a> ser::Serializer for FlattenSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;
    type SerializeSeq = FlattenSeqSerializer<'a>;
    type SerializeTuple = FlattenSeqSerializer<'a>;
    type SerializeTupleStruct = FlattenSeqSerializer<'a>;
    type SerializeTupleVariant = FlattenSeqSerializer<'a>;
    type SerializeMap = FlattenMapSerializer<'a>;
    type SerializeStruct = FlattenStructSerializer<'a>;
    type SerializeStructVariant = FlattenStructSerializer<'a>;

    fn serialize_bool(self, v: bool) -> Result<(), Self::Error> {
        self.emit(Some(Value::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<(), Self::Error> {
        self.emit(Some(Value::Int(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u16(self, v: u16) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u32(self, v: u32) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u64(self, v: u64) -> Result<(), Self::Error> {
        match i64::try_from(v) {
            Ok(i) => self.serialize_i64(i),
            Err(_) => self.emit(Some(Value::String(v.to_string()))),
        }
    }

    fn serialize_f32(self, v: f32) -> Result<(), Self::Error> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<(), Self::Error> {
        self.emit(Some(Value::Float(v)))
    }

    fn serialize_char(self, v: char) -> Result<(), Self::Error> {
        self.serialize_str(&v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<(), Self::Error> {
        self.emit(Some(Value::String(v.to_string())))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<(), Self::Error> {
        Err(FlattenError("bytes not supported".into()))
    }

    fn serialize_none(self) -> Result<(), Self::Error> {
        self.emit(None)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Self::Error> {
        self.emit(Some(Value::Null))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), Self::Error> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<(), Self::Error> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        mut self,
        name: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        if name == "Masked" {
            self.sensitive = true;
        }
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        let serializer = FlattenSerializer {
            prefix: join_key(&self.prefix, variant),
            sensitive: self.sensitive,
            out: self.out,
        };
        value.serialize(serializer)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(FlattenSeqSerializer {
            prefix: self.prefix,
            sensitive: self.sensitive,
            out: self.out,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        let start = self.out.len();
        Ok(FlattenMapSerializer {
            prefix: self.prefix,
            sensitive: self.sensitive,
            out: self.out,
            current_key: None,
            start,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        let start = self.out.len();
        Ok(FlattenStructSerializer {
            prefix: self.prefix,
            sensitive: self.sensitive,
            out: self.out,
            start,
            leaf: is_leaf_struct(name).then(|| (name, BTreeMap::new())),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        let start = self.out.len();
        Ok(FlattenStructSerializer {
            prefix: join_key(&self.prefix, variant),
            sensitive: self.sensitive,
            out: self.out,
            start,
            leaf: None,
        })
    }
}

/// Emit an empty map for a struct or map below the root that produced no
/// entries of its own.
fn close_container(prefix: String, sensitive: bool, start: usize, out: &mut Vec<FlatEntry>) {
    if out.len() == start && !prefix.is_empty() {
        out.push(FlatEntry {
            key: prefix,
            value: Some(Value::Map(BTreeMap::new())),
            sensitive,
        });
    }
}

// --- SerializeStruct ---

struct FlattenStructSerializer<'a> {
    prefix: String,
    sensitive: bool,
    out: &'a mut Vec<FlatEntry>,
    start: usize,
    /// Leaf structs collect their fields and emit one rendered value.
    leaf: Option<(&'static str, BTreeMap<String, Value>)>,
}

impl<'a> ser::SerializeStruct for FlattenStructSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        if let Some((_, fields)) = &mut self.leaf {
            fields.insert(key.to_string(), to_value(value)?);
            return Ok(());
        }
        let serializer = FlattenSerializer {
            prefix: join_key(&self.prefix, key),
            sensitive: self.sensitive,
            out: self.out,
        };
        value.serialize(serializer)
    }

    fn end(self) -> Result<(), Self::Error> {
        if let Some((name, fields)) = self.leaf {
            let rendered = render_leaf_struct(name, &fields).unwrap_or(Value::Map(fields));
            self.out.push(FlatEntry {
                key: self.prefix,
                value: Some(rendered),
                sensitive: self.sensitive,
            });
            return Ok(());
        }
        close_container(self.prefix, self.sensitive, self.start, self.out);
        Ok(())
    }
}

impl<'a> ser::SerializeStructVariant for FlattenStructSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        ser::SerializeStruct::serialize_field(self, key, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        ser::SerializeStruct::end(self)
    }
}

// --- SerializeMap ---

struct FlattenMapSerializer<'a> {
    prefix: String,
    sensitive: bool,
    out: &'a mut Vec<FlatEntry>,
    current_key: Option<String>,
    start: usize,
}

impl<'a> ser::SerializeMap for FlattenMapSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        self.current_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .current_key
            .take()
            .ok_or_else(|| FlattenError("serialize_value called without serialize_key".into()))?;
        let serializer = FlattenSerializer {
            prefix: join_key(&self.prefix, &key),
            sensitive: self.sensitive,
            out: self.out,
        };
        value.serialize(serializer)
    }

    fn end(self) -> Result<(), Self::Error> {
        close_container(self.prefix, self.sensitive, self.start, self.out);
        Ok(())
    }
}

// --- SerializeSeq (for Vec/array fields) ---

struct FlattenSeqSerializer<'a> {
    prefix: String,
    sensitive: bool,
    out: &'a mut Vec<FlatEntry>,
    items: Vec<Value>,
}

impl<'a> ser::SerializeSeq for FlattenSeqSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let v = to_value(value).map_err(|e| FlattenError(format!("array element: {}", e.0)))?;
        self.items.push(v);
        Ok(())
    }

    fn end(self) -> Result<(), Self::Error> {
        self.out.push(FlatEntry {
            key: self.prefix,
            value: Some(Value::Seq(self.items)),
            sensitive: self.sensitive,
        });
        Ok(())
    }
}

impl<'a> ser::SerializeTuple for FlattenSeqSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl<'a> ser::SerializeTupleStruct for FlattenSeqSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl<'a> ser::SerializeTupleVariant for FlattenSeqSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

// --- Key serializer (map keys become path segments) ---

struct KeySerializer;

fn bad_key() -> FlattenError {
    FlattenError("map keys must be strings, integers, or booleans".into())
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = FlattenError;
    type SerializeSeq = ser::Impossible<String, FlattenError>;
    type SerializeTuple = ser::Impossible<String, FlattenError>;
    type SerializeTupleStruct = ser::Impossible<String, FlattenError>;
    type SerializeTupleVariant = ser::Impossible<String, FlattenError>;
    type SerializeMap = ser::Impossible<String, FlattenError>;
    type SerializeStruct = ser::Impossible<String, FlattenError>;
    type SerializeStructVariant = ser::Impossible<String, FlattenError>;

    fn serialize_str(self, v: &str) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_bool(self, v: bool) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i8(self, v: i8) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i16(self, v: i16) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i32(self, v: i32) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i64(self, v: i64) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u8(self, v: u8) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u16(self, v: u16) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u32(self, v: u32) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u64(self, v: u64) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_f32(self, _: f32) -> Result<String, Self::Error> {
        Err(bad_key())
    }
    fn serialize_f64(self, _: f64) -> Result<String, Self::Error> {
        Err(bad_key())
    }
    fn serialize_char(self, v: char) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_bytes(self, _: &[u8]) -> Result<String, Self::Error> {
        Err(bad_key())
    }
    fn serialize_none(self) -> Result<String, Self::Error> {
        Err(bad_key())
    }
    fn serialize_some<T: Serialize + ?Sized>(self, _: &T) -> Result<String, Self::Error> {
        Err(bad_key())
    }
    fn serialize_unit(self) -> Result<String, Self::Error> {
        Err(bad_key())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<String, Self::Error> {
        Err(bad_key())
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        v: &'static str,
    ) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        v: &T,
    ) -> Result<String, Self::Error> {
        v.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<String, Self::Error> {
        Err(bad_key())
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(bad_key())
    }
    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(bad_key())
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(bad_key())
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(bad_key())
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(bad_key())
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Err(bad_key())
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(bad_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IpNet, Masked};
    use serde::Serialize;
    use std::collections::HashMap;
    use std::time::Duration;

    fn pairs<S: Serialize>(s: &S) -> Vec<(String, Option<Value>)> {
        flatten(s)
            .unwrap()
            .into_iter()
            .map(|e| (e.key, e.value))
            .collect()
    }

    #[test]
    fn flat_struct() {
        #[derive(Serialize)]
        struct Args {
            host: String,
            port: u16,
        }
        let args = Args {
            host: "0.0.0.0".into(),
            port: 3000,
        };
        let pairs = pairs(&args);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&("host".into(), Some(Value::String("0.0.0.0".into())))));
        assert!(pairs.contains(&("port".into(), Some(Value::Int(3000)))));
    }

    #[test]
    fn option_none_emits_none() {
        #[derive(Serialize)]
        struct Args {
            host: Option<String>,
        }
        assert_eq!(pairs(&Args { host: None }), vec![("host".into(), None)]);
    }

    #[test]
    fn nested_struct() {
        #[derive(Serialize)]
        struct Inner {
            url: String,
        }
        #[derive(Serialize)]
        struct Outer {
            database: Inner,
        }
        let s = Outer {
            database: Inner {
                url: "pg://".into(),
            },
        };
        assert_eq!(
            pairs(&s),
            vec![("database.url".into(), Some(Value::String("pg://".into())))]
        );
    }

    #[test]
    fn hashmap_input() {
        let mut map = HashMap::new();
        map.insert("host".to_string(), "0.0.0.0".to_string());
        assert_eq!(
            pairs(&map),
            vec![("host".into(), Some(Value::String("0.0.0.0".into())))]
        );
    }

    #[test]
    fn empty_root_struct_emits_nothing() {
        #[derive(Serialize)]
        struct Empty {}
        assert!(pairs(&Empty {}).is_empty());
    }

    #[test]
    fn empty_nested_map_is_kept() {
        #[derive(Serialize)]
        struct Args {
            labels: HashMap<String, String>,
        }
        let args = Args {
            labels: HashMap::new(),
        };
        assert_eq!(
            pairs(&args),
            vec![("labels".into(), Some(Value::Map(BTreeMap::new())))]
        );
    }

    #[test]
    fn unit_variant_serializes_as_string() {
        #[derive(Serialize)]
        enum Mode {
            Fast,
        }
        #[derive(Serialize)]
        struct Args {
            mode: Mode,
        }
        assert_eq!(
            pairs(&Args { mode: Mode::Fast }),
            vec![("mode".into(), Some(Value::String("Fast".into())))]
        );
    }

    #[test]
    fn sequences_are_leaves() {
        #[derive(Serialize)]
        struct Args {
            hosts: Vec<String>,
        }
        let args = Args {
            hosts: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            pairs(&args),
            vec![("hosts".into(), Some(Value::from(vec!["a", "b"])))]
        );
    }

    #[test]
    fn duration_renders_as_string() {
        #[derive(Serialize)]
        struct Args {
            timeout: Duration,
        }
        let args = Args {
            timeout: Duration::from_secs(90),
        };
        assert_eq!(
            pairs(&args),
            vec![("timeout".into(), Some(Value::from("1m30s")))]
        );
    }

    #[test]
    fn ipnet_renders_as_string() {
        #[derive(Serialize)]
        struct Args {
            subnet: IpNet,
        }
        let args = Args {
            subnet: "10.0.0.0/8".parse().unwrap(),
        };
        assert_eq!(
            pairs(&args),
            vec![("subnet".into(), Some(Value::from("10.0.0.0/8")))]
        );
    }

    #[test]
    fn masked_marks_sensitive() {
        #[derive(Serialize)]
        struct Args {
            token: Masked<String>,
            name: String,
        }
        let args = Args {
            token: Masked::new("s3cret".into()),
            name: "n".into(),
        };
        let entries = flatten(&args).unwrap();
        let token = entries.iter().find(|e| e.key == "token").unwrap();
        assert!(token.sensitive);
        assert_eq!(token.value, Some(Value::from("s3cret")));
        assert!(!entries.iter().find(|e| e.key == "name").unwrap().sensitive);
    }

    #[test]
    fn to_tree_rebuilds_nesting() {
        #[derive(Serialize)]
        struct Log {
            level: String,
            file: Option<String>,
        }
        #[derive(Serialize)]
        struct Root {
            log: Log,
        }
        let tree = to_tree(&Root {
            log: Log {
                level: "info".into(),
                file: None,
            },
        })
        .unwrap();
        let log = tree["log"].as_map().unwrap();
        assert_eq!(log["level"], Value::from("info"));
        assert_eq!(log["file"], Value::Null);
    }

    #[test]
    fn to_value_of_scalar() {
        assert_eq!(to_value(&5u8).unwrap(), Value::Int(5));
        assert_eq!(to_value("x").unwrap(), Value::from("x"));
    }
}
