//! Typed values stored under a key.

use crate::storage::SortedSet;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// The type tag recorded for every key.
///
/// The tag lives in its own map next to the value and is checked before any
/// command touches the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    List,
    Set,
    Hash,
    SortedSet,
}

impl DataType {
    /// Name reported by `TYPE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::List => "list",
            DataType::Set => "set",
            DataType::Hash => "hash",
            DataType::SortedSet => "zset",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    List(VecDeque<String>),
    Set(HashSet<String>),
    /// Field order is insertion order.
    Hash(IndexMap<String, String>),
    SortedSet(SortedSet),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::List(_) => DataType::List,
            Value::Set(_) => DataType::Set,
            Value::Hash(_) => DataType::Hash,
            Value::SortedSet(_) => DataType::SortedSet,
        }
    }

    /// True for a container holding no elements. Strings are never empty
    /// in this sense; an empty string is still a value.
    pub fn is_empty_container(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
            Value::SortedSet(zset) => zset.is_empty(),
        }
    }

    /// Plain JSON rendering used by `DUMP`.
    ///
    /// Sets are emitted sorted so the output is stable; sorted sets become
    /// a `member -> score` object in rank order.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Map, Value as Json};

        match self {
            Value::String(s) => Json::String(s.clone()),
            Value::List(list) => Json::Array(list.iter().cloned().map(Json::String).collect()),
            Value::Set(set) => {
                let mut members: Vec<&String> = set.iter().collect();
                members.sort();
                Json::Array(members.into_iter().cloned().map(Json::String).collect())
            }
            Value::Hash(hash) => Json::Object(
                hash.iter()
                    .map(|(field, value)| (field.clone(), Json::String(value.clone())))
                    .collect::<Map<_, _>>(),
            ),
            Value::SortedSet(zset) => Json::Object(
                zset.iter()
                    .map(|(member, score)| (member.to_string(), Json::from(score)))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}
