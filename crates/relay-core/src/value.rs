//! Field values stored in records and the three-way read result.
//!
//! Records never hold references to other records. A link is just the
//! target's [`DataId`], resolved through the store at read time, so cyclic
//! response graphs are plain cycles in an id lookup table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::DataId;

/// The value stored under one storage key of a record.
///
/// Serialized adjacently tagged so a scalar array can never be mistaken for
/// a list of links after a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    /// A scalar: string, number, bool, null, or a JSON blob for custom scalars.
    Scalar(Value),
    /// A singular link to another record.
    Link(DataId),
    /// An ordered plural link.
    LinkList(Vec<DataId>),
}

impl FieldValue {
    /// The explicit null a deleted field holds.
    pub fn null() -> Self {
        FieldValue::Scalar(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Scalar(Value::Null))
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Scalar(value)
    }
}

/// Result of reading through the store.
///
/// Distinguishes "never fetched" from "confirmed absent": an unknown record
/// or a missing key reads as [`Lookup::Undefined`] and should trigger a
/// fetch, while a deleted record or an explicit null reads as
/// [`Lookup::Null`] and must not.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Undefined,
    Null,
    Found(T),
}

impl<T> Lookup<T> {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Lookup::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Lookup::Null)
    }

    /// Returns the found value, collapsing both absent states to `None`.
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Lookup<&T> {
        match self {
            Lookup::Undefined => Lookup::Undefined,
            Lookup::Null => Lookup::Null,
            Lookup::Found(value) => Lookup::Found(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Undefined => Lookup::Undefined,
            Lookup::Null => Lookup::Null,
            Lookup::Found(value) => Lookup::Found(f(value)),
        }
    }
}
