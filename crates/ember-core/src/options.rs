//! Typed key-value option store.
//!
//! Engine and gameplay settings live in one registry as tagged values. Typed
//! accessors return a `Result` instead of reinterpreting mismatched payloads,
//! so a caller asking for the wrong type gets a reportable error rather than
//! garbage.

use std::collections::HashMap;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// A single option payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
    LongArray(Vec<i64>),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl OptionValue {
    fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Long(_) => "long",
            OptionValue::Double(_) => "double",
            OptionValue::Text(_) => "text",
            OptionValue::LongArray(_) => "long array",
            OptionValue::Vec3(_) => "vec3",
            OptionValue::Vec4(_) => "vec4",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OptionError {
    #[error("option '{0}' is not set")]
    Missing(String),

    #[error("option '{name}' holds a {found}, expected {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Registry of named, typed options.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct OptionStore {
    values: HashMap<String, OptionValue>,
}

impl OptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace an option.
    pub fn set(&mut self, name: impl Into<String>, value: OptionValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn wrong_type(name: &str, expected: &'static str, found: &OptionValue) -> OptionError {
        OptionError::WrongType {
            name: name.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, OptionError> {
        match self.values.get(name) {
            None => Err(OptionError::Missing(name.to_string())),
            Some(OptionValue::Bool(v)) => Ok(*v),
            Some(other) => Err(Self::wrong_type(name, "bool", other)),
        }
    }

    pub fn get_long(&self, name: &str) -> Result<i64, OptionError> {
        match self.values.get(name) {
            None => Err(OptionError::Missing(name.to_string())),
            Some(OptionValue::Long(v)) => Ok(*v),
            Some(other) => Err(Self::wrong_type(name, "long", other)),
        }
    }

    pub fn get_double(&self, name: &str) -> Result<f64, OptionError> {
        match self.values.get(name) {
            None => Err(OptionError::Missing(name.to_string())),
            Some(OptionValue::Double(v)) => Ok(*v),
            Some(other) => Err(Self::wrong_type(name, "double", other)),
        }
    }

    pub fn get_text(&self, name: &str) -> Result<&str, OptionError> {
        match self.values.get(name) {
            None => Err(OptionError::Missing(name.to_string())),
            Some(OptionValue::Text(v)) => Ok(v.as_str()),
            Some(other) => Err(Self::wrong_type(name, "text", other)),
        }
    }

    pub fn get_long_array(&self, name: &str) -> Result<&[i64], OptionError> {
        match self.values.get(name) {
            None => Err(OptionError::Missing(name.to_string())),
            Some(OptionValue::LongArray(v)) => Ok(v.as_slice()),
            Some(other) => Err(Self::wrong_type(name, "long array", other)),
        }
    }

    pub fn get_vec3(&self, name: &str) -> Result<Vec3, OptionError> {
        match self.values.get(name) {
            None => Err(OptionError::Missing(name.to_string())),
            Some(OptionValue::Vec3(v)) => Ok(*v),
            Some(other) => Err(Self::wrong_type(name, "vec3", other)),
        }
    }

    pub fn get_vec4(&self, name: &str) -> Result<Vec4, OptionError> {
        match self.values.get(name) {
            None => Err(OptionError::Missing(name.to_string())),
            Some(OptionValue::Vec4(v)) => Ok(*v),
            Some(other) => Err(Self::wrong_type(name, "vec4", other)),
        }
    }

    /// Value of a bool option, or the default when unset or mistyped.
    pub fn get_bool_or(&self, name: &str, default: bool) -> bool {
        self.get_bool(name).unwrap_or(default)
    }

    pub fn get_long_or(&self, name: &str, default: i64) -> i64 {
        self.get_long(name).unwrap_or(default)
    }

    pub fn get_double_or(&self, name: &str, default: f64) -> f64 {
        self.get_double(name).unwrap_or(default)
    }
}
