//! Typed parameter values.
//!
//! Every parameter, static or dynamic, carries one of four value types:
//! boolean, 32-bit signed integer, 32-bit float, or a bounded owned string.
//! The type of a parameter is fixed at creation and never changes.

use heapless::String;
use serde::ser::{Serialize, Serializer};

/// Maximum length of a string parameter value.
pub const PARAM_STR_MAX: usize = 64;

/// Maximum length of a parameter name.
pub const PARAM_NAME_MAX: usize = 32;

/// The type tag of a parameter value.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParamKind {
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Integer,
    /// 32-bit floating point number.
    Float,
    /// Bounded string.
    Str,
}

/// A typed parameter value.
///
/// Serializes as a bare JSON scalar so values can be embedded directly in
/// shadow documents and device-info reports under their parameter names.
#[derive(Debug, PartialEq, Clone)]
pub enum ParamValue {
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer value.
    Integer(i32),
    /// 32-bit floating point value.
    Float(f32),
    /// Owned string value, bounded by [`PARAM_STR_MAX`].
    Str(String<PARAM_STR_MAX>),
}

impl ParamValue {
    /// The type tag of this value.
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Integer(_) => ParamKind::Integer,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Str(_) => ParamKind::Str,
        }
    }

    /// Build a string value, failing if `s` exceeds [`PARAM_STR_MAX`].
    pub fn str(s: &str) -> Option<Self> {
        String::try_from(s).ok().map(ParamValue::Str)
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Bool(b) => serializer.serialize_bool(*b),
            ParamValue::Integer(i) => serializer.serialize_i32(*i),
            ParamValue::Float(x) => serializer.serialize_f32(*x),
            ParamValue::Str(s) => serializer.serialize_str(s.as_str()),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ParamKind {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ParamKind::Bool => defmt::write!(f, "Bool"),
            ParamKind::Integer => defmt::write!(f, "Integer"),
            ParamKind::Float => defmt::write!(f, "Float"),
            ParamKind::Str => defmt::write!(f, "Str"),
        }
    }
}
