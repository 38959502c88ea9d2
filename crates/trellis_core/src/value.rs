//! Dynamic property values
//!
//! Element props, constructor arguments and node-local properties are all
//! expressed as [`Value`]s so the reconciler can diff and apply them without
//! knowing the concrete engine type.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use trellis_math::Vec3;
use crate::graph::NodeKey;

/// Property bag keyed by (possibly dotted) property path
pub type Props = BTreeMap<String, Value>;

/// Linear RGB color
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Self = Self { r: 1.0, g: 1.0, b: 1.0 };
    pub const BLACK: Self = Self { r: 0.0, g: 0.0, b: 0.0 };

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Build a color from a packed `0xRRGGBB` integer
    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    /// Parse `#rrggbb` or `rrggbb`
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#').unwrap_or(text);
        if digits.len() != 6 {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Self::from_hex)
    }
}

/// A dynamically typed property value
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Vec3(Vec3),
    Color(Color),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Reference to another live node; never serialized
    #[serde(skip)]
    Node(NodeKey),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|n| n as f32)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeKey> {
        match self {
            Value::Node(key) => Some(*key),
            _ => None,
        }
    }

    /// Interpret as a vector: either a `Vec3`, a three element numeric list,
    /// or a single number applied to every component.
    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Value::Vec3(v) => Some(*v),
            Value::Number(n) => Some(Vec3::splat(*n as f32)),
            Value::List(items) if items.len() == 3 => Some(Vec3::new(
                items[0].as_f32()?,
                items[1].as_f32()?,
                items[2].as_f32()?,
            )),
            _ => None,
        }
    }

    /// Interpret as a color: a `Color`, a hex string, or a packed integer
    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            Value::Text(s) => Color::parse(s),
            Value::Number(n) if *n >= 0.0 => Some(Color::from_hex(*n as u32)),
            Value::List(items) if items.len() == 3 => Some(Color::new(
                items[0].as_f32()?,
                items[1].as_f32()?,
                items[2].as_f32()?,
            )),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec3> for Value {
    fn from(v: Vec3) -> Self {
        Value::Vec3(v)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<NodeKey> for Value {
    fn from(key: NodeKey) -> Self {
        Value::Node(key)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        let c = Color::from_hex(0xff8000);
        assert_eq!(c.r, 1.0);
        assert!((c.g - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(c.b, 0.0);
    }

    #[test]
    fn test_color_parse() {
        assert_eq!(Color::parse("#ffffff"), Some(Color::WHITE));
        assert_eq!(Color::parse("000000"), Some(Color::BLACK));
        assert_eq!(Color::parse("#fff"), None);
        assert_eq!(Color::parse("#zzzzzz"), None);
    }

    #[test]
    fn test_as_vec3_variants() {
        assert_eq!(Value::Vec3(Vec3::ONE).as_vec3(), Some(Vec3::ONE));
        assert_eq!(Value::Number(2.0).as_vec3(), Some(Vec3::splat(2.0)));
        let list = Value::List(vec![1.0.into(), 2.0.into(), 3.0.into()]);
        assert_eq!(list.as_vec3(), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(Value::Text("x".into()).as_vec3(), None);
    }

    #[test]
    fn test_as_color_variants() {
        assert_eq!(Value::from("#ff0000").as_color(), Some(Color::new(1.0, 0.0, 0.0)));
        assert_eq!(Value::Number(0x0000ff as f64).as_color(), Some(Color::new(0.0, 0.0, 1.0)));
        assert_eq!(Value::Bool(true).as_color(), None);
    }

    #[test]
    fn test_value_ron_roundtrip() {
        let value = Value::List(vec![Value::Number(1.0), Value::Text("a".into()), Value::Null]);
        let text = ron::to_string(&value).unwrap();
        let parsed: Value = ron::from_str(&text).unwrap();
        assert_eq!(parsed, value);
    }
}
