//! Dotted property paths
//!
//! A single path setter shared by the reconciler, attach logic and node
//! property writes. `"material.color.r"` is split into segments and walked
//! through maps, list indices, vector and color components.

use crate::error::CoreError;
use crate::value::Value;

/// Split a dotted path into its segments, ignoring empty segments
pub fn split(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

fn invalid(path: &[&str], reason: impl Into<String>) -> CoreError {
    CoreError::InvalidPath {
        path: path.join("."),
        reason: reason.into(),
    }
}

/// Read the value at `path` below `target`
pub fn get<'a>(target: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let Some((head, rest)) = path.split_first() else {
        return Some(target);
    };
    match target {
        Value::Map(map) => get(map.get(*head)?, rest),
        Value::List(items) => {
            let index: usize = head.parse().ok()?;
            get(items.get(index)?, rest)
        }
        _ => None,
    }
}

/// Read a scalar component (`x`, `y`, `z`, `r`, `g`, `b`) of a vector or color
pub fn component(target: &Value, name: &str) -> Option<f64> {
    match (target, name) {
        (Value::Vec3(v), "x") => Some(v.x as f64),
        (Value::Vec3(v), "y") => Some(v.y as f64),
        (Value::Vec3(v), "z") => Some(v.z as f64),
        (Value::Color(c), "r") => Some(c.r as f64),
        (Value::Color(c), "g") => Some(c.g as f64),
        (Value::Color(c), "b") => Some(c.b as f64),
        _ => None,
    }
}

/// Write `value` at `path` below `target`.
///
/// Missing intermediate map entries are created. Returns `Ok(true)` when the
/// stored value changed and `Ok(false)` when it was already equal.
pub fn set(target: &mut Value, path: &[&str], value: Value) -> Result<bool, CoreError> {
    set_at(target, path, 0, value)
}

fn set_at(target: &mut Value, path: &[&str], depth: usize, value: Value) -> Result<bool, CoreError> {
    let Some(segment) = path.get(depth).copied() else {
        if *target == value {
            return Ok(false);
        }
        *target = value;
        return Ok(true);
    };
    let last = depth + 1 == path.len();

    if target.is_null() {
        *target = Value::Map(Default::default());
    }

    match target {
        Value::Map(map) => {
            let slot = map.entry(segment.to_string()).or_default();
            set_at(slot, path, depth + 1, value)
        }
        Value::List(items) => {
            let index: usize = segment
                .parse()
                .map_err(|_| invalid(path, format!("'{}' is not a list index", segment)))?;
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or_else(|| invalid(path, format!("index {} out of bounds ({})", index, len)))?;
            set_at(slot, path, depth + 1, value)
        }
        Value::Vec3(v) if last => {
            let n = value
                .as_f32()
                .ok_or_else(|| invalid(path, "vector components must be numbers"))?;
            let slot = match segment {
                "x" => &mut v.x,
                "y" => &mut v.y,
                "z" => &mut v.z,
                other => return Err(invalid(path, format!("no vector component '{}'", other))),
            };
            let changed = *slot != n;
            *slot = n;
            Ok(changed)
        }
        Value::Color(c) if last => {
            let n = value
                .as_f32()
                .ok_or_else(|| invalid(path, "color channels must be numbers"))?;
            let slot = match segment {
                "r" => &mut c.r,
                "g" => &mut c.g,
                "b" => &mut c.b,
                other => return Err(invalid(path, format!("no color channel '{}'", other))),
            };
            let changed = *slot != n;
            *slot = n;
            Ok(changed)
        }
        _ => Err(invalid(path, format!("cannot traverse into '{}'", segment))),
    }
}

/// Remove the entry at `path`. Returns whether something was removed.
pub fn remove(target: &mut Value, path: &[&str]) -> bool {
    let Some((head, rest)) = path.split_first() else {
        return false;
    };
    match target {
        Value::Map(map) if rest.is_empty() => map.remove(*head).is_some(),
        Value::Map(map) => map.get_mut(*head).is_some_and(|child| remove(child, rest)),
        Value::List(items) => match head.parse::<usize>() {
            Ok(index) if rest.is_empty() && index < items.len() => {
                items[index] = Value::Null;
                true
            }
            Ok(index) => items.get_mut(index).is_some_and(|child| remove(child, rest)),
            Err(_) => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Color;
    use trellis_math::Vec3;

    #[test]
    fn test_split_ignores_empty_segments() {
        assert_eq!(split("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(split("a..b"), vec!["a", "b"]);
        assert!(split("").is_empty());
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut root = Value::Null;
        assert!(set(&mut root, &["material", "roughness"], 0.5.into()).unwrap());
        assert_eq!(get(&root, &["material", "roughness"]), Some(&Value::Number(0.5)));
    }

    #[test]
    fn test_set_reports_unchanged() {
        let mut root = Value::Null;
        set(&mut root, &["opacity"], 0.3.into()).unwrap();
        assert!(!set(&mut root, &["opacity"], 0.3.into()).unwrap());
    }

    #[test]
    fn test_set_vector_component() {
        let mut root = Value::Null;
        set(&mut root, &["offset"], Vec3::ZERO.into()).unwrap();
        assert!(set(&mut root, &["offset", "y"], 2.0.into()).unwrap());
        assert_eq!(get(&root, &["offset"]), Some(&Value::Vec3(Vec3::new(0.0, 2.0, 0.0))));
    }

    #[test]
    fn test_set_color_channel() {
        let mut root = Value::Null;
        set(&mut root, &["tint"], Color::BLACK.into()).unwrap();
        set(&mut root, &["tint", "g"], 1.0.into()).unwrap();
        assert_eq!(get(&root, &["tint"]), Some(&Value::Color(Color::new(0.0, 1.0, 0.0))));
    }

    #[test]
    fn test_set_list_index() {
        let mut root = Value::Null;
        set(&mut root, &["items"], Value::List(vec![Value::Null, Value::Null])).unwrap();
        set(&mut root, &["items", "1"], "b".into()).unwrap();
        assert_eq!(get(&root, &["items", "1"]), Some(&Value::Text("b".into())));

        let err = set(&mut root, &["items", "5"], "x".into()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPath { .. }));
    }

    #[test]
    fn test_set_into_scalar_fails() {
        let mut root = Value::Null;
        set(&mut root, &["visible"], true.into()).unwrap();
        let err = set(&mut root, &["visible", "deep"], 1.0.into()).unwrap_err();
        assert!(format!("{}", err).contains("visible.deep"));
    }

    #[test]
    fn test_remove_entry() {
        let mut root = Value::Null;
        set(&mut root, &["a", "b"], 1.0.into()).unwrap();
        assert!(remove(&mut root, &["a", "b"]));
        assert!(!remove(&mut root, &["a", "b"]));
        assert!(get(&root, &["a", "b"]).is_none());
    }

    #[test]
    fn test_component_reads() {
        assert_eq!(component(&Value::Vec3(Vec3::new(1.0, 2.0, 3.0)), "z"), Some(3.0));
        assert_eq!(component(&Value::Color(Color::WHITE), "r"), Some(1.0));
        assert_eq!(component(&Value::Null, "x"), None);
    }
}
