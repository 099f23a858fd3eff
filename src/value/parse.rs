//! Lifting orchestrator-supplied JSON trees into [`Value`]s.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::diag::Diagnostics;
use crate::error::PlanError;

use super::{validate_resource_id, AttrType, Path, Value};

/// Key of the JSON object used to mark an unknown value on the wire.
pub const UNKNOWN_MARKER: &str = "$unknown";

/// Parses `raw` as a value of type `ty`.
///
/// Kind mismatches abort with [`PlanError::TypeMismatch`]. Refinement
/// failures (malformed resource identifiers, duplicate set elements) are
/// collected as error diagnostics so sibling problems surface together.
///
/// # Errors
///
/// Returns [`PlanError::TypeMismatch`] when a subtree has the wrong kind.
pub fn parse(raw: &JsonValue, ty: &AttrType) -> Result<(Value, Diagnostics), PlanError> {
    let mut diags = Diagnostics::new();
    let value = parse_at(raw, ty, &Path::root(), &mut diags)?;
    Ok((value, diags))
}

/// Parses `raw` and turns any error diagnostic into a failure.
///
/// # Errors
///
/// Returns [`PlanError::TypeMismatch`] on kind mismatches and
/// [`PlanError::ValidationFailure`] when refinements fail.
pub fn parse_strict(raw: &JsonValue, ty: &AttrType) -> Result<Value, PlanError> {
    let (value, diags) = parse(raw, ty)?;
    if diags.has_errors() {
        return Err(PlanError::ValidationFailure {
            count: diags.error_count(),
            diagnostics: diags,
        });
    }
    Ok(value)
}

fn is_unknown_marker(raw: &JsonValue) -> bool {
    matches!(raw, JsonValue::Object(map) if map.len() == 1 && map.get(UNKNOWN_MARKER) == Some(&JsonValue::Bool(true)))
}

fn mismatch(path: &Path, ty: &AttrType, raw: &JsonValue) -> PlanError {
    let found = match raw {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    };
    PlanError::TypeMismatch {
        path: path.to_string(),
        expected: ty.to_string(),
        found: found.to_string(),
    }
}

fn parse_at(
    raw: &JsonValue,
    ty: &AttrType,
    path: &Path,
    diags: &mut Diagnostics,
) -> Result<Value, PlanError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    if is_unknown_marker(raw) {
        return Ok(Value::Unknown);
    }

    let value = match (ty, raw) {
        (AttrType::String | AttrType::Json, JsonValue::String(s)) => Value::String(s.clone()),
        (AttrType::ResourceId, JsonValue::String(s)) => {
            validate_resource_id(path, s, diags);
            Value::String(s.clone())
        }
        (AttrType::Bool, JsonValue::Bool(b)) => Value::Bool(*b),
        (AttrType::Int32, JsonValue::Number(n)) => {
            let wide = n.as_i64().ok_or_else(|| mismatch(path, ty, raw))?;
            let narrow = i32::try_from(wide).map_err(|_| PlanError::TypeMismatch {
                path: path.to_string(),
                expected: ty.to_string(),
                found: format!("integer {wide} outside the int32 range"),
            })?;
            Value::Int32(narrow)
        }
        (AttrType::Int64, JsonValue::Number(n)) => {
            Value::Int64(n.as_i64().ok_or_else(|| mismatch(path, ty, raw))?)
        }
        (AttrType::Float64, JsonValue::Number(n)) => {
            Value::Float64(n.as_f64().ok_or_else(|| mismatch(path, ty, raw))?)
        }
        (AttrType::Number, JsonValue::Number(n)) => Value::Number(
            Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .map_err(|_| mismatch(path, ty, raw))?,
        ),
        (AttrType::Number, JsonValue::String(s)) => {
            Value::Number(Decimal::from_str(s).map_err(|_| mismatch(path, ty, raw))?)
        }
        (AttrType::List(elem), JsonValue::Array(items)) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_at(item, elem, &path.index(i), diags))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        (AttrType::Set(elem), JsonValue::Array(items)) => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                // A set element is addressed by its own value.
                let key = parse_at(item, elem, path, &mut Diagnostics::new())?;
                let parsed = parse_at(item, elem, &path.elem(&key), diags)?;
                if parsed.is_known() && out.iter().any(|seen| super::equal(seen, &parsed, elem)) {
                    diags.error(
                        path.clone(),
                        "Duplicate Set Element",
                        format!("This attribute contains duplicate values of: {}", parsed.canonical_key()),
                    );
                    continue;
                }
                out.push(parsed);
            }
            Value::Set(out)
        }
        (AttrType::Map(elem), JsonValue::Object(entries)) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), parse_at(v, elem, &path.key(k.clone()), diags)?)))
                .collect::<Result<BTreeMap<_, _>, PlanError>>()?,
        ),
        (AttrType::Object(fields), JsonValue::Object(entries)) => {
            if let Some(extra) = entries.keys().find(|k| !fields.contains_key(*k)) {
                return Err(PlanError::TypeMismatch {
                    path: path.attr(extra.clone()).to_string(),
                    expected: String::from("no such attribute"),
                    found: String::from("attribute"),
                });
            }
            let mut out = BTreeMap::new();
            for (name, field_ty) in fields {
                let field_raw = entries.get(name).unwrap_or(&JsonValue::Null);
                out.insert(name.clone(), parse_at(field_raw, field_ty, &path.attr(name.clone()), diags)?);
            }
            Value::Object(out)
        }
        _ => return Err(mismatch(path, ty, raw)),
    };

    Ok(value)
}
