//! Form-urlencoding of structured request bodies
//!
//! Nested values use bracket notation: `a[b]=1`, `list[]=2` for scalar
//! elements and `list[0][x]=3` for structured ones and nulls. Key segments are
//! percent-encoded, values are emitted verbatim.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

use super::error::RequestError;

/// Bytes `encodeURIComponent` leaves alone, besides ASCII alphanumerics
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Maximum nesting depth accepted for a structured body
pub const MAX_DEPTH: usize = 32;

/// Flatten a structured value into `key=value` pairs joined by `&`
pub fn encode_body(value: &Value) -> Result<String, RequestError> {
    let mut pairs = Vec::new();
    walk(value, "", 0, &mut pairs)?;
    Ok(pairs.join("&"))
}

fn walk(value: &Value, key: &str, depth: usize, pairs: &mut Vec<String>) -> Result<(), RequestError> {
    if depth > MAX_DEPTH {
        return Err(RequestError::BodyTooDeep { max: MAX_DEPTH });
    }

    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let child = if key.is_empty() {
                    i.to_string()
                } else if is_structured(item) || item.is_null() {
                    format!("{}[{}]", key, i)
                } else {
                    format!("{}[]", key)
                };
                walk(item, &child, depth + 1, pairs)?;
            }
        }
        Value::Object(map) => {
            for (field, item) in map {
                let field = encode_component(field);
                let child = if key.is_empty() {
                    field
                } else {
                    format!("{}[{}]", key, field)
                };
                walk(item, &child, depth + 1, pairs)?;
            }
        }
        scalar => pairs.push(format!("{}={}", key, scalar_text(scalar))),
    }

    Ok(())
}

/// True for values that nest (sequences and mappings)
pub fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Percent-encode everything outside the `encodeURIComponent` unreserved set
pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_nested_body() {
        let body = json!({"a": 1, "b": [2, 3], "c": {"d": 4}});
        assert_eq!(encode_body(&body).unwrap(), "a=1&b[]=2&b[]=3&c[d]=4");
    }

    #[test]
    fn test_encode_preserves_insertion_order() {
        let body = json!({"z": 1, "a": 2, "m": 3});
        assert_eq!(encode_body(&body).unwrap(), "z=1&a=2&m=3");
    }

    #[test]
    fn test_structured_array_elements_use_index() {
        let body = json!({"items": [{"id": 1}, {"id": 2}], "tags": ["x"]});
        assert_eq!(
            encode_body(&body).unwrap(),
            "items[0][id]=1&items[1][id]=2&tags[]=x"
        );
    }

    #[test]
    fn test_null_array_element_uses_index() {
        let body = json!({"k": [null, 1]});
        assert_eq!(encode_body(&body).unwrap(), "k[0]=null&k[]=1");
    }

    #[test]
    fn test_top_level_array_uses_bare_index() {
        let body = json!(["a", "b"]);
        assert_eq!(encode_body(&body).unwrap(), "0=a&1=b");
    }

    #[test]
    fn test_keys_encoded_values_verbatim() {
        let body = json!({"first name": "a b&c", "q": true, "n": null});
        assert_eq!(encode_body(&body).unwrap(), "first%20name=a b&c&q=true&n=null");
    }

    #[test]
    fn test_empty_containers_emit_nothing() {
        assert_eq!(encode_body(&json!({})).unwrap(), "");
        assert_eq!(encode_body(&json!({"a": [], "b": 1})).unwrap(), "b=1");
    }

    #[test]
    fn test_depth_guard() {
        let mut value = json!(1);
        for _ in 0..(MAX_DEPTH + 2) {
            value = json!({ "k": value });
        }
        assert_eq!(
            encode_body(&value),
            Err(RequestError::BodyTooDeep { max: MAX_DEPTH })
        );
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("abc-_.!~*'()"), "abc-_.!~*'()");
        assert_eq!(encode_component("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_component("é"), "%C3%A9");
        assert_eq!(encode_component("[k]=&+"), "%5Bk%5D%3D%26%2B");
    }
}
