use serde::Serialize;
use serde_json::{Map, Value};

/// Canonical encoding used for every hash in the node: JSON with object keys sorted
/// recursively, so that two semantically equal structures always produce the same bytes.
pub fn encode<M: Serialize>(message: M) -> anyhow::Result<Vec<u8>> {
    let value = serde_json::to_value(&message)?;
    serde_json::to_vec(&canonicalize(value)).map_err(|e| anyhow::anyhow!(e))
}

/// Rebuilds objects with their keys in sorted order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries = map.into_iter().collect::<Vec<_>>();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let sorted = entries
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect::<Map<String, Value>>();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

pub fn to_hex<T: AsRef<[u8]>>(data: T) -> String {
    array_bytes::bytes2hex("", data.as_ref())
}

pub fn from_hex<T: AsRef<[u8]>>(data: T) -> anyhow::Result<Vec<u8>> {
    array_bytes::hex2bytes(data.as_ref()).map_err(|_| anyhow::anyhow!("Invalid hex string"))
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_key_order_does_not_change_encoding() {
        let mut first = HashMap::new();
        first.insert("b", json!({"y": 1, "x": [ {"d": 1, "c": 2} ]}));
        first.insert("a", json!(2));

        let second = json!({"a": 2, "b": {"x": [ {"c": 2, "d": 1} ], "y": 1}});

        assert_eq!(encode(&first).unwrap(), encode(&second).unwrap());
        assert_eq!(
            String::from_utf8(encode(&second).unwrap()).unwrap(),
            r#"{"a":2,"b":{"x":[{"c":2,"d":1}],"y":1}}"#
        );
    }

    #[test]
    fn test_hex_round_trip() {
        let bytes = vec![0u8, 1, 254, 255];
        assert_eq!(to_hex(&bytes), "0001feff");
        assert_eq!(from_hex("0001feff").unwrap(), bytes);
        assert!(from_hex("xyz").is_err());
    }
}
