use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::Params;

/// Fingerprint of a logical request.
///
/// `null` parameters are dropped, the rest are serialized as compact JSON with
/// keys sorted at every level, and `"{model}::{text}::{params}"` is hashed
/// with SHA-256. Returns 64 lowercase hex characters.
pub fn cache_key(model: &str, text: &str, params: &Params) -> String {
    let cleaned: Params = params
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let serialized = canonicalize(Value::Object(cleaned)).to_string();

    let digest = Sha256::digest(format!("{model}::{text}::{serialized}").as_bytes());
    hex::encode(digest)
}

// Rebuild objects with keys inserted in sorted order so the output does not
// depend on whether serde_json's map preserves insertion order.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn known_digests() {
        assert_eq!(
            cache_key("tts", "hi", &params(json!({"voice": "x"}))),
            "ef5603a1f04acd0f00b267daa4e3deb7b1ff80a36a1b741316ff93b005311668"
        );
        assert_eq!(
            cache_key("tts", "hi", &Params::new()),
            "5af8027094e7c7650b600c950d15a6f85adeaac6c8bc9da8625af5a92b3c9b77"
        );
        assert_eq!(
            cache_key(
                "kokoro",
                "Hello world!",
                &params(json!({"voice": "af_heart", "speed": 1.0}))
            ),
            "9f6fe73c6dbae8ce2f57e67d4cd4d533355fd20312f9670ccf5a12515d88120d"
        );
    }

    #[test]
    fn null_params_are_ignored() {
        assert_eq!(
            cache_key("tts", "hi", &params(json!({"voice": "x", "seed": null}))),
            cache_key("tts", "hi", &params(json!({"voice": "x"})))
        );
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut a = Params::new();
        a.insert("voice".to_string(), json!("x"));
        a.insert("speed".to_string(), json!(1.2));
        let mut b = Params::new();
        b.insert("speed".to_string(), json!(1.2));
        b.insert("voice".to_string(), json!("x"));
        assert_eq!(cache_key("tts", "hi", &a), cache_key("tts", "hi", &b));
    }

    #[test]
    fn every_component_changes_the_key() {
        let base = cache_key("tts", "hi", &params(json!({"voice": "x"})));
        assert_ne!(base, cache_key("tts2", "hi", &params(json!({"voice": "x"}))));
        assert_ne!(base, cache_key("tts", "hi!", &params(json!({"voice": "x"}))));
        assert_ne!(base, cache_key("tts", "hi", &params(json!({"voice": "y"}))));
    }

    #[test]
    fn key_is_lowercase_hex() {
        let key = cache_key("tts", "hi", &Params::new());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
