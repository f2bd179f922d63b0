//! Centralized redaction of sensitive fields in audit detail payloads.

use serde_json::Value;

const REDACTED: &str = "[REDACTED]";

/// Key fragments that mark a field as sensitive wherever it appears.
/// "token" covers access/refresh/bearer tokens; "key" variants cover api keys.
const SENSITIVE_FRAGMENTS: [&str; 7] = [
    "password",
    "token",
    "secret",
    "api_key",
    "api-key",
    "apikey",
    "authorization",
];

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_FRAGMENTS
        .iter()
        .any(|fragment| key.contains(fragment))
}

/// Recursively replaces the values of well-known sensitive keys with a
/// placeholder, regardless of call site. Applied to every detail payload
/// before storage.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_sensitive(key) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    redact(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_well_known_keys() {
        let mut detail = json!({
            "password": "hunter2",
            "api_key": "sk_live_123",
            "accessToken": "abc",
            "refresh_token": "def",
            "Authorization": "Bearer xyz",
            "note": "kept",
        });
        redact(&mut detail);

        assert_eq!(detail["password"], REDACTED);
        assert_eq!(detail["api_key"], REDACTED);
        assert_eq!(detail["accessToken"], REDACTED);
        assert_eq!(detail["refresh_token"], REDACTED);
        assert_eq!(detail["Authorization"], REDACTED);
        assert_eq!(detail["note"], "kept");
    }

    #[test]
    fn redacts_nested_objects_and_arrays() {
        let mut detail = json!({
            "request": {"headers": {"x-api-key": "k"}},
            "attempts": [{"client_secret": "s", "outcome": "denied"}],
        });
        redact(&mut detail);

        assert_eq!(detail["request"]["headers"]["x-api-key"], REDACTED);
        assert_eq!(detail["attempts"][0]["client_secret"], REDACTED);
        assert_eq!(detail["attempts"][0]["outcome"], "denied");
    }

    #[test]
    fn scalars_pass_through() {
        let mut detail = json!("free-form target descriptor");
        redact(&mut detail);
        assert_eq!(detail, "free-form target descriptor");
    }
}
