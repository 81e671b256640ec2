use serde_json::{Map, Value};

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "confirmpassword",
    "newpassword",
    "otp",
    "token",
    "secret",
    "authorization",
    "store_passwd",
    "store_password",
    "cookie",
];

/// Masks credential-like fields in a JSON payload before it is logged.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let val = if is_sensitive_field(key) {
                        mask_value(val)
                    } else {
                        sanitize_json(val)
                    };
                    (key.clone(), val)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

/// Parses an `application/x-www-form-urlencoded` body into a sanitized JSON
/// object. Repeated keys keep their last value.
pub fn sanitize_form(body: &[u8]) -> Value {
    let map: Map<String, Value> = url::form_urlencoded::parse(body)
        .map(|(key, val)| (key.into_owned(), Value::String(val.into_owned())))
        .collect();
    sanitize_json(&Value::Object(map))
}

fn is_sensitive_field(key: &str) -> bool {
    let key = key.to_ascii_lowercase().replace(&['_', '-'][..], "");
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| key == sensitive.replace('_', ""))
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.len() > 8 && s.is_ascii() => {
            Value::String(format!("{}****{}", &s[..2], &s[s.len() - 2..]))
        }
        _ => Value::String("****".to_string()),
    }
}
