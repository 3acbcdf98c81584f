//! Command frames as router requests.
//!
//! `{"cmdName":"led","r":1,"mode":"on"}` becomes `led?mode=on&r=1`.
//! Keys follow the JSON object's iteration order (sorted). String values
//! are used bare, anything else as compact JSON. `&`, `=`, `%` and `?`
//! are percent-encoded so a value cannot split the query.

use serde_json::Value;

const CMD_NAME: &str = "cmdName";

/// `cmdName?k=v&...` for a command-frame JSON object.
pub fn request_from_json(json: &Value) -> String {
    let mut req = json
        .get(CMD_NAME)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let query = query_from_json(json);
    if !query.is_empty() {
        req.push('?');
        req.push_str(&query);
    }
    req
}

/// Every top-level field except `cmdName`, as `k=v` pairs.
pub fn query_from_json(json: &Value) -> String {
    let Some(obj) = json.as_object() else {
        return String::new();
    };
    let mut out = String::new();
    for (key, value) in obj.iter().filter(|(k, _)| k.as_str() != CMD_NAME) {
        if !out.is_empty() {
            out.push('&');
        }
        push_escaped(&mut out, key);
        out.push('=');
        match value {
            Value::String(s) => push_escaped(&mut out, s),
            other => push_escaped(&mut out, &other.to_string()),
        }
    }
    out
}

fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '%' => out.push_str("%25"),
            '?' => out.push_str("%3F"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(s: &str) -> String {
        request_from_json(&serde_json::from_str(s).unwrap())
    }

    #[test]
    fn fields_become_query() {
        assert_eq!(req(r#"{"cmdName":"led","r":1,"mode":"on"}"#), "led?mode=on&r=1");
    }

    #[test]
    fn bare_command() {
        assert_eq!(req(r#"{"cmdName":"reset"}"#), "reset");
    }

    #[test]
    fn nested_and_reserved_values() {
        assert_eq!(
            req(r#"{"cmdName":"x","a":"p&q=r","b":true,"c":[1,2]}"#),
            "x?a=p%26q%3Dr&b=true&c=[1,2]"
        );
    }

    #[test]
    fn non_object_gives_empty() {
        assert_eq!(request_from_json(&Value::Null), "");
    }
}
