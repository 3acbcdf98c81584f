//! JSON result bodies sent back to peers.
//!
//! Every response is a flat JSON object:
//! ```text
//! {"req":"<request>","rslt":"ok"|"fail"[,<extra fields>]}
//! ```
//! `extra` is a fragment of further `"key":value` pairs without braces,
//! which keeps the engines free to add fields without building a `Value`.

use serde_json::Value;

use super::message::{MsgProtocol, MsgType, WireMessage};
use super::ricrest::{ElementCode, encode_str};

fn quoted(s: &str) -> String {
    Value::from(s).to_string()
}

/// `{"req":..,"rslt":"ok"|"fail"}` plus `extra`.
pub fn json_result(req: &str, ok: bool, extra: &str) -> String {
    let mut out = String::with_capacity(req.len() + extra.len() + 32);
    out.push_str("{\"req\":");
    out.push_str(&quoted(req));
    out.push_str(",\"rslt\":");
    out.push_str(if ok { "\"ok\"" } else { "\"fail\"" });
    if !extra.is_empty() {
        out.push(',');
        out.push_str(extra);
    }
    out.push('}');
    out
}

/// Like [`json_result`], adding `"error":<error>` on failure.
pub fn json_result_with_error(req: &str, ok: bool, error: &str, extra: &str) -> String {
    if ok || error.is_empty() {
        return json_result(req, ok, extra);
    }
    let mut fields = format!("\"error\":{}", quoted(error));
    if !extra.is_empty() {
        fields.push(',');
        fields.push_str(extra);
    }
    json_result(req, false, &fields)
}

/// `"key":"value"` fragment with the value escaped.
pub fn str_field(key: &str, value: &str) -> String {
    format!("\"{}\":{}", key, quoted(value))
}

/// Wrap `json` as a RICREST response-JSON message with no addressing yet.
pub fn cmd_resp_msg(json: &str) -> WireMessage {
    WireMessage::new(
        0,
        MsgProtocol::RicRest,
        0,
        MsgType::Response,
        encode_str(json, ElementCode::CmdRespJson),
    )
}

/// Response-JSON message addressed back to `req`.
pub fn response_to(req: &WireMessage, json: &str) -> WireMessage {
    let mut msg = cmd_resp_msg(json);
    msg.set_as_response(req);
    msg
}
