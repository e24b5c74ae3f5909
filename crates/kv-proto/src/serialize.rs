//! Typed-value-to-bulk-string serialization rules for `GET` and friends.

use kv_core::value::Value;

use crate::reply::Reply;

/// Serializes a typed value the way `GET` renders it on the wire: int64 as
/// decimal, double as the shortest round-trip decimal, bool as
/// `true`/`false`, binary and string as raw bytes, null as `$-1`.
pub fn value_to_reply(value: &Value) -> Reply {
    match value {
        Value::Null => Reply::null(),
        Value::String(bytes) | Value::Binary(bytes) => Reply::bulk(bytes.clone()),
        Value::Int64(v) => Reply::bulk(v.to_string().into_bytes()),
        Value::Double(v) => Reply::bulk(v.to_string().into_bytes()),
        Value::Bool(v) => Reply::bulk(if *v { "true" } else { "false" }.as_bytes().to_vec()),
    }
}
