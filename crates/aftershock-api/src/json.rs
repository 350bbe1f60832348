//! JSON schema vocabulary for opaque occurrences and decisions
//!
//! Objects look like
//! `{"type": "event"|"action", "class": ..., "deferred": ..., "entity": ...,
//!   "uuid": ..., "option": {...}}`.

use serde_json::{Map, Value};

use crate::{SchemaError, SchemaResult};

/// Free-form key/value parameters of an event or action
pub type EaParam = Map<String, Value>;

pub const TYPE_EVENT: &str = "event";
pub const TYPE_ACTION: &str = "action";

pub const CLASS_FUNCTION_CALL_EVENT: &str = "FunctionCallEvent";
pub const CLASS_FUNCTION_RETURN_EVENT: &str = "FunctionReturnEvent";
pub const CLASS_ACCEPT_EVENT_ACTION: &str = "AcceptEventAction";
pub const CLASS_EXECUTE_COMMAND_ACTION: &str = "ExecuteCommandOnOrchestratorAction";

pub(crate) fn get_str<'a>(map: &'a EaParam, field: &'static str) -> SchemaResult<&'a str> {
    match map.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(SchemaError::WrongType {
            field,
            expected: "string",
        }),
        None => Err(SchemaError::MissingField(field)),
    }
}

pub(crate) fn get_bool(map: &EaParam, field: &'static str) -> SchemaResult<bool> {
    match map.get(field) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(SchemaError::WrongType {
            field,
            expected: "bool",
        }),
        None => Err(SchemaError::MissingField(field)),
    }
}

pub(crate) fn get_object<'a>(map: &'a EaParam, field: &'static str) -> SchemaResult<&'a EaParam> {
    match map.get(field) {
        Some(Value::Object(o)) => Ok(o),
        Some(_) => Err(SchemaError::WrongType {
            field,
            expected: "object",
        }),
        None => Err(SchemaError::MissingField(field)),
    }
}

/// The `class` of an opaque payload, if it has one
pub fn json_class(map: &EaParam) -> Option<&str> {
    map.get("class").and_then(Value::as_str)
}

/// Render a JSON value the way inspectors send named parameters: strings
/// verbatim, anything else in its JSON form
pub(crate) fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
