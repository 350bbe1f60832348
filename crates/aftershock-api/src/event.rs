//! Intercepted occurrences

use aftershock_util::{ActionId, EntityId, EventId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::json::{get_bool, get_object, get_str, value_to_plain_string};
use crate::{
    json_class, Action, ActionKind, EaParam, SchemaError, SchemaResult, CLASS_ACCEPT_EVENT_ACTION,
    CLASS_FUNCTION_CALL_EVENT, CLASS_FUNCTION_RETURN_EVENT, TYPE_ACTION, TYPE_EVENT,
};

/// Kind of an intercepted occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    FuncCall,
    FuncReturn,
    /// Opaque occurrence whose meaning lives entirely in its JSON payload
    #[serde(rename = "_JSON")]
    Json,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FuncCall => "FuncCall",
            EventKind::FuncReturn => "FuncReturn",
            EventKind::Json => "_JSON",
        }
    }
}

impl FromStr for EventKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FuncCall" => Ok(EventKind::FuncCall),
            "FuncReturn" => Ok(EventKind::FuncReturn),
            "_JSON" => Ok(EventKind::Json),
            other => Err(SchemaError::UnknownEventKind(other.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame of the stack captured at the interception point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub line_number: i32,
    pub class_name: String,
    pub method_name: String,
    pub file_name: String,
}

/// A named argument of the intercepted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedParam {
    pub name: String,
    pub value: String,
}

/// Runtime-specific details some inspectors attach (currently JVM inspectors)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMetadata {
    pub thread_name: String,
    pub stack: Vec<StackFrame>,
    pub params: Vec<NamedParam>,
}

/// An intercepted occurrence reported by an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub arrived_at: DateTime<Local>,
    pub entity_id: EntityId,
    pub event_id: EventId,
    pub kind: EventKind,
    pub params: EaParam,
    /// Calls and packets are deferred until a decision arrives; log lines are not
    pub deferred: bool,
    pub platform: Option<PlatformMetadata>,
}

impl Event {
    /// A deferred function call occurrence
    pub fn func_call(entity_id: EntityId, name: impl Into<String>) -> Self {
        Self::function(EventKind::FuncCall, entity_id, name.into())
    }

    /// A deferred function return occurrence
    pub fn func_return(entity_id: EntityId, name: impl Into<String>) -> Self {
        Self::function(EventKind::FuncReturn, entity_id, name.into())
    }

    fn function(kind: EventKind, entity_id: EntityId, name: String) -> Self {
        let mut params = EaParam::new();
        params.insert("name".into(), Value::String(name));
        Self {
            arrived_at: aftershock_util::now(),
            entity_id,
            event_id: EventId::new_v4(),
            kind,
            params,
            deferred: true,
            platform: None,
        }
    }

    pub fn with_platform(mut self, platform: PlatformMetadata) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn validate(&self) -> SchemaResult<()> {
        // Opaque payloads are schema-checked by whoever produced them.
        if self.event_id.is_empty() {
            return Err(SchemaError::MissingEventId);
        }
        Ok(())
    }

    /// Function name of a call/return occurrence
    pub fn func_name(&self) -> Option<&str> {
        match self.kind {
            EventKind::FuncCall | EventKind::FuncReturn => {
                self.params.get("name").and_then(Value::as_str)
            }
            EventKind::Json => self
                .params
                .get("option")
                .and_then(|o| o.get("func_name"))
                .and_then(Value::as_str),
        }
    }

    /// Wire/JSON representation. Opaque events return their payload as is.
    pub fn to_json_map(&self) -> EaParam {
        let class = match self.kind {
            EventKind::FuncCall => CLASS_FUNCTION_CALL_EVENT,
            EventKind::FuncReturn => CLASS_FUNCTION_RETURN_EVENT,
            EventKind::Json => return self.params.clone(),
        };

        let mut option = EaParam::new();
        if let Some(name) = self.params.get("name") {
            option.insert("func_name".into(), name.clone());
        }
        if let Some(platform) = &self.platform {
            option.insert("thread_name".into(), Value::String(platform.thread_name.clone()));
            let stack: Vec<Value> = platform
                .stack
                .iter()
                .map(|frame| {
                    json!({
                        "line_number": frame.line_number,
                        "class_name": frame.class_name,
                        "method_name": frame.method_name,
                        "file_name": frame.file_name,
                    })
                })
                .collect();
            option.insert("stack".into(), Value::Array(stack));
            for param in &platform.params {
                option.insert(param.name.clone(), Value::String(param.value.clone()));
            }
        }

        let mut m = EaParam::new();
        m.insert("type".into(), Value::String(TYPE_EVENT.into()));
        m.insert("class".into(), Value::String(class.into()));
        m.insert("deferred".into(), Value::Bool(self.deferred));
        m.insert("entity".into(), Value::String(self.entity_id.to_string()));
        m.insert("uuid".into(), Value::String(self.event_id.to_string()));
        m.insert("option".into(), Value::Object(option));
        m
    }

    /// Rebuild a typed event from its JSON representation.
    ///
    /// Classes other than function call/return produce an opaque event that
    /// keeps the payload verbatim.
    pub fn from_json_map(map: EaParam, arrived_at: DateTime<Local>) -> SchemaResult<Self> {
        let kind = match json_class(&map) {
            Some(CLASS_FUNCTION_CALL_EVENT) => Some(EventKind::FuncCall),
            Some(CLASS_FUNCTION_RETURN_EVENT) => Some(EventKind::FuncReturn),
            _ => None,
        };
        let Some(kind) = kind else {
            let entity_id = EntityId::new(get_str(&map, "entity")?);
            return Self::opaque_from_json_map(map, arrived_at, entity_id);
        };

        let ty = get_str(&map, "type")?;
        if ty != TYPE_EVENT {
            return Err(SchemaError::UnknownClass(format!("{}/{}", ty, kind)));
        }

        let option = get_object(&map, "option")?;
        let mut params = EaParam::new();
        if let Some(name) = option.get("func_name") {
            params.insert("name".into(), name.clone());
        }

        let platform = match option.get("thread_name") {
            Some(thread_name) => Some(platform_from_option(thread_name, option)?),
            None => None,
        };

        let event = Self {
            arrived_at,
            entity_id: EntityId::new(get_str(&map, "entity")?),
            event_id: EventId::new(get_str(&map, "uuid")?),
            kind,
            params,
            deferred: get_bool(&map, "deferred")?,
            platform,
        };
        event.validate()?;
        Ok(event)
    }

    /// Wrap a JSON payload as an opaque event, keeping it verbatim
    pub fn opaque_from_json_map(
        map: EaParam,
        arrived_at: DateTime<Local>,
        entity_id: EntityId,
    ) -> SchemaResult<Self> {
        let event_id = EventId::new(get_str(&map, "uuid")?);
        let deferred = get_bool(&map, "deferred")?;
        let event = Self {
            arrived_at,
            entity_id,
            event_id,
            kind: EventKind::Json,
            params: map,
            deferred,
            platform: None,
        };
        event.validate()?;
        Ok(event)
    }

    /// Decision letting this occurrence proceed.
    ///
    /// Decisions for non-deferred occurrences are orchestrator-local and are
    /// never sent back to the inspector.
    pub fn make_accept_action(&self) -> SchemaResult<Action> {
        let action_id = ActionId::new_v4();
        let local = !self.deferred;

        let action = if self.kind == EventKind::Json {
            let event_uuid = get_str(&self.params, "uuid")?.to_string();
            let mut option = EaParam::new();
            option.insert("event_uuid".into(), Value::String(event_uuid));

            let mut params = EaParam::new();
            params.insert("type".into(), Value::String(TYPE_ACTION.into()));
            params.insert("class".into(), Value::String(CLASS_ACCEPT_EVENT_ACTION.into()));
            params.insert("entity".into(), Value::String(self.entity_id.to_string()));
            params.insert("uuid".into(), Value::String(action_id.to_string()));
            params.insert("option".into(), Value::Object(option));

            Action {
                entity_id: self.entity_id.clone(),
                action_id,
                kind: ActionKind::Json,
                params,
                local,
                event: Some(self.clone()),
                fault: None,
            }
        } else {
            Action {
                entity_id: self.entity_id.clone(),
                action_id,
                kind: ActionKind::Accept,
                params: EaParam::new(),
                local,
                event: Some(self.clone()),
                fault: None,
            }
        };

        action.validate()?;
        Ok(action)
    }
}

fn platform_from_option(thread_name: &Value, option: &EaParam) -> SchemaResult<PlatformMetadata> {
    let thread_name = thread_name
        .as_str()
        .ok_or(SchemaError::WrongType {
            field: "thread_name",
            expected: "string",
        })?
        .to_string();

    let mut stack = Vec::new();
    if let Some(frames) = option.get("stack") {
        let frames = frames.as_array().ok_or(SchemaError::WrongType {
            field: "stack",
            expected: "array",
        })?;
        for frame in frames {
            let frame = frame.as_object().ok_or(SchemaError::WrongType {
                field: "stack",
                expected: "array of objects",
            })?;
            let line_number = frame
                .get("line_number")
                .and_then(Value::as_i64)
                .ok_or(SchemaError::MissingField("line_number"))?;
            let line_number = i32::try_from(line_number).map_err(|_| SchemaError::WrongType {
                field: "line_number",
                expected: "32-bit integer",
            })?;
            stack.push(StackFrame {
                line_number,
                class_name: get_str(frame, "class_name")?.to_string(),
                method_name: get_str(frame, "method_name")?.to_string(),
                file_name: get_str(frame, "file_name")?.to_string(),
            });
        }
    }

    let params = option
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "func_name" | "thread_name" | "stack"))
        .map(|(key, value)| NamedParam {
            name: key.clone(),
            value: value_to_plain_string(value),
        })
        .collect();

    Ok(PlatformMetadata {
        thread_name,
        stack,
        params,
    })
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Json => write!(f, "JSONEvent{{{}}}", Value::Object(self.params.clone())),
            _ => write!(
                f,
                "Event{{entity={}, type={}, param={}}}",
                self.entity_id,
                self.kind,
                Value::Object(self.params.clone())
            ),
        }
    }
}

/// Behavioral equality of two occurrences across runs.
///
/// Ids, arrival times, thread names and stacks are ignored; named platform
/// parameters are compared by name when both sides carry them.
pub fn are_events_equal(a: Option<&Event>, b: Option<&Event>) -> bool {
    let (a, b) = match (a, b) {
        (None, None) => return true,
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };

    if a.entity_id != b.entity_id || a.kind != b.kind || a.params != b.params {
        return false;
    }

    match (&a.platform, &b.platform) {
        (Some(pa), Some(pb)) => same_named_params(&pa.params, &pb.params),
        _ => true,
    }
}

fn same_named_params(a: &[NamedParam], b: &[NamedParam]) -> bool {
    let by_name = |params: &[NamedParam]| -> BTreeMap<String, String> {
        params
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    };
    a.len() == b.len() && by_name(a) == by_name(b)
}

/// Pairwise [`are_events_equal`] over two slices
pub fn are_event_slices_equal(a: &[Event], b: &[Event]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| are_events_equal(Some(x), Some(y)))
}
