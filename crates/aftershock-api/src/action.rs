//! Scheduling decisions

use aftershock_util::{ActionId, EntityId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::{
    json_class, EaParam, Event, SchemaError, SchemaResult, CLASS_ACCEPT_EVENT_ACTION,
    CLASS_EXECUTE_COMMAND_ACTION, TYPE_ACTION,
};

/// Kind of a scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Let the tied occurrence proceed
    Accept,
    /// Out-of-band fault: terminate the entity
    Kill,
    /// Opaque pass-through decision
    #[serde(rename = "_JSON")]
    Json,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Accept => "Accept",
            ActionKind::Kill => "Kill",
            ActionKind::Json => "_JSON",
        }
    }
}

impl FromStr for ActionKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Accept" => Ok(ActionKind::Accept),
            "Kill" => Ok(ActionKind::Kill),
            "_JSON" => Ok(ActionKind::Json),
            other => Err(SchemaError::UnknownActionKind(other.to_string())),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a fault decision was triggered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub triggered_at: DateTime<Local>,
}

/// A scheduling decision, tied to zero or one occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub entity_id: EntityId,
    pub action_id: ActionId,
    pub kind: ActionKind,
    pub params: EaParam,
    /// Never propagated to the inspector (decisions for non-deferred occurrences)
    pub local: bool,
    pub event: Option<Event>,
    pub fault: Option<Fault>,
}

impl Action {
    pub fn validate(&self) -> SchemaResult<()> {
        match self.kind {
            ActionKind::Json => {}
            ActionKind::Accept => {
                if self.event.is_none() {
                    return Err(SchemaError::AcceptWithoutEvent);
                }
            }
            ActionKind::Kill => {
                if self.event.is_some() {
                    return Err(SchemaError::KillWithEvent);
                }
            }
        }
        if self.action_id.is_empty() {
            return Err(SchemaError::MissingActionId);
        }
        Ok(())
    }

    /// Whether this decision lets its occurrence proceed, in either the typed
    /// or the opaque form
    pub fn is_accept(&self) -> bool {
        match self.kind {
            ActionKind::Accept => true,
            ActionKind::Json => json_class(&self.params) == Some(CLASS_ACCEPT_EVENT_ACTION),
            ActionKind::Kill => false,
        }
    }

    /// JSON representation. Typed accepts are rendered as the opaque
    /// `AcceptEventAction` of the tied occurrence.
    pub fn to_json_map(&self) -> SchemaResult<EaParam> {
        match self.kind {
            ActionKind::Json => Ok(self.params.clone()),
            ActionKind::Accept => {
                let event = self.event.as_ref().ok_or(SchemaError::AcceptWithoutEvent)?;
                let opaque = Event::opaque_from_json_map(
                    event.to_json_map(),
                    event.arrived_at,
                    event.entity_id.clone(),
                )?;
                let mut map = opaque.make_accept_action()?.params;
                map.insert("uuid".into(), Value::String(self.action_id.to_string()));
                Ok(map)
            }
            ActionKind::Kill => {
                let mut option = EaParam::new();
                option.insert("command".into(), Value::String("_not_available".into()));

                let mut m = EaParam::new();
                m.insert("type".into(), Value::String(TYPE_ACTION.into()));
                m.insert("class".into(), Value::String(CLASS_EXECUTE_COMMAND_ACTION.into()));
                m.insert("entity".into(), Value::String(self.entity_id.to_string()));
                m.insert("uuid".into(), Value::String(self.action_id.to_string()));
                m.insert("option".into(), Value::Object(option));
                Ok(m)
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.event) {
            (ActionKind::Json, _) => write!(f, "JSONAction{{{}}}", Value::Object(self.params.clone())),
            (kind, Some(event)) => write!(f, "Action{{type={}, event={}}}", kind, event),
            (kind, None) => write!(f, "Action{{type={}, entity={}}}", kind, self.entity_id),
        }
    }
}

/// Out-of-band decision to kill an entity. Orchestrator-local, tied to no
/// occurrence.
pub fn make_fault_injection_action(entity_id: EntityId) -> Action {
    Action {
        entity_id,
        action_id: ActionId::new_v4(),
        kind: ActionKind::Kill,
        params: EaParam::new(),
        local: true,
        event: None,
        fault: Some(Fault {
            triggered_at: aftershock_util::now(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_requires_event() {
        let event = Event::func_call(EntityId::new("zk1"), "foo");
        let mut action = event.make_accept_action().unwrap();
        assert!(action.validate().is_ok());

        action.event = None;
        assert_eq!(action.validate(), Err(SchemaError::AcceptWithoutEvent));
    }

    #[test]
    fn kill_must_not_carry_event() {
        let mut action = make_fault_injection_action(EntityId::new("zk1"));
        assert!(action.validate().is_ok());
        assert!(action.local);
        assert!(action.fault.is_some());

        action.event = Some(Event::func_call(EntityId::new("zk1"), "foo"));
        assert_eq!(action.validate(), Err(SchemaError::KillWithEvent));
    }

    #[test]
    fn empty_action_id_is_invalid() {
        let mut action = make_fault_injection_action(EntityId::new("zk1"));
        action.action_id = ActionId::new("");
        assert_eq!(action.validate(), Err(SchemaError::MissingActionId));
    }

    #[test]
    fn typed_accept_renders_as_accept_event_action() {
        let event = Event::func_call(EntityId::new("zk1"), "foo");
        let action = event.make_accept_action().unwrap();

        let map = action.to_json_map().unwrap();
        assert_eq!(map["type"], "action");
        assert_eq!(map["class"], "AcceptEventAction");
        assert_eq!(map["entity"], "zk1");
        assert_eq!(map["uuid"], action.action_id.as_str());
        assert_eq!(map["option"]["event_uuid"], event.event_id.as_str());
    }

    #[test]
    fn kill_renders_as_orchestrator_command() {
        let action = make_fault_injection_action(EntityId::new("zk2"));
        let map = action.to_json_map().unwrap();
        assert_eq!(map["class"], "ExecuteCommandOnOrchestratorAction");
        assert_eq!(map["entity"], "zk2");
        assert!(!action.is_accept());
    }

    #[test]
    fn kind_parses_known_values_only() {
        assert_eq!("Kill".parse::<ActionKind>().unwrap(), ActionKind::Kill);
        assert!(matches!(
            "Reject".parse::<ActionKind>(),
            Err(SchemaError::UnknownActionKind(_))
        ));
    }
}
