//! Translation between wire messages and occurrences/decisions

use aftershock_api::{Action, Event, NamedParam, PlatformMetadata, StackFrame};
use aftershock_util::EntityId;

use crate::inspector_msg_req::{self, event, java_specific_fields, JavaSpecificFields};
use crate::{InspectorMsgReq, InspectorMsgRsp, ProtocolError, ProtocolResult};

/// Turns requests into occurrences and decisions into responses.
///
/// In emulated mode every request becomes an opaque JSON occurrence, as a
/// REST inspector would have posted it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTranslator {
    emulate_rest: bool,
}

impl EventTranslator {
    pub fn new(emulate_rest: bool) -> Self {
        Self { emulate_rest }
    }

    pub fn emulates_rest(&self) -> bool {
        self.emulate_rest
    }

    pub fn make_event(&self, entity_id: &EntityId, req: &InspectorMsgReq) -> ProtocolResult<Event> {
        let wire = req
            .event
            .as_ref()
            .ok_or_else(|| malformed("request without event"))?;

        let mut event = match event_type(req)? {
            event::Type::FuncCall => {
                let name = wire
                    .func_call
                    .as_ref()
                    .and_then(|c| c.name.as_deref())
                    .ok_or_else(|| malformed("FUNC_CALL without func_call.name"))?;
                Event::func_call(entity_id.clone(), name)
            }
            event::Type::FuncReturn => {
                let name = wire
                    .func_return
                    .as_ref()
                    .and_then(|r| r.name.as_deref())
                    .ok_or_else(|| malformed("FUNC_RETURN without func_return.name"))?;
                Event::func_return(entity_id.clone(), name)
            }
            event::Type::Exit => return Err(malformed("EXIT carries no occurrence")),
        };

        if req.has_java_specific_fields == Some(1) {
            let fields = req
                .java_specific_fields
                .as_ref()
                .ok_or_else(|| malformed("has_java_specific_fields set without fields"))?;
            event = event.with_platform(platform_from_java_fields(fields));
        }

        if self.emulate_rest {
            event = Event::opaque_from_json_map(
                event.to_json_map(),
                event.arrived_at,
                entity_id.clone(),
            )?;
        }

        Ok(event)
    }

    /// Response for the request `msg_id`. Only accepting decisions can be
    /// expressed on the wire.
    pub fn make_response(&self, msg_id: i32, action: &Action) -> ProtocolResult<InspectorMsgRsp> {
        if action.is_accept() {
            Ok(InspectorMsgRsp::ack(msg_id))
        } else {
            Err(ProtocolError::UnsupportedAction(action.to_string()))
        }
    }
}

/// Request type, checked to be EVENT
pub fn request_type(req: &InspectorMsgReq) -> ProtocolResult<inspector_msg_req::Type> {
    let raw = req.r#type.ok_or_else(|| malformed("request without type"))?;
    inspector_msg_req::Type::try_from(raw).map_err(|_| ProtocolError::UnexpectedRequestType(raw))
}

/// Occurrence type carried by an EVENT request
pub fn event_type(req: &InspectorMsgReq) -> ProtocolResult<event::Type> {
    let raw = req
        .event
        .as_ref()
        .and_then(|e| e.r#type)
        .ok_or_else(|| malformed("request without event type"))?;
    event::Type::try_from(raw).map_err(|_| malformed(format!("unknown event type {}", raw)))
}

pub fn platform_from_java_fields(fields: &JavaSpecificFields) -> PlatformMetadata {
    PlatformMetadata {
        thread_name: fields.thread_name.clone().unwrap_or_default(),
        stack: fields
            .stack_trace_elements
            .iter()
            .map(|e| StackFrame {
                line_number: e.line_number.unwrap_or_default(),
                class_name: e.class_name.clone().unwrap_or_default(),
                method_name: e.method_name.clone().unwrap_or_default(),
                file_name: e.file_name.clone().unwrap_or_default(),
            })
            .collect(),
        params: fields
            .params
            .iter()
            .map(|p| NamedParam {
                name: p.name.clone().unwrap_or_default(),
                value: p.value.clone().unwrap_or_default(),
            })
            .collect(),
    }
}

pub fn java_fields_from_platform(platform: &PlatformMetadata) -> JavaSpecificFields {
    JavaSpecificFields {
        thread_name: Some(platform.thread_name.clone()),
        nr_stack_trace_elements: Some(platform.stack.len() as i32),
        stack_trace_elements: platform
            .stack
            .iter()
            .map(|f| java_specific_fields::StackTraceElement {
                line_number: Some(f.line_number),
                class_name: Some(f.class_name.clone()),
                method_name: Some(f.method_name.clone()),
                file_name: Some(f.file_name.clone()),
            })
            .collect(),
        nr_params: Some(platform.params.len() as i32),
        params: platform
            .params
            .iter()
            .map(|p| java_specific_fields::Param {
                name: Some(p.name.clone()),
                value: Some(p.value.clone()),
            })
            .collect(),
    }
}

fn malformed(message: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedMessage(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aftershock_api::{make_fault_injection_action, json_class, EventKind};
    use crate::inspector_msg_rsp;

    fn platform() -> PlatformMetadata {
        PlatformMetadata {
            thread_name: "main".into(),
            stack: vec![StackFrame {
                line_number: 42,
                class_name: "org.apache.zookeeper.Leader".into(),
                method_name: "lead".into(),
                file_name: "Leader.java".into(),
            }],
            params: vec![NamedParam {
                name: "zxid".into(),
                value: "0x100000001".into(),
            }],
        }
    }

    #[test]
    fn test_typed_event() {
        let translator = EventTranslator::new(false);
        let entity = EntityId::new("zk1");
        let req = InspectorMsgReq::new_event("zk1", 1, inspector_msg_req::Event::for_call("foo"));

        let event = translator.make_event(&entity, &req).unwrap();
        assert_eq!(event.kind, EventKind::FuncCall);
        assert_eq!(event.func_name(), Some("foo"));
        assert_eq!(event.entity_id, entity);
        assert!(event.deferred);
        assert!(event.platform.is_none());
    }

    #[test]
    fn test_platform_metadata() {
        let translator = EventTranslator::new(false);
        let entity = EntityId::new("zk1");
        let req = InspectorMsgReq::new_event("zk1", 1, inspector_msg_req::Event::for_return("bar"))
            .with_java_fields(java_fields_from_platform(&platform()));

        let event = translator.make_event(&entity, &req).unwrap();
        assert_eq!(event.kind, EventKind::FuncReturn);
        assert_eq!(event.platform, Some(platform()));
    }

    #[test]
    fn test_emulated_event_is_opaque() {
        let translator = EventTranslator::new(true);
        let entity = EntityId::new("zk2");
        let req = InspectorMsgReq::new_event("zk2", 5, inspector_msg_req::Event::for_call("foo"))
            .with_java_fields(java_fields_from_platform(&platform()));

        let event = translator.make_event(&entity, &req).unwrap();
        assert_eq!(event.kind, EventKind::Json);
        assert_eq!(json_class(&event.params), Some("FunctionCallEvent"));
        assert_eq!(event.params["entity"], "zk2");
        assert_eq!(event.params["option"]["func_name"], "foo");
        assert_eq!(event.params["option"]["thread_name"], "main");
        assert_eq!(event.params["option"]["zxid"], "0x100000001");
        assert_eq!(event.func_name(), Some("foo"));

        let action = event.make_accept_action().unwrap();
        let rsp = translator.make_response(5, &action).unwrap();
        assert_eq!(rsp.result(), Some(inspector_msg_rsp::Res::Ack));
        assert_eq!(rsp.msg_id, Some(5));
    }

    #[test]
    fn test_missing_names_are_malformed() {
        let translator = EventTranslator::new(false);
        let entity = EntityId::new("zk1");
        let mut req = InspectorMsgReq::new_event("zk1", 1, inspector_msg_req::Event::for_call("foo"));
        req.event.as_mut().unwrap().func_call = None;

        assert!(matches!(
            translator.make_event(&entity, &req),
            Err(ProtocolError::MalformedMessage(_))
        ));

        req.event = None;
        assert!(matches!(
            translator.make_event(&entity, &req),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_request_type_is_checked() {
        let mut req = InspectorMsgReq::new_event("zk1", 1, inspector_msg_req::Event::for_exit());
        assert_eq!(request_type(&req).unwrap(), inspector_msg_req::Type::Event);
        assert_eq!(event_type(&req).unwrap(), event::Type::Exit);

        req.r#type = Some(9);
        assert!(matches!(
            request_type(&req),
            Err(ProtocolError::UnexpectedRequestType(9))
        ));
    }

    #[test]
    fn test_kill_is_unsupported() {
        let translator = EventTranslator::new(false);
        let kill = make_fault_injection_action(EntityId::new("zk1"));
        assert!(matches!(
            translator.make_response(1, &kill),
            Err(ProtocolError::UnsupportedAction(_))
        ));
    }
}
