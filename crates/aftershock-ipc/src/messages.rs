//! Inspector wire messages
//!
//! Hand-written prost definitions equivalent to:
//!
//! ```text
//! message InspectorMsgReq {
//!   enum Type { EVENT = 1; }
//!   message Event {
//!     enum Type { FUNC_CALL = 1; FUNC_RETURN = 2; EXIT = 3; }
//!     message FuncCall { required string name = 1; }
//!     message FuncReturn { required string name = 1; }
//!     required Type type = 1;
//!     optional FuncCall func_call = 2;
//!     optional FuncReturn func_return = 3;
//!   }
//!   message JavaSpecificFields {
//!     message StackTraceElement { line_number = 1; class_name = 2; method_name = 3; file_name = 4; }
//!     message Param { name = 1; value = 2; }
//!     required string thread_name = 1;
//!     required int32 nr_stack_trace_elements = 2;
//!     repeated StackTraceElement stack_trace_elements = 3;
//!     required int32 nr_params = 4;
//!     repeated Param params = 5;
//!   }
//!   required Type type = 1;
//!   required string process_id = 2;
//!   required int32 msg_id = 3;
//!   optional Event event = 4;
//!   required int32 has_java_specific_fields = 5;
//!   optional JavaSpecificFields java_specific_fields = 6;
//! }
//!
//! message InspectorMsgRsp {
//!   enum Result { ACK = 0; END = 1; ERROR = 2; }
//!   required Result res = 1;
//!   required int32 msg_id = 2;
//!   optional string error_message = 3;
//! }
//! ```

/// Request sent by an inspector for every intercepted occurrence
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InspectorMsgReq {
    #[prost(enumeration = "inspector_msg_req::Type", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub process_id: Option<String>,
    #[prost(int32, optional, tag = "3")]
    pub msg_id: Option<i32>,
    #[prost(message, optional, tag = "4")]
    pub event: Option<inspector_msg_req::Event>,
    #[prost(int32, optional, tag = "5")]
    pub has_java_specific_fields: Option<i32>,
    #[prost(message, optional, tag = "6")]
    pub java_specific_fields: Option<inspector_msg_req::JavaSpecificFields>,
}

pub mod inspector_msg_req {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Event = 1,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Event {
        #[prost(enumeration = "event::Type", optional, tag = "1")]
        pub r#type: Option<i32>,
        #[prost(message, optional, tag = "2")]
        pub func_call: Option<event::FuncCall>,
        #[prost(message, optional, tag = "3")]
        pub func_return: Option<event::FuncReturn>,
    }

    pub mod event {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum Type {
            FuncCall = 1,
            FuncReturn = 2,
            Exit = 3,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct FuncCall {
            #[prost(string, optional, tag = "1")]
            pub name: Option<String>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct FuncReturn {
            #[prost(string, optional, tag = "1")]
            pub name: Option<String>,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct JavaSpecificFields {
        #[prost(string, optional, tag = "1")]
        pub thread_name: Option<String>,
        #[prost(int32, optional, tag = "2")]
        pub nr_stack_trace_elements: Option<i32>,
        #[prost(message, repeated, tag = "3")]
        pub stack_trace_elements: Vec<java_specific_fields::StackTraceElement>,
        #[prost(int32, optional, tag = "4")]
        pub nr_params: Option<i32>,
        #[prost(message, repeated, tag = "5")]
        pub params: Vec<java_specific_fields::Param>,
    }

    pub mod java_specific_fields {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct StackTraceElement {
            #[prost(int32, optional, tag = "1")]
            pub line_number: Option<i32>,
            #[prost(string, optional, tag = "2")]
            pub class_name: Option<String>,
            #[prost(string, optional, tag = "3")]
            pub method_name: Option<String>,
            #[prost(string, optional, tag = "4")]
            pub file_name: Option<String>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Param {
            #[prost(string, optional, tag = "1")]
            pub name: Option<String>,
            #[prost(string, optional, tag = "2")]
            pub value: Option<String>,
        }
    }
}

/// Response carrying the orchestrator's decision
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InspectorMsgRsp {
    #[prost(enumeration = "inspector_msg_rsp::Res", optional, tag = "1")]
    pub res: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub msg_id: Option<i32>,
    #[prost(string, optional, tag = "3")]
    pub error_message: Option<String>,
}

pub mod inspector_msg_rsp {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Res {
        Ack = 0,
        End = 1,
        Error = 2,
    }
}

impl InspectorMsgReq {
    /// An EVENT request from `process_id`
    pub fn new_event(process_id: &str, msg_id: i32, event: inspector_msg_req::Event) -> Self {
        Self {
            r#type: Some(inspector_msg_req::Type::Event as i32),
            process_id: Some(process_id.to_string()),
            msg_id: Some(msg_id),
            event: Some(event),
            has_java_specific_fields: Some(0),
            java_specific_fields: None,
        }
    }

    pub fn with_java_fields(mut self, fields: inspector_msg_req::JavaSpecificFields) -> Self {
        self.has_java_specific_fields = Some(1);
        self.java_specific_fields = Some(fields);
        self
    }
}

impl inspector_msg_req::Event {
    pub fn for_call(name: &str) -> Self {
        Self {
            r#type: Some(inspector_msg_req::event::Type::FuncCall as i32),
            func_call: Some(inspector_msg_req::event::FuncCall {
                name: Some(name.to_string()),
            }),
            func_return: None,
        }
    }

    pub fn for_return(name: &str) -> Self {
        Self {
            r#type: Some(inspector_msg_req::event::Type::FuncReturn as i32),
            func_call: None,
            func_return: Some(inspector_msg_req::event::FuncReturn {
                name: Some(name.to_string()),
            }),
        }
    }

    pub fn for_exit() -> Self {
        Self {
            r#type: Some(inspector_msg_req::event::Type::Exit as i32),
            func_call: None,
            func_return: None,
        }
    }
}

impl InspectorMsgRsp {
    pub fn ack(msg_id: i32) -> Self {
        Self::with_result(inspector_msg_rsp::Res::Ack, msg_id)
    }

    pub fn end(msg_id: i32) -> Self {
        Self::with_result(inspector_msg_rsp::Res::End, msg_id)
    }

    pub fn error(msg_id: i32, message: impl Into<String>) -> Self {
        let mut rsp = Self::with_result(inspector_msg_rsp::Res::Error, msg_id);
        rsp.error_message = Some(message.into());
        rsp
    }

    fn with_result(res: inspector_msg_rsp::Res, msg_id: i32) -> Self {
        Self {
            res: Some(res as i32),
            msg_id: Some(msg_id),
            error_message: None,
        }
    }

    /// Decoded result, or None when absent or unknown
    pub fn result(&self) -> Option<inspector_msg_rsp::Res> {
        self.res
            .and_then(|raw| inspector_msg_rsp::Res::try_from(raw).ok())
    }

    pub fn is_end(&self) -> bool {
        self.result() == Some(inspector_msg_rsp::Res::End)
    }

    pub fn is_error(&self) -> bool {
        self.result() == Some(inspector_msg_rsp::Res::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_request_wire_format() {
        let req = InspectorMsgReq::new_event("zk1", 7, inspector_msg_req::Event::for_call("foo"));
        let bytes = req.encode_to_vec();
        // field 1 (varint) = EVENT
        assert_eq!(&bytes[..2], &[0x08, 0x01]);

        let decoded = InspectorMsgReq::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, req);
        let event = decoded.event.unwrap();
        assert_eq!(
            event.func_call.and_then(|c| c.name).as_deref(),
            Some("foo")
        );
    }

    #[test]
    fn test_response_results() {
        assert_eq!(InspectorMsgRsp::ack(3).result(), Some(inspector_msg_rsp::Res::Ack));
        assert!(InspectorMsgRsp::end(3).is_end());

        let err = InspectorMsgRsp::error(4, "boom");
        assert_eq!(err.result(), Some(inspector_msg_rsp::Res::Error));
        assert_eq!(err.error_message.as_deref(), Some("boom"));

        let unknown = InspectorMsgRsp {
            res: Some(42),
            msg_id: Some(1),
            error_message: None,
        };
        assert_eq!(unknown.result(), None);
    }
}
