//! Kernel protocol messages.
//!
//! Messages follow the Jupyter shape: a `header` carrying the message id and
//! type, a `parent_header` naming the request that caused the message, free-form
//! `metadata`, and a type-specific `content` payload. Outbound messages are
//! built here; inbound messages are decoded by the transport and only ever
//! inspected through the predicates below.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Protocol version stamped on outbound headers.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Message type tags used by the orchestrator.
pub mod msg_type {
    /// Readiness probe request.
    pub const KERNEL_INFO_REQUEST: &str = "kernel_info_request";
    /// Reply to a readiness probe.
    pub const KERNEL_INFO_REPLY: &str = "kernel_info_reply";
    /// Code execution request.
    pub const EXECUTE_REQUEST: &str = "execute_request";
    /// Reply to a code execution request.
    pub const EXECUTE_REPLY: &str = "execute_reply";
    /// Kernel execution-state broadcast.
    pub const STATUS: &str = "status";
}

/// Header identifying a single message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    /// Unique message identifier.
    #[serde(default)]
    pub msg_id: String,
    /// Message type tag.
    pub msg_type: String,
    /// Client session the message belongs to.
    #[serde(default)]
    pub session: String,
    /// User name of the sender.
    #[serde(default)]
    pub username: String,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub date: String,
    /// Protocol version.
    #[serde(default)]
    pub version: String,
}

/// Parent header echoed by inbound messages.
///
/// Kernels send `{}` for unsolicited broadcasts, so every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParentHeader {
    /// Identifier of the originating request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    /// Type of the originating request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,
}

/// A request sent to the kernel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    /// Message header.
    pub header: Header,
    /// Always empty for requests.
    pub parent_header: ParentHeader,
    /// Request metadata.
    pub metadata: Value,
    /// Type-specific payload.
    pub content: Value,
    /// Logical channel the request travels on.
    pub channel: String,
}

impl OutboundMessage {
    /// Build a shell-channel request with a fresh identifier.
    #[must_use]
    pub fn new(msg_type: &str, session: &str, content: Value) -> Self {
        Self {
            header: Header {
                msg_id: Uuid::new_v4().to_string(),
                msg_type: msg_type.to_owned(),
                session: session.to_owned(),
                username: "nbcollect".to_owned(),
                date: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                version: PROTOCOL_VERSION.to_owned(),
            },
            parent_header: ParentHeader::default(),
            metadata: json!({}),
            content,
            channel: "shell".to_owned(),
        }
    }

    /// Build a `kernel_info_request` readiness probe.
    #[must_use]
    pub fn kernel_info_request(session: &str) -> Self {
        Self::new(msg_type::KERNEL_INFO_REQUEST, session, json!({}))
    }

    /// Build an `execute_request` for `code`.
    #[must_use]
    pub fn execute_request(session: &str, code: &str) -> Self {
        Self::new(
            msg_type::EXECUTE_REQUEST,
            session,
            json!({
                "code": code,
                "silent": false,
                "store_history": true,
                "user_expressions": {},
                "allow_stdin": false,
                "stop_on_error": false,
            }),
        )
    }

    /// Unique identifier; echoed as the parent id by every reply.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.header.msg_id
    }

    /// Message type tag.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// Source code carried by an execute request.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.content.get("code").and_then(Value::as_str)
    }
}

/// Kernel execution state carried by `status` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Kernel is processing a request.
    Busy,
    /// Kernel is ready for new work.
    Idle,
    /// Kernel is still booting.
    Starting,
    /// Any state this crate does not act on.
    Other,
}

impl ExecutionState {
    fn from_wire(raw: &str) -> Self {
        match raw {
            "busy" => Self::Busy,
            "idle" => Self::Idle,
            "starting" => Self::Starting,
            _ => Self::Other,
        }
    }
}

/// Status carried by `*_reply` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Request succeeded.
    Ok,
    /// Request raised an error.
    Error,
    /// Request was aborted, usually after an earlier error.
    Aborted,
    /// Any status this crate does not act on.
    Other,
}

impl ReplyStatus {
    fn from_wire(raw: &str) -> Self {
        match raw {
            "ok" => Self::Ok,
            "error" => Self::Error,
            "aborted" => Self::Aborted,
            _ => Self::Other,
        }
    }
}

/// A reply or broadcast received from the kernel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundMessage {
    /// Message header.
    pub header: Header,
    /// Header of the request that caused this message, if any.
    #[serde(default)]
    pub parent_header: ParentHeader,
    /// Message metadata.
    #[serde(default)]
    pub metadata: Value,
    /// Type-specific payload.
    #[serde(default)]
    pub content: Value,
    /// Channel the message arrived on, when the transport reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl InboundMessage {
    /// Build a message caused by `parent`.
    ///
    /// Used by in-process kernels and by transports that synthesize replies.
    #[must_use]
    pub fn child_of(parent: &OutboundMessage, msg_type: &str, content: Value) -> Self {
        Self {
            header: Header {
                msg_id: Uuid::new_v4().to_string(),
                msg_type: msg_type.to_owned(),
                session: parent.header.session.clone(),
                username: "kernel".to_owned(),
                date: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                version: PROTOCOL_VERSION.to_owned(),
            },
            parent_header: ParentHeader {
                msg_id: Some(parent.id().to_owned()),
                msg_type: Some(parent.msg_type().to_owned()),
            },
            metadata: json!({}),
            content,
            channel: None,
        }
    }

    /// Message type tag.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// Identifier of the originating request; `None` for unsolicited messages.
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_header
            .msg_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Whether this message has type `msg_type`.
    #[must_use]
    pub fn has_type(&self, msg_type: &str) -> bool {
        self.header.msg_type == msg_type
    }

    /// Whether this message was caused by `request`.
    #[must_use]
    pub fn is_child_of(&self, request: &OutboundMessage) -> bool {
        self.parent_id() == Some(request.id())
    }

    /// `execution_state` of a `status` message.
    #[must_use]
    pub fn execution_state(&self) -> Option<ExecutionState> {
        self.content
            .get("execution_state")
            .and_then(Value::as_str)
            .map(ExecutionState::from_wire)
    }

    /// `status` of a reply message.
    #[must_use]
    pub fn reply_status(&self) -> Option<ReplyStatus> {
        self.content
            .get("status")
            .and_then(Value::as_str)
            .map(ReplyStatus::from_wire)
    }
}
