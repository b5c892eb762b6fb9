//! Unit tests for kernel protocol message builders and predicates.

use serde_json::json;

use nbcollect::models::message::{
    msg_type, ExecutionState, InboundMessage, OutboundMessage, ReplyStatus, PROTOCOL_VERSION,
};

/// Every outbound request gets a fresh id and an empty parent header.
#[test]
fn outbound_requests_have_unique_ids() {
    let a = OutboundMessage::kernel_info_request("sess");
    let b = OutboundMessage::kernel_info_request("sess");

    assert_ne!(a.id(), b.id(), "probe ids must be unique");
    assert_eq!(a.msg_type(), msg_type::KERNEL_INFO_REQUEST);
    assert_eq!(a.header.session, "sess");
    assert_eq!(a.header.version, PROTOCOL_VERSION);
    assert!(a.parent_header.msg_id.is_none());
}

/// An execute request carries the code and the standard execution flags.
#[test]
fn execute_request_carries_code() {
    let request = OutboundMessage::execute_request("sess", "x = 1");

    assert_eq!(request.msg_type(), msg_type::EXECUTE_REQUEST);
    assert_eq!(request.code(), Some("x = 1"));
    assert_eq!(request.content["silent"], false);
    assert_eq!(request.content["store_history"], true);
    assert_eq!(request.channel, "shell");
}

/// The serialized form is a single JSON line with an empty `parent_header`.
#[test]
fn outbound_serializes_to_one_line() {
    let request = OutboundMessage::execute_request("sess", "a\nb");
    let line = serde_json::to_string(&request).expect("must serialize");

    assert!(!line.contains('\n'), "NDJSON line must not contain raw newlines");
    let value: serde_json::Value = serde_json::from_str(&line).expect("must be JSON");
    assert_eq!(value["parent_header"], json!({}));
    assert_eq!(value["header"]["msg_type"], "execute_request");
}

/// A message built as a child of a request correlates back to it.
#[test]
fn child_of_links_to_parent() {
    let request = OutboundMessage::execute_request("sess", "1");
    let other = OutboundMessage::execute_request("sess", "2");
    let reply = InboundMessage::child_of(&request, msg_type::EXECUTE_REPLY, json!({"status": "ok"}));

    assert_eq!(reply.parent_id(), Some(request.id()));
    assert!(reply.is_child_of(&request));
    assert!(!reply.is_child_of(&other));
    assert!(reply.has_type(msg_type::EXECUTE_REPLY));
    assert_eq!(reply.reply_status(), Some(ReplyStatus::Ok));
}

/// Inbound messages decode from the wire shape with optional sections missing.
#[test]
fn inbound_decodes_minimal_wire_shape() {
    let msg: InboundMessage = serde_json::from_value(json!({
        "header": { "msg_id": "m1", "msg_type": "status" },
        "parent_header": { "msg_id": "req-1", "msg_type": "execute_request" },
        "content": { "execution_state": "idle" },
        "channel": "iopub"
    }))
    .expect("must decode");

    assert_eq!(msg.parent_id(), Some("req-1"));
    assert_eq!(msg.execution_state(), Some(ExecutionState::Idle));
    assert_eq!(msg.channel.as_deref(), Some("iopub"));
    assert!(msg.metadata.is_null());
}

/// An empty parent id counts as unsolicited, like a missing one.
#[test]
fn empty_parent_id_is_unsolicited() {
    let msg: InboundMessage = serde_json::from_value(json!({
        "header": { "msg_type": "status" },
        "parent_header": { "msg_id": "" },
        "content": { "execution_state": "busy" }
    }))
    .expect("must decode");

    assert_eq!(msg.parent_id(), None);
    assert_eq!(msg.execution_state(), Some(ExecutionState::Busy));
}

/// Predicates return `None` when the field is absent.
#[test]
fn predicates_on_missing_fields() {
    let request = OutboundMessage::kernel_info_request("sess");
    let reply = InboundMessage::child_of(&request, msg_type::KERNEL_INFO_REPLY, json!({}));

    assert_eq!(reply.execution_state(), None);
    assert_eq!(reply.reply_status(), None);
}

/// Error and aborted statuses are told apart.
#[test]
fn reply_status_variants() {
    let request = OutboundMessage::execute_request("sess", "1/0");
    let error = InboundMessage::child_of(&request, msg_type::EXECUTE_REPLY, json!({"status": "error"}));
    let aborted =
        InboundMessage::child_of(&request, msg_type::EXECUTE_REPLY, json!({"status": "aborted"}));

    assert_eq!(error.reply_status(), Some(ReplyStatus::Error));
    assert_eq!(aborted.reply_status(), Some(ReplyStatus::Aborted));
}
