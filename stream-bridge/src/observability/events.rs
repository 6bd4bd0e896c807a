//! Canonical structured event names used across `stream-bridge`.

// Producer side of a read stream.
pub const READ_SOURCE_START: &str = "read_source_start";
pub const READ_SOURCE_PAUSED: &str = "read_source_paused";
pub const READ_SOURCE_RESUMED: &str = "read_source_resumed";
pub const READ_SOURCE_END: &str = "read_source_end";
pub const READ_SOURCE_FAILED: &str = "read_source_failed";
pub const READ_SOURCE_CONTROL_REGISTER_FAILED: &str = "read_source_control_register_failed";
pub const READ_SOURCE_DISCARD: &str = "read_source_discard";

// Consumer side of a read stream.
pub const READ_HANDSHAKE_START: &str = "read_handshake_start";
pub const READ_HANDSHAKE_OK: &str = "read_handshake_ok";
pub const READ_HANDSHAKE_FAILED: &str = "read_handshake_failed";
pub const READ_ACK_SENT: &str = "read_ack_sent";
pub const READ_REMOTE_END: &str = "read_remote_end";
pub const READ_REMOTE_EXCEPTION: &str = "read_remote_exception";

// Caller side of a write stream.
pub const WRITE_HANDSHAKE_START: &str = "write_handshake_start";
pub const WRITE_HANDSHAKE_OK: &str = "write_handshake_ok";
pub const WRITE_HANDSHAKE_FAILED: &str = "write_handshake_failed";
pub const WRITE_DRAINED: &str = "write_drained";
pub const WRITE_REMOTE_EXCEPTION: &str = "write_remote_exception";
pub const WRITE_END: &str = "write_end";

// Sink-owner side of a write stream.
pub const SINK_REGISTER_OK: &str = "sink_register_ok";
pub const SINK_REGISTER_FAILED: &str = "sink_register_failed";
pub const SINK_PAUSED: &str = "sink_paused";
pub const SINK_RESUMED: &str = "sink_resumed";
pub const SINK_END: &str = "sink_end";
pub const SINK_FAILED: &str = "sink_failed";

// Shared across bridges.
pub const BUS_SEND_FAILED: &str = "bus_send_failed";
pub const CONTROL_MESSAGE_UNEXPECTED: &str = "control_message_unexpected";

// Service dispatch.
pub const SERVICE_REGISTER_OK: &str = "service_register_ok";
pub const SERVICE_REGISTER_FAILED: &str = "service_register_failed";
pub const SERVICE_DISPATCH: &str = "service_dispatch";
pub const SERVICE_UNKNOWN_METHOD: &str = "service_unknown_method";
pub const SERVICE_MISSING_HEADER: &str = "service_missing_header";
pub const SERVICE_REPLY_FAILED: &str = "service_reply_failed";
pub const SERVICE_UNREGISTER: &str = "service_unregister";
