//! Warden Broker Library
//!
//! Runtime side of the permission system:
//! - Pending permission requests with exactly-once resolution
//! - Session-scoped "always" approvals with cascading release
//! - Event publishing for prompt UIs

pub mod permission;
