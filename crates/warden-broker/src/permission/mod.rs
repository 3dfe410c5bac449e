//! Permission broker between tool executors and the user.
//!
//! Parks "ask" decisions until a UI answers them and propagates "always"
//! answers across the session.

mod bus;
mod manager;
mod pending;
mod types;

pub use bus::{
    BroadcastBus, EVENT_BROADCAST_CAPACITY, EventBus, NullBus, PermissionEvent, RequestedEvent,
    RespondedEvent,
};
pub use manager::PermissionManager;
pub use pending::PendingRequest;
pub use types::{PermissionError, PermissionResponse};
