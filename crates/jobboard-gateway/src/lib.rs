pub mod connection;
pub mod gate;
pub mod registry;
pub mod server;

pub use gate::{GateError, Identity, SessionGate};
pub use registry::{ConnectionId, GroupKey, GroupRegistry};
pub use server::{GatewayState, router};
