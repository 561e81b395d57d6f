pub mod events;
pub mod frozen;
pub mod general;
pub mod metrics;
pub mod rpc;
