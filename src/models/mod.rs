pub mod blocks;
pub mod deposits;
pub mod rpc;
