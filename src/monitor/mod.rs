pub mod expiry;
pub mod l1;
pub mod l2;
