//! End-to-end signing cycles over the in-memory broker.

pub mod authority;
pub mod faults;
pub mod flows;
