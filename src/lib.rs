// Public API for integration tests and embedding UI layers

pub mod controller;
pub mod error;
pub mod relay;
pub mod remote;
pub mod roles;
pub mod store;
pub mod sync;
pub mod types;
