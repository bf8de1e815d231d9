//! Data carried by the sample services.

pub mod user;

pub use user::*;
