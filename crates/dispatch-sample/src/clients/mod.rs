//! Typed wrappers over an [`ActionTransport`](action_dispatch::ActionTransport).

pub mod users_client;

pub use users_client::UsersClient;
