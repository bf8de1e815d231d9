//! # Users Client
//!
//! Provides a typed API over the `role:users` actions. It wraps any
//! [`ActionTransport`], so the same client works against a local dispatcher, a
//! remote listener or a mock.

use crate::model::User;
use crate::services::users::{GET_USER, LIST_USERS};
use action_dispatch::{ActionTransport, DispatchError, Message};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct UsersClient {
    transport: Arc<dyn ActionTransport>,
}

impl UsersClient {
    pub fn new(transport: Arc<dyn ActionTransport>) -> Self {
        Self { transport }
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: u32) -> Result<User, DispatchError> {
        debug!("Sending request");
        let message = Message::parse(GET_USER)?.with("id", id);
        decode(self.transport.act(message).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<User>, DispatchError> {
        debug!("Sending request");
        decode(self.transport.act(Message::parse(LIST_USERS)?).await?)
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, DispatchError> {
    Ok(serde_json::from_value(value)?)
}
