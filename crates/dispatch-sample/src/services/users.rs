use crate::model::{seed_users, User};
use action_dispatch::{handler_fn, DispatchError, Dispatcher, Plugin};
use std::sync::Arc;
use tracing::debug;

pub const GET_USER: &str = "role:users,cmd:get";
pub const LIST_USERS: &str = "role:users,cmd:list";

/// Read-only users service over a fixed record list.
#[derive(Clone)]
pub struct UsersService {
    users: Arc<Vec<User>>,
}

impl Default for UsersService {
    fn default() -> Self {
        Self::new(seed_users())
    }
}

impl UsersService {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: Arc::new(users),
        }
    }

    pub fn find(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| i64::from(u.id) == id)
    }
}

impl Plugin for UsersService {
    fn name(&self) -> &str {
        "users"
    }

    fn register(&self, dispatcher: &Dispatcher) -> Result<(), DispatchError> {
        let service = self.clone();
        dispatcher.add(
            GET_USER,
            handler_fn(move |msg, _ctx| {
                let service = service.clone();
                async move {
                    let id = msg.get_i64("id").ok_or_else(|| {
                        DispatchError::InvalidPattern(format!("{GET_USER} needs an integer id"))
                    })?;
                    debug!(id, "Get user");
                    let user = service
                        .find(id)
                        .ok_or_else(|| DispatchError::not_found(format!("user {id}")))?;
                    Ok(serde_json::to_value(user)?)
                }
            }),
        )?;

        let service = self.clone();
        dispatcher.add(
            LIST_USERS,
            handler_fn(move |_msg, _ctx| {
                let service = service.clone();
                async move { Ok(serde_json::to_value(&*service.users)?) }
            }),
        )?;
        Ok(())
    }
}
