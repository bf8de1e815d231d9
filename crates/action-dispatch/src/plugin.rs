//! # Plugins
//!
//! A plugin is a named bundle of actions, configured at construction and loaded
//! into a dispatcher with [`Dispatcher::use_plugin`].
//!
//! ```rust
//! use action_dispatch::{handler_fn, DispatchError, Dispatcher, Plugin};
//! use serde_json::json;
//!
//! struct Color {
//!     color: String,
//! }
//!
//! impl Plugin for Color {
//!     fn name(&self) -> &str {
//!         "color"
//!     }
//!
//!     fn register(&self, dispatcher: &Dispatcher) -> Result<(), DispatchError> {
//!         let color = self.color.clone();
//!         dispatcher.add(
//!             "foo:bar",
//!             handler_fn(move |_msg, _ctx| {
//!                 let color = color.clone();
//!                 async move { Ok(json!({ "color": color })) }
//!             }),
//!         )?;
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let dispatcher = Dispatcher::new();
//! dispatcher.use_plugin(&Color { color: "red".into() }).unwrap();
//! assert_eq!(dispatcher.act("foo:bar").await.unwrap(), json!({"color": "red"}));
//! # }
//! ```

use crate::dispatcher::Dispatcher;
use crate::error::Result;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Adds the plugin's actions. An error aborts the load.
    fn register(&self, dispatcher: &Dispatcher) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::handler::handler_fn;
    use serde_json::json;

    struct Twice;

    impl Plugin for Twice {
        fn name(&self) -> &str {
            "twice"
        }

        fn register(&self, dispatcher: &Dispatcher) -> Result<()> {
            dispatcher.add("a:1", handler_fn(|_m, _c| async { Ok(json!(1)) }))?;
            dispatcher.add("a:1", handler_fn(|_m, _c| async { Ok(json!(2)) }))?;
            Ok(())
        }
    }

    #[test]
    fn test_registration_error_aborts_load() {
        let dispatcher = Dispatcher::new();
        let err = dispatcher.use_plugin(&Twice).unwrap_err();
        assert_eq!(err, DispatchError::DuplicatePattern("a:1".into()));
    }
}
