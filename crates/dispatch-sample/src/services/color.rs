use action_dispatch::{handler_fn, DispatchError, Dispatcher, Plugin};
use serde_json::json;

pub const FOO_BAR: &str = "foo:bar";

/// Replies to `foo:bar` with the color it was configured with.
#[derive(Debug, Clone)]
pub struct ColorPlugin {
    color: String,
}

impl ColorPlugin {
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
        }
    }
}

impl Plugin for ColorPlugin {
    fn name(&self) -> &str {
        "color"
    }

    fn register(&self, dispatcher: &Dispatcher) -> Result<(), DispatchError> {
        let color = self.color.clone();
        dispatcher.add(
            FOO_BAR,
            handler_fn(move |_msg, _ctx| {
                let reply = json!({ "color": color });
                async move { Ok(reply) }
            }),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_with_configured_color() {
        let dispatcher = Dispatcher::new();
        dispatcher.use_plugin(&ColorPlugin::new("red")).unwrap();
        assert_eq!(dispatcher.act(FOO_BAR).await.unwrap(), json!({"color": "red"}));

        let err = dispatcher.use_plugin(&ColorPlugin::new("blue")).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicatePattern(_)));
    }
}
