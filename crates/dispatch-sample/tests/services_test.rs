use action_dispatch::mock::MockTransport;
use action_dispatch::{handler_fn, ActionTransport, DispatchError, Dispatcher};
use dispatch_sample::clients::UsersClient;
use dispatch_sample::lifecycle::USERS_PROXY;
use dispatch_sample::services::{ColorPlugin, UsersService};
use serde_json::json;
use std::sync::Arc;

/// A real front dispatcher whose users proxy points at a mock instead of a
/// listener. Exercises the proxy wiring in isolation from the network.
#[tokio::test]
async fn test_proxy_forwards_to_transport() {
    let users_mock = MockTransport::new();
    users_mock
        .expect_act("role:users,cmd:get,id:1")
        .return_ok(json!({"id": 1, "name": "Alice", "email": "alice@example.com"}));
    users_mock
        .expect_act("role:users,cmd:get,id:9")
        .return_err(DispatchError::not_found("user 9"));

    let front = Dispatcher::new();
    front.use_plugin(&ColorPlugin::new("red")).unwrap();
    let proxy = users_mock.clone();
    front
        .add(
            USERS_PROXY,
            handler_fn(move |msg, _ctx| {
                let proxy = proxy.clone();
                async move { proxy.act(msg).await }
            }),
        )
        .unwrap();

    let client = UsersClient::new(Arc::new(front.clone()));
    assert_eq!(client.get_user(1).await.unwrap().name, "Alice");
    assert_eq!(
        client.get_user(9).await.unwrap_err(),
        DispatchError::NotFound("user 9".into())
    );

    // Local actions never reach the proxy.
    assert_eq!(front.act("foo:bar").await.unwrap()["color"], "red");
    assert_eq!(users_mock.received().len(), 2);
    users_mock.verify();
}

/// The users service answers identically in-process and through the client.
#[tokio::test]
async fn test_users_service_locally() {
    let dispatcher = Dispatcher::new();
    dispatcher.use_plugin(&UsersService::default()).unwrap();
    let client = UsersClient::new(Arc::new(dispatcher));

    let users = client.list_users().await.unwrap();
    assert_eq!(users.len(), 3);
    for user in users {
        assert_eq!(client.get_user(user.id).await.unwrap(), user);
    }
}
