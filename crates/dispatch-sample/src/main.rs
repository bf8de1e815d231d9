//! # Dispatch Sample
//!
//! Starts the sample [`ServiceSystem`] and walks a few requests through its
//! gateway: a local plugin action, a cached id, a user fetched over TCP, a
//! missing user and a composed view.
//!
//! ```bash
//! RUST_LOG=info cargo run -p dispatch-sample -- config/sample.toml
//! DISPATCH_PORT=3100 RUST_LOG=debug cargo run -p dispatch-sample
//! ```

use action_dispatch::tracing::setup_tracing;
use action_dispatch::RequestMeta;
use dispatch_sample::config::SampleConfig;
use dispatch_sample::error::SampleError;
use dispatch_sample::lifecycle::ServiceSystem;
use serde_json::json;
use std::path::Path;
use tracing::{info, Instrument};

fn request(method: &str, path: &str, params: &[(&str, &str)]) -> RequestMeta {
    RequestMeta {
        method: method.to_string(),
        path: path.to_string(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), SampleError> {
    setup_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => SampleConfig::load(Path::new(&path))?,
        None => {
            let mut config = SampleConfig::default();
            config.apply_env()?;
            config
        }
    };

    info!(listener = %config.listener.address(), "Starting sample system");
    let system = ServiceSystem::start(config).await?;
    let gateway = &system.gateway;

    let reply = gateway.act("foo:bar", &request("GET", "/color", &[])).await;
    info!(status = reply.status, body = %reply.body, "GET /color");

    let reply = gateway.act("generate:id", &request("POST", "/a/id", &[])).await;
    info!(status = reply.status, body = %reply.body, "POST /a/id");

    let span = tracing::info_span!("remote_users");
    async {
        for id in ["2", "5"] {
            let reply = gateway
                .act(
                    "role:users,cmd:get,id:{params.id}",
                    &request("GET", &format!("/users/{id}"), &[("id", id)]),
                )
                .await;
            info!(status = reply.status, body = %reply.body, "GET /users/{}", id);
        }
    }
    .instrument(span)
    .await;

    let reply = gateway
        .view(json!({
            "title": "Team",
            "$resolve": {
                "team.lead": "role:users,cmd:get,id:1",
                "team.color": "foo:bar",
            }
        }))
        .await;
    info!(status = reply.status, body = %reply.body, "GET /team");

    system.shutdown().await?;

    info!("Application completed successfully");
    Ok(())
}
