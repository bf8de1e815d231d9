//! # Observability & Tracing
//!
//! Every layer logs through `tracing` with structured fields:
//!
//! - **Registry**: `Registered pattern=... id=#n cached=...` at `info`, resolution at `debug`
//! - **Invoker**: start/finish at `debug`, failures and panics at `warn` with `pattern`
//! - **Cache**: `scope` and `key` on hits, misses, joins and timeouts
//! - **Transport**: `addr` and `peer` on connect, accept and dropped connections
//!
//! ```bash
//! # Registrations, connections, warnings
//! RUST_LOG=info cargo run -p dispatch-sample
//!
//! # Every act, cache decision and frame
//! RUST_LOG=debug cargo run -p dispatch-sample
//!
//! # Only the cache
//! RUST_LOG=action_dispatch::cache=debug cargo run -p dispatch-sample
//! ```
//!
//! With `RUST_LOG=debug` a cached call looks like:
//!
//! ```text
//! DEBUG Act message=generate:id,name:steve
//! DEBUG Resolved pattern=generate:id message=generate:id,name:steve
//! DEBUG Cache miss scope=generate:id key=name:steve
//! DEBUG Invoke pattern=generate:id message=generate:id,name:steve
//! DEBUG Action ok pattern=generate:id
//! ```

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
