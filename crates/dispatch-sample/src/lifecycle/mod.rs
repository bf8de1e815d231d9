//! # System Lifecycle & Orchestration
//!
//! Individual services are simple; **wiring them together** is where the
//! complexity lives. [`ServiceSystem`] is the conductor for the sample:
//!
//! ```text
//!                       ┌──────────── front dispatcher ────────────┐
//!  Gateway ────────────▶│ foo:bar (ColorPlugin)                    │
//!                       │ generate:id (IdGenerator)                │
//!                       │ role:users ──proxy──▶ RemoteClient ══════╪══▶ ActionListener
//!                       └──────────────────────────────────────────┘        │
//!                                                                   users dispatcher
//!                                                                   role:users,cmd:get|list
//! ```
//!
//! **Key Responsibilities:**
//! 1. **Service Creation** - Build a dispatcher per process role and load plugins into it
//! 2. **Wiring** - Point the front dispatcher's `role:users` proxy at the remote client
//! 3. **Lifecycle Management** - Bind the listener and start cache sweepers
//! 4. **Graceful Shutdown** - Stop the listener, close the client, end the sweepers
//!
//! Both dispatchers are explicit values owned by the system; nothing is global.
//! Tests build as many systems side by side as they like.

pub mod service_system;

pub use service_system::*;
