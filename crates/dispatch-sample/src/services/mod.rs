//! # Sample Services
//!
//! Each service is a [`Plugin`](action_dispatch::Plugin): a configured value that
//! registers its actions on whichever dispatcher loads it.
//!
//! | Plugin | Pattern | Reply |
//! |--------|---------|-------|
//! | [`UsersService`] | `role:users,cmd:get` | the record with `id`, or `NotFound` |
//! | [`UsersService`] | `role:users,cmd:list` | every record |
//! | [`IdGenerator`] | `generate:id` | `{ "id": n }` with `n` counting up from 1 |
//! | [`ColorPlugin`] | `foo:bar` | `{ "color": <configured color> }` |

pub mod color;
pub mod ids;
pub mod users;

pub use color::ColorPlugin;
pub use ids::IdGenerator;
pub use users::UsersService;
