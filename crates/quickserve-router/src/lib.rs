//! # QuickServe Router
//!
//! First-match routing for QuickServe.
//!
//! - [`Router`] resolves an HTTP method and path to a handler
//! - [`ActionRouter`] resolves a socket action to a handler
//! - [`Params`] holds the values captured by `:name` and `*` segments
//!
//! Routers are generic over the handler type so they can be built and tested
//! without a running server.

#![doc(html_root_url = "https://docs.rs/quickserve-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod params;
mod pattern;
mod router;

pub use params::{Params, WILDCARD};
pub use pattern::Pattern;
pub use router::{ActionRouter, Group, RouteMatch, Router};
