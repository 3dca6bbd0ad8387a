//! Middleware chain and timeout arbitration for QuickServe.
//!
//! Every request, HTTP or socket, runs through the same machinery:
//!
//! 1. The [`Pipeline`] spawns the request's work on its own task.
//! 2. The [`MiddlewareChain`] runs each [`Stage`] in registration order,
//!    skipping the rest once the response is written or the deadline passes.
//! 3. The resolved handler runs, or a 404 is written when there is none.
//! 4. The [`TimeoutArbiter`] races all of it against the request deadline
//!    and guarantees a single response.
//!
//! # Example
//!
//! ```ignore
//! use quickserve_middleware::{MiddlewareChain, Pipeline};
//! use quickserve_middleware::stages::{CorsStage, LoggingStage};
//!
//! let pipeline = Pipeline::new(
//!     MiddlewareChain::builder()
//!         .stage(CorsStage::default())
//!         .stage(LoggingStage)
//!         .build(),
//! );
//! let outcome = pipeline.execute(ctx, Some(handler)).await;
//! ```

#![doc(html_root_url = "https://docs.rs/quickserve-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod timeout;

pub use chain::{Flow, MiddlewareChain, MiddlewareChainBuilder};
pub use pipeline::{Pipeline, NOT_FOUND_MESSAGE};
pub use stage::{stage_fn, BoxedStage, FnStage, Stage};
pub use timeout::{Outcome, TimeoutArbiter, TIMEOUT_MESSAGE, UNANSWERED_MESSAGE};
