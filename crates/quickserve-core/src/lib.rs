//! # QuickServe Core
//!
//! Core types and collaborator traits for the QuickServe API framework.
//!
//! - [`Context`] - Per-request capability set shared by middleware and handlers
//! - [`Session`] - Identity and claims attached after authentication
//! - [`Deadline`] - Request deadline threaded through the context
//! - [`QuickError`] - Standard error taxonomy
//! - [`Handler`] - Type-erased route handler
//! - [`Database`] / [`Entity`] / [`Serializer`] - External collaborators

#![doc(html_root_url = "https://docs.rs/quickserve-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
pub mod database;
mod deadline;
pub mod entity;
mod error;
mod format;
mod handler;
mod responder;
mod session;

pub use context::{Context, ContextBuilder, Params, RequestId, RequestInfo, RequestMeta, Transport};
pub use database::{id_query, Database, DatabaseRegistry, InMemoryDatabase, Record, SharedDatabase};
pub use deadline::Deadline;
pub use entity::{Entity, EntityConfig, EntityRegistry, FieldSpec, FieldType, ValidationReport};
pub use error::{ErrorCategory, ErrorEnvelope, QuickError, QuickResult, UPSTREAM_MESSAGE};
pub use format::{BuiltinSerializer, ResponseFormat, Serializer};
pub use handler::{handler, BoxFuture, Handler};
pub use responder::{ChannelResponder, OneshotResponder, Reply, Responder};
pub use session::Session;
