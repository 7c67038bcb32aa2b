//! `taskroute-core`: request materialization primitives.
//!
//! This crate is **pure**: parameter schemas, call arguments, the
//! materializer that turns them into HTTP requests, resource names and the
//! inbound redelivery guard. No network, no clock, no async runtime.

pub mod args;
pub mod canonical;
pub mod converter;
pub mod delivery;
pub mod error;
pub mod id;
pub mod materialize;
pub mod method;
pub mod request;
pub mod schema;
pub mod template;

pub use args::CallArgs;
pub use converter::PathConverter;
pub use delivery::{DeliveryMetadata, GuardDecision, RedeliveryGuard, should_stop};
pub use error::{MaterializeError, MaterializeResult, ResourceNameError, SchemaError};
pub use id::{LocationPath, QueuePath, location_path, queue_path};
pub use materialize::{RequestMaterializer, materialize};
pub use method::HttpMethod;
pub use request::MaterializedRequest;
pub use schema::{BodyParam, BodyType, Param, ParamKind, ParameterSchema, SchemaBuilder};
pub use template::PathTemplate;
