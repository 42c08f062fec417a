//! # Trellis Lambda
//!
//! AWS Lambda driver for the Trellis dispatch pipeline.
//!
//! [`LambdaDriver`] accepts API Gateway proxy events (REST payload 1.0 and
//! HTTP API payload 2.0), dispatches them and returns a proxy response.
//! Binary response bodies are base64-encoded. The driver is runtime-agnostic:
//! any host that can hand it the event JSON and an invocation context can
//! run it.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod driver;
mod error;
mod events;

pub use driver::LambdaDriver;
pub use error::{LambdaError, LambdaResult};
pub use events::{
    ApiGatewayEvent, ApiGatewayResponse, HttpApiDescription, HttpApiEvent, HttpApiRequestContext, LambdaContext,
    RestApiEvent,
};
