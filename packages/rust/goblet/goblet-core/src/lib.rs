#![allow(clippy::type_complexity)]

//! Core functionality for the goblet crate.
//!
//! **Note**: This is an implementation crate for [goblet](https://crates.io/crates/goblet)
//! and is not meant to be used directly. Please use the main crate instead.
//!
//! The functionality in this crate is re-exported by the main crate, and using it directly
//! may lead to version conflicts or other issues. Additionally, this crate's API is not
//! guaranteed to be stable between minor versions.
//!
//! # Usage
//!
//! Instead of using this crate directly, use the main crate:
//!
//! ```toml
//! [dependencies]
//! goblet = "0.3"
//! ```

pub use ctor;
pub use http;
pub use tokio;

mod app;
pub mod constants;
mod config;
mod context;
mod error;
mod event;
pub mod logging;
mod registry;
mod request;
mod response;
mod router;
mod server;

pub use app::{AfterHook, BeforeHook, Goblet, GobletBuilder, ScheduledJob, TopicSubscription};
pub use config::GobletConfig;
pub use context::{FunctionInfo, RequestContext};
pub use error::{Error, GobletError};
pub use event::{DetectedEvent, EventContext, EventResource, EventType, PubSubMessage};
pub use logging::{init_logging, LogResource, StackdriverLayer};
pub use registry::{register, registered, Registration};
pub use request::Request;
pub use response::{jsonify, IntoResponse, JsonArgs, Response};
pub use router::{handler, Handler, HandlerFuture, RouteMatch, Router};
pub use server::{serve, serve_with_listener, serve_with_shutdown};

#[doc(hidden)]
pub mod __private {
    pub use crate::response::into_handler_result;
}
