//! Goblet is a lightweight framework for Google Cloud Functions.
//!
//! Handlers are plain `async fn`s taking a [`RequestContext`]. Attribute macros
//! register them for HTTP routes, Pub/Sub topics and Cloud Scheduler jobs, and a
//! single function endpoint dispatches every invocation to the right handler.
//!
//! # Features
//!
//! * Path parameter extraction (`{id}`, greedy `{path+}`)
//! * Pub/Sub push and background events, with attribute filters
//! * Scheduled jobs triggered through Cloud Scheduler
//! * `jsonify` responses
//! * Cloud Logging structured output
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use goblet::{route, topic, Error, RequestContext};
//! use serde_json::{json, Value};
//!
//! #[route(path = "/hello/{name}")]
//! async fn hello(ctx: RequestContext) -> Result<Value, Error> {
//!     let name = ctx.get_param_or("name", "World");
//!     Ok(json!({ "message": format!("Hello, {}!", name) }))
//! }
//!
//! #[topic(name = "orders")]
//! async fn on_order(ctx: RequestContext) -> Result<(), Error> {
//!     println!("received {:?}", ctx.data);
//!     Ok(())
//! }
//!
//! goblet::goblet_entrypoint!();
//! ```
//!
//! # Building the app explicitly
//!
//! Everything the macros do is also available on [`GobletBuilder`]:
//!
//! ```rust
//! use goblet::{Error, Goblet, GobletConfig, RequestContext};
//!
//! let app = Goblet::builder()
//!     .config(GobletConfig::builder().function_name("orders").build())
//!     .route("GET", "/health", |_ctx: RequestContext| async move {
//!         Ok::<_, Error>("ok")
//!     })
//!     .schedule("nightly", "0 3 * * *", |_ctx: RequestContext| async move {
//!         Ok::<_, Error>(())
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(app.schedules()[0].timezone, "UTC");
//! ```

pub use goblet_core::*;
pub use goblet_macro::{http_handler, route, schedule, topic};

/// Generates a `main` that serves the registered handlers.
///
/// Configuration is read with [`GobletConfig::from_env`], logging is
/// initialised with [`init_logging`], and every handler registered with the
/// attribute macros is added to the app. An optional expression receives the
/// [`GobletBuilder`] before it is built, to add hooks or extra handlers.
///
/// ```rust,no_run
/// use goblet::{http_handler, Error, RequestContext};
///
/// #[http_handler]
/// async fn main_handler(ctx: RequestContext) -> Result<String, Error> {
///     Ok(format!("{} {}", ctx.method(), ctx.path()))
/// }
///
/// goblet::goblet_entrypoint!(|builder: goblet::GobletBuilder| {
///     builder.header(
///         goblet::http::header::CACHE_CONTROL,
///         goblet::http::HeaderValue::from_static("no-store"),
///     )
/// });
/// ```
#[macro_export]
macro_rules! goblet_entrypoint {
    () => {
        $crate::goblet_entrypoint!(|builder: $crate::GobletBuilder| builder);
    };
    ($configure:expr) => {
        fn main() -> ::std::result::Result<(), $crate::Error> {
            $crate::tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(async {
                    let config = $crate::GobletConfig::from_env();
                    $crate::init_logging(&config)?;
                    let builder = $crate::Goblet::builder().config(config).from_registry();
                    let app = ($configure)(builder).build()?;
                    $crate::serve(app).await?;
                    Ok::<(), $crate::Error>(())
                })
        }
    };
}

#[cfg(doctest)]
extern crate doc_comment;

#[cfg(doctest)]
use doc_comment::doctest;

#[cfg(doctest)]
doctest!("../README.md", readme);
