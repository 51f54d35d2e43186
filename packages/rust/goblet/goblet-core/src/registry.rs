//! Process-wide registry filled by the `#[route]`, `#[topic]`, `#[schedule]`
//! and `#[http_handler]` attribute macros before `main` runs.

use crate::context::RequestContext;
use crate::router::{Handler, HandlerFuture};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref REGISTRY: Mutex<Vec<Registration>> = Mutex::new(Vec::new());
}

/// A handler declared with one of the registration macros.
#[derive(Clone)]
pub enum Registration {
    Route {
        method: String,
        path: String,
        handler: Handler,
    },
    Topic {
        topic: String,
        attributes: HashMap<String, String>,
        handler: Handler,
    },
    Schedule {
        /// Job name; `None` means the function name.
        name: Option<String>,
        schedule: String,
        timezone: Option<String>,
        description: Option<String>,
        handler: Handler,
    },
    Http {
        handler: Handler,
    },
}

impl Registration {
    pub fn route<F>(method: &str, path: &str, handler: F) -> Self
    where
        F: Fn(RequestContext) -> HandlerFuture + Send + Sync + 'static,
    {
        Registration::Route {
            method: method.to_uppercase(),
            path: path.to_string(),
            handler: Arc::new(handler),
        }
    }

    pub fn topic<F>(topic: &str, attributes: &[(&str, &str)], handler: F) -> Self
    where
        F: Fn(RequestContext) -> HandlerFuture + Send + Sync + 'static,
    {
        Registration::Topic {
            topic: topic.to_string(),
            attributes: attributes
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            handler: Arc::new(handler),
        }
    }

    pub fn schedule<F>(
        name: Option<&str>,
        schedule: &str,
        timezone: Option<&str>,
        description: Option<&str>,
        handler: F,
    ) -> Self
    where
        F: Fn(RequestContext) -> HandlerFuture + Send + Sync + 'static,
    {
        Registration::Schedule {
            name: name.map(str::to_string),
            schedule: schedule.to_string(),
            timezone: timezone.map(str::to_string),
            description: description.map(str::to_string),
            handler: Arc::new(handler),
        }
    }

    pub fn http<F>(handler: F) -> Self
    where
        F: Fn(RequestContext) -> HandlerFuture + Send + Sync + 'static,
    {
        Registration::Http {
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Route { method, path, .. } => {
                f.debug_struct("Route").field("method", method).field("path", path).finish()
            }
            Registration::Topic {
                topic, attributes, ..
            } => f
                .debug_struct("Topic")
                .field("topic", topic)
                .field("attributes", attributes)
                .finish(),
            Registration::Schedule {
                name,
                schedule,
                timezone,
                ..
            } => f
                .debug_struct("Schedule")
                .field("name", name)
                .field("schedule", schedule)
                .field("timezone", timezone)
                .finish(),
            Registration::Http { .. } => f.debug_struct("Http").finish(),
        }
    }
}

/// Add a registration to the process-wide registry.
pub fn register(registration: Registration) {
    let mut registry = REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    registry.push(registration);
}

/// Snapshot of everything registered so far, in registration order.
pub fn registered() -> Vec<Registration> {
    REGISTRY
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}
