//! Event type detection for incoming invocations.
//!
//! A single Cloud Function endpoint receives HTTP calls, Cloud Scheduler
//! triggers, Pub/Sub push deliveries and legacy background events. This module
//! works out which one a request is and extracts the event payload.

use crate::constants::{event_types, headers};
use crate::error::GobletError;
use crate::request::Request;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt::{self, Display};

/// The kind of invocation being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Catch-all HTTP function
    Http,
    /// HTTP request dispatched through registered routes
    Route,
    /// Pub/Sub message, pushed or delivered as a background event
    PubSub,
    /// Cloud Scheduler trigger
    Schedule,
}

impl Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Http => write!(f, "http"),
            EventType::Route => write!(f, "route"),
            EventType::PubSub => write!(f, "pubsub"),
            EventType::Schedule => write!(f, "schedule"),
        }
    }
}

/// Resource a background event refers to. Older runtimes send a plain string,
/// newer ones an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventResource {
    Name(String),
    Object {
        name: String,
        #[serde(default)]
        service: Option<String>,
        #[serde(default, rename = "type")]
        kind: Option<String>,
    },
}

impl EventResource {
    pub fn name(&self) -> &str {
        match self {
            EventResource::Name(name) => name,
            EventResource::Object { name, .. } => name,
        }
    }
}

/// Metadata of a background event (`context` in the legacy event format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub event_type: String,
    pub resource: EventResource,
}

impl EventContext {
    /// Last path segment of the resource name, e.g. the topic of a Pub/Sub event.
    pub fn resource_id(&self) -> &str {
        let name = self.resource.name();
        name.rsplit('/').next().unwrap_or(name)
    }

    fn is_pubsub_publish(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            event_types::PUBSUB_PUBLISH | event_types::PUBSUB_PUBLISH_LEGACY
        )
    }
}

/// A Pub/Sub message. `data` is base64 encoded on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default, alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, alias = "publish_time")]
    pub publish_time: Option<String>,
}

impl PubSubMessage {
    /// Base64-decode `data` into UTF-8 text. A message without data decodes to
    /// the empty string.
    pub fn decode_data(&self) -> Result<String, GobletError> {
        match &self.data {
            Some(data) => Ok(String::from_utf8(STANDARD.decode(data)?)?),
            None => Ok(String::new()),
        }
    }

    /// Whether every `key=value` pair of `filter` is present on the message.
    pub fn matches_attributes(&self, filter: &HashMap<String, String>) -> bool {
        filter
            .iter()
            .all(|(key, value)| self.attributes.get(key) == Some(value))
    }
}

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PubSubMessage,
    subscription: String,
}

#[derive(Debug, Deserialize)]
struct BackgroundEvent {
    context: EventContext,
    #[serde(default)]
    data: JsonValue,
}

/// What an incoming request turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectedEvent {
    Schedule {
        name: String,
    },
    PubSub {
        topic: String,
        message: PubSubMessage,
        context: Option<EventContext>,
        raw: JsonValue,
    },
    Http,
}

impl DetectedEvent {
    /// Classify `request`.
    ///
    /// `function_name` is needed to recover the topic from push subscription
    /// names, which Goblet creates as `{function_name}-{topic}`.
    pub fn detect(request: &Request, function_name: &str) -> Result<Self, GobletError> {
        if request
            .header(headers::GOBLET_TYPE)
            .is_some_and(|value| value.eq_ignore_ascii_case("schedule"))
        {
            let name = request.header(headers::GOBLET_NAME).unwrap_or_default();
            return Ok(DetectedEvent::Schedule {
                name: name.to_string(),
            });
        }

        if request.body().is_empty() {
            return Ok(DetectedEvent::Http);
        }

        let Ok(body) = serde_json::from_slice::<JsonValue>(request.body()) else {
            return Ok(DetectedEvent::Http);
        };

        if body.get("context").is_some_and(|c| c.get("eventType").is_some()) {
            let event: BackgroundEvent = serde_json::from_value(body.clone())
                .map_err(|e| GobletError::InvalidEvent(e.to_string()))?;
            if !event.context.is_pubsub_publish() {
                return Err(GobletError::UnsupportedEventType(event.context.event_type));
            }
            let message: PubSubMessage = serde_json::from_value(event.data)
                .map_err(|e| GobletError::InvalidEvent(e.to_string()))?;
            return Ok(DetectedEvent::PubSub {
                topic: event.context.resource_id().to_string(),
                message,
                context: Some(event.context),
                raw: body,
            });
        }

        let is_push_agent = request
            .header(headers::USER_AGENT)
            .is_some_and(|agent| agent.starts_with(headers::PUBSUB_PUSH_USER_AGENT));
        let looks_like_push = body.get("message").is_some() && body.get("subscription").is_some();

        if looks_like_push || (is_push_agent && body.get("message").is_some()) {
            let envelope: PushEnvelope = serde_json::from_value(body.clone())
                .map_err(|e| GobletError::InvalidEvent(e.to_string()))?;
            return Ok(DetectedEvent::PubSub {
                topic: topic_from_subscription(&envelope.subscription, function_name),
                message: envelope.message,
                context: None,
                raw: body,
            });
        }

        Ok(DetectedEvent::Http)
    }
}

fn topic_from_subscription(subscription: &str, function_name: &str) -> String {
    let name = subscription.rsplit('/').next().unwrap_or(subscription);
    name.strip_prefix(function_name)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or(name)
        .to_string()
}
