use crate::error::{Error, GobletError};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value as JsonValue};
use std::io;

const APPLICATION_JSON: &str = "application/json";
const TEXT_HTML: &str = "text/html; charset=utf-8";
const TEXT_PLAIN: &str = "text/plain";

/// The `(body, status, headers)` triple returned to the Cloud Functions host.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub body: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl Response {
    pub fn new(body: impl Into<String>, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            body: body.into(),
            status,
            headers,
        }
    }

    /// An empty `200` response.
    pub fn empty() -> Self {
        Self::new(String::new(), StatusCode::OK, HeaderMap::new())
    }

    /// A plain text response with the given status.
    pub fn text(body: impl Into<String>, status: StatusCode) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        Self::new(body, status, headers)
    }

    pub fn not_found() -> Self {
        Self::text("Not Found", StatusCode::NOT_FOUND)
    }

    pub fn into_parts(self) -> (String, StatusCode, HeaderMap) {
        (self.body, self.status, self.headers)
    }
}

/// Arguments to [`jsonify`], mirroring positional and keyword call styles.
///
/// Positional and keyword arguments are mutually exclusive; mixing them makes
/// [`JsonArgs::into_data`] fail with [`GobletError::JsonifyArgs`].
///
/// ```rust
/// use goblet_core::{jsonify, JsonArgs};
/// use http::HeaderMap;
///
/// let response = jsonify(JsonArgs::new().kwarg("a", 1), &HeaderMap::new()).unwrap();
/// assert_eq!(response.body, r#"{"a":1}"#);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonArgs {
    args: Vec<JsonValue>,
    kwargs: Map<String, JsonValue>,
}

impl JsonArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<JsonValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Resolve the arguments into the value that gets serialized.
    ///
    /// A single positional argument is used as is, several become an array and
    /// keyword arguments become an object in insertion order.
    pub fn into_data(self) -> Result<JsonValue, GobletError> {
        match (self.args.is_empty(), self.kwargs.is_empty()) {
            (false, false) => Err(GobletError::JsonifyArgs),
            (false, true) => {
                let mut args = self.args;
                if args.len() == 1 {
                    Ok(args.remove(0))
                } else {
                    Ok(JsonValue::Array(args))
                }
            }
            _ => Ok(JsonValue::Object(self.kwargs)),
        }
    }
}

impl From<JsonValue> for JsonArgs {
    fn from(value: JsonValue) -> Self {
        Self::new().arg(value)
    }
}

/// Compact JSON with every non-ASCII character written as a `\uXXXX` escape.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

fn to_ascii_json(value: &JsonValue) -> Result<String, GobletError> {
    let mut buf = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, AsciiFormatter);
    value.serialize(&mut serializer)?;
    // only ASCII is ever written
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Serialize `args` into a compact JSON response.
///
/// The response always carries `Content-Type: application/json`, overridden
/// by anything in `headers`. The status is fixed to `200`. Non-ASCII text is
/// escaped, so `{"a": "é"}` is sent as `{"a":"\u00e9"}`.
pub fn jsonify(args: impl Into<JsonArgs>, headers: &HeaderMap) -> Result<Response, GobletError> {
    let data = args.into().into_data()?;
    let body = to_ascii_json(&data)?;
    Ok(Response::new(body, StatusCode::OK, json_headers(headers)))
}

fn json_headers(extra: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(extra.len() + 1);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    for (name, value) in extra {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

/// Conversion from handler return values into a [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::empty()
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_HTML));
        Response::new(self, StatusCode::OK, headers)
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        self.to_string().into_response()
    }
}

impl IntoResponse for JsonValue {
    fn into_response(self) -> Response {
        let body = to_ascii_json(&self).unwrap_or_else(|_| self.to_string());
        Response::new(body, StatusCode::OK, json_headers(&HeaderMap::new()))
    }
}

impl<B: Into<String>> IntoResponse for (B, u16) {
    fn into_response(self) -> Response {
        let (body, status) = self;
        let mut response = body.into().into_response();
        response.status = status_or_500(status);
        response
    }
}

impl<B: Into<String>> IntoResponse for (B, u16, HeaderMap) {
    fn into_response(self) -> Response {
        let (body, status, headers) = self;
        Response::new(body, status_or_500(status), headers)
    }
}

fn status_or_500(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Normalise a handler result. Used by the registration macros.
pub fn into_handler_result<R, E>(result: Result<R, E>) -> Result<Response, Error>
where
    R: IntoResponse,
    E: Into<Error>,
{
    result.map(IntoResponse::into_response).map_err(Into::into)
}
