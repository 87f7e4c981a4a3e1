//! REST adapter: stateless HTTP execution.
//!
//! A call is assembled in three steps:
//!
//! 1. `$field` placeholders in the URL template are substituted with
//!    same-named call arguments (percent-encoded); substituted arguments
//!    are consumed
//! 2. `params`-listed arguments not consumed by substitution become query
//!    parameters
//! 3. `body`-listed arguments are sent as a JSON body
//!
//! Relative templates resolve against the configured origin.

// ============================================================================
// Imports
// ============================================================================

use reqwest::Client;
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::routes::{Protocol, RestDescriptor, RouteEntry};

use super::{CallArgs, ConnectionParams};

// ============================================================================
// RestAdapter
// ============================================================================

/// The REST protocol adapter.
///
/// Stateless: every call builds a fresh request on a shared HTTP client.
#[derive(Debug, Clone)]
pub struct RestAdapter {
    client: Client,
    origin: Url,
}

impl RestAdapter {
    /// Creates an adapter resolving relative URLs against `origin`.
    #[must_use]
    pub fn new(origin: Url) -> Self {
        Self {
            client: Client::new(),
            origin,
        }
    }

    /// Accepts and ignores connection parameters; HTTP holds no connection.
    pub fn configure(&self, _params: ConnectionParams) {
        trace!("REST adapter holds no connection state");
    }

    /// Executes a route over HTTP.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolUnsupported`] if the entry lacks a rest descriptor
    /// - [`Error::CallFailed`] for non-success HTTP statuses
    /// - [`Error::Http`] for transport failures
    pub async fn execute(&self, name: &str, entry: &RouteEntry, args: CallArgs) -> Result<Value> {
        let descriptor = entry
            .rest
            .as_ref()
            .ok_or_else(|| Error::protocol_unsupported(name, Protocol::Rest))?;

        let request = self.build_request(descriptor, &args)?;
        debug!(route = name, method = %request.method(), url = %request.url(), "HTTP call");

        let response = self.client.execute(request).await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::call_failed(status.as_u16().to_string(), text));
        }

        // Non-JSON bodies come back as plain text.
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(text)),
        }
    }

    /// Builds the HTTP request for a descriptor and argument set.
    pub(crate) fn build_request(
        &self,
        descriptor: &RestDescriptor,
        args: &CallArgs,
    ) -> Result<reqwest::Request> {
        let (path, consumed) = substitute_template(&descriptor.url, args);

        let url = match Url::parse(&path) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .origin
                .join(&path)
                .map_err(|e| Error::invalid_argument(format!("bad URL {path}: {e}")))?,
            Err(e) => {
                return Err(Error::invalid_argument(format!("bad URL {path}: {e}")));
            }
        };

        let method: reqwest::Method = descriptor
            .method
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| Error::route(format!("unknown HTTP method {}", descriptor.method)))?;

        let mut request = self.client.request(method, url);

        let query: Vec<(String, String)> = descriptor
            .params
            .iter()
            .filter(|name| !consumed.contains(name.as_str()))
            .filter_map(|name| args.get(name).map(|v| (name.clone(), plain_string(v))))
            .collect();
        if !query.is_empty() {
            request = request.query(&query);
        }

        let body: Map<String, Value> = descriptor
            .body
            .iter()
            .filter_map(|name| args.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        if !body.is_empty() {
            request = request.json(&Value::Object(body));
        }

        Ok(request.build()?)
    }
}

// ============================================================================
// Template Substitution
// ============================================================================

/// Substitutes `$field` placeholders with same-named arguments.
///
/// Returns the resolved string plus the set of consumed argument names.
/// Placeholders with no matching argument are left literal.
fn substitute_template(template: &str, args: &CallArgs) -> (String, FxHashSet<String>) {
    let mut out = String::with_capacity(template.len());
    let mut consumed = FxHashSet::default();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }

        match args.get(&name) {
            Some(value) if !name.is_empty() => {
                out.push_str(&urlencoding::encode(&plain_string(value)));
                consumed.insert(name);
            }
            _ => {
                out.push('$');
                out.push_str(&name);
            }
        }
    }

    (out, consumed)
}

/// Renders an argument value for a URL segment or query parameter.
fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
