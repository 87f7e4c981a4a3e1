//! Call dispatcher: the facade consumed by application code.
//!
//! `invoke` resolves the logical call name through the route table, checks
//! that the route supports the configured active protocol, delegates to the
//! adapter, and normalizes the raw result to the route's declared shape.
//!
//! Normalization is advisory: conversion happens on a best-effort basis and
//! the raw value is returned unchanged when no conversion applies — it is
//! not a contract the caller can rely on for validation.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::adapter::{CallArgs, DataAdapter};
use crate::error::{Error, Result};
use crate::routes::{Protocol, ReturnShape, RouteTable};

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes logical calls to the active protocol adapter.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    adapter: Arc<DataAdapter>,
    protocol: Protocol,
}

impl Dispatcher {
    /// Creates a dispatcher over a route table and the active adapter.
    #[must_use]
    pub fn new(routes: Arc<RouteTable>, adapter: Arc<DataAdapter>, protocol: Protocol) -> Self {
        Self {
            routes,
            adapter,
            protocol,
        }
    }

    /// Returns the active protocol.
    #[inline]
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Invokes a route by name with named arguments.
    ///
    /// # Errors
    ///
    /// - [`Error::RouteNotFound`] for an unknown name (fatal misconfiguration)
    /// - [`Error::ProtocolUnsupported`] if the route lacks a descriptor for
    ///   the active protocol (fatal misconfiguration)
    /// - adapter errors, surfaced unchanged and never retried here
    pub async fn invoke(&self, name: &str, args: CallArgs) -> Result<Value> {
        let entry = self
            .routes
            .lookup(name)
            .ok_or_else(|| Error::route_not_found(name))?;

        if !entry.supports(self.protocol) {
            return Err(Error::protocol_unsupported(name, self.protocol));
        }

        debug!(route = name, protocol = %self.protocol, "Dispatching call");

        let raw = self.adapter.execute(name, entry, args).await?;
        Ok(normalize(raw, entry.return_shape))
    }

    /// Invokes a route that takes no arguments.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::invoke`].
    pub async fn call(&self, name: &str) -> Result<Value> {
        self.invoke(name, CallArgs::new()).await
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Best-effort conversion of raw adapter output to the declared shape.
fn normalize(value: Value, shape: ReturnShape) -> Value {
    match shape {
        ReturnShape::Void => Value::Null,

        ReturnShape::Text => match value {
            Value::String(_) => value,
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            other => other,
        },

        ReturnShape::Array => match value {
            Value::Array(_) => value,
            Value::Null => Value::Array(Vec::new()),
            other => other,
        },

        ReturnShape::Object => match value {
            Value::Object(_) => value,
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
