//! Subscription request and state types.

use crate::error::ClientError;
use crate::types::{ConnectionState, Query};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub type DataCallback = Arc<dyn Fn(&Value) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ClientError) + Send + Sync>;
pub type CompleteCallback = Arc<dyn Fn() + Send + Sync>;

/// Request for a new subscription.
#[derive(Clone)]
pub struct SubscribeOptions {
    pub query: Query,
    pub variables: Option<Value>,
    /// Falls back to the document's operation name when unset.
    pub operation_name: Option<String>,
    pub on_data: Option<DataCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_complete: Option<CompleteCallback>,
}

impl SubscribeOptions {
    pub fn new(query: impl Into<Query>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
            on_data: None,
            on_error: None,
            on_complete: None,
        }
    }

    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    pub fn on_data(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_data = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("query", &self.query)
            .field("variables", &self.variables)
            .field("operation_name", &self.operation_name)
            .field("on_data", &self.on_data.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Observable state of one subscription.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriptionState {
    /// Latest `data` pushed by the server.
    pub data: Option<Value>,
    /// Latest error; cleared by the next data frame.
    pub error: Option<ClientError>,
    /// True only while connected and not yet completed or unsubscribed.
    pub active: bool,
    pub connection_state: ConnectionState,
}

/// Events delivered on a subscription's channel, in receipt order.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionEvent {
    Data(Value),
    Error(ClientError),
    /// The server completed the subscription.
    Complete,
    /// The subscription was cancelled locally.
    Unsubscribed,
}
