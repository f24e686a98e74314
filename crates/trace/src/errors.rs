use std::sync::Arc;

use apm_core::time::now_millis;
use serde::Serialize;

use crate::attributes::{Attributes, attributes_to_json};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedError {
    pub class: String,
    pub message: String,
    pub stack: Vec<String>,
    pub timestamp_ms: u64,
    pub transaction_guid: Option<String>,
}

impl CapturedError {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            stack: Vec::new(),
            timestamp_ms: now_millis(),
            transaction_guid: None,
        }
    }

    pub fn with_stack(mut self, stack: Vec<String>) -> Self {
        self.stack = stack;
        self
    }
}

impl<E: std::error::Error> From<&E> for CapturedError {
    fn from(err: &E) -> Self {
        let class = std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or("Error")
            .to_string();
        Self::new(class, err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Exception {
    pub error: Arc<CapturedError>,
    pub custom_attributes: Attributes,
}

impl Exception {
    pub fn new(error: Arc<CapturedError>, custom_attributes: Attributes) -> Self {
        Self {
            error,
            custom_attributes,
        }
    }

    /// Sets the transaction guid on this exception's copy of the error.
    /// A capture shared with someone else is cloned first.
    pub fn annotate(&mut self, transaction_guid: &str) {
        Arc::make_mut(&mut self.error).transaction_guid = Some(transaction_guid.to_string());
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": &*self.error,
            "customAttributes": attributes_to_json(&self.custom_attributes),
        })
    }
}
