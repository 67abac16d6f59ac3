//! Typed read access to schema-less JSON payloads (node config, event
//! details).
//!
//! Payloads come from outside the engine and may be any JSON value. Every
//! read of a known sub-field goes through [`Payload`], which returns `None`
//! (or the supplied default) instead of failing when the payload is not an
//! object or the field has the wrong type.

use serde_json::Value;

/// Keys the engine writes into and reads from event details.
pub mod keys {
    pub const NODE_TYPE: &str = "node_type";
    pub const OPERATION: &str = "operation";
    pub const POSITION: &str = "position";
    pub const ERROR: &str = "error";
}

#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    value: &'a Value,
}

impl<'a> Payload<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    /// Raw field, `None` when absent, null, or the payload is not an object.
    pub fn field(&self, key: &str) -> Option<&'a Value> {
        self.value.get(key).filter(|v| !v.is_null())
    }

    pub fn str_field(&self, key: &str) -> Option<&'a str> {
        self.field(key).and_then(Value::as_str)
    }

    pub fn node_type(&self) -> Option<&'a str> {
        self.str_field(keys::NODE_TYPE)
    }

    pub fn operation(&self) -> Option<&'a str> {
        self.str_field(keys::OPERATION)
    }

    pub fn position(&self) -> Option<&'a Value> {
        self.field(keys::POSITION)
    }

    pub fn error(&self) -> Option<&'a str> {
        self.str_field(keys::ERROR)
    }
}
