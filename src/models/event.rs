//! Order event model and record decoder
//!
//! `OrderCreatedEvent` is the unit of work for one pipeline iteration: it is
//! decoded from a Kafka payload, written to ClickHouse as one row, and then
//! dropped.

use clickhouse::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use super::error::{DecodeError, DecodeErrorKind};

/// An order has been placed
///
/// Field names match both the JSON payload and the ClickHouse columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Row, Validate)]
pub struct OrderCreatedEvent {
    /// Order identifier
    pub order_id: i64,

    /// Purchasing user
    pub user_id: i64,

    /// Order total. Carried as a float, so not exact to the cent.
    #[validate(range(min = 0.0))]
    pub total: f64,
}

impl OrderCreatedEvent {
    pub fn new(order_id: i64, user_id: i64, total: f64) -> Self {
        Self {
            order_id,
            user_id,
            total,
        }
    }

    /// Serialize back to the wire format
    pub fn to_payload(&self) -> Vec<u8> {
        // Three plain numeric fields cannot fail to serialize.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Decode a raw message payload into an order event
///
/// The payload must be a JSON object. Unknown fields are ignored. Missing
/// fields, wrong types, truncated or malformed JSON, and negative totals are
/// all rejected; no partially populated event is ever returned.
pub fn decode(payload: &[u8]) -> Result<OrderCreatedEvent, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::new(DecodeErrorKind::EmptyPayload));
    }

    // Derived struct deserialization would also read a positional array.
    let value: Value = serde_json::from_slice(payload)?;
    if !value.is_object() {
        return Err(DecodeError::new(DecodeErrorKind::Malformed)
            .add_context(format!("expected a JSON object, found {}", json_kind(&value))));
    }

    let event: OrderCreatedEvent = serde_json::from_value(value)?;
    event.validate()?;

    Ok(event)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
