//! Data models for order-ingest
//!
//! This module contains the order event decoded from Kafka payloads and the
//! errors produced while decoding it.

pub mod error;
pub mod event;

// Re-export commonly used types
pub use error::{DecodeError, DecodeErrorKind};
pub use event::{decode, OrderCreatedEvent};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _event = OrderCreatedEvent::new(1, 2, 3.0);
        let _error = DecodeError::new(DecodeErrorKind::EmptyPayload);
        assert!(decode(b"{}").is_err());
    }
}
