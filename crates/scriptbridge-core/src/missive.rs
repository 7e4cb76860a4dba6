//! One-shot result channel ("missive").
//!
//! Guest code gets exactly one chance per run to hand a structured value to
//! the host. A second send is a protocol violation; the first value stays.

use crate::{error::BridgeError, value::GuestValue};

/// Message raised into the guest on a second send.
pub const DOUBLE_SEND_MESSAGE: &str = "send_result() can only be called once per execution; \
     put everything you need to return into a single dict or list";

/// Result slot for one session.
#[derive(Debug, Default)]
pub struct ResultChannel {
    slot: Option<GuestValue>,
}

impl ResultChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the slot and re-arm the channel.
    pub fn reset(&mut self) {
        self.slot = None;
    }

    /// Store the session's result.
    ///
    /// # Errors
    /// Returns [`BridgeError::ProtocolViolation`] if a value was already sent
    /// this session. The stored value is left untouched.
    pub fn send(&mut self, value: GuestValue) -> Result<(), BridgeError> {
        if self.slot.is_some() {
            tracing::debug!("rejecting second result send");
            return Err(BridgeError::ProtocolViolation(DOUBLE_SEND_MESSAGE.to_string()));
        }
        self.slot = Some(value);
        Ok(())
    }

    /// Whether a value was sent this session.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.slot.is_some()
    }

    /// Current slot contents.
    #[must_use]
    pub const fn peek(&self) -> Option<&GuestValue> {
        self.slot.as_ref()
    }

    /// Wire text of the stored value, or `None` if nothing was sent.
    ///
    /// # Errors
    /// Returns [`BridgeError::SerializationFailure`] if the value has no wire
    /// form.
    pub fn as_wire_text(&self) -> Result<Option<String>, BridgeError> {
        self.slot.as_ref().map(GuestValue::to_wire_text).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_channel() {
        let channel = ResultChannel::new();
        assert!(!channel.is_set());
        assert!(channel.peek().is_none());
        assert_eq!(channel.as_wire_text().unwrap(), None);
    }

    #[test]
    fn test_second_send_is_rejected_and_first_kept() {
        let mut channel = ResultChannel::new();
        channel.send(GuestValue::Int(1)).unwrap();

        let err = channel.send(GuestValue::Int(2)).unwrap_err();
        assert_eq!(err.kind(), "ProtocolViolation");
        assert!(err.to_string().contains("once per execution"));

        assert_eq!(channel.peek(), Some(&GuestValue::Int(1)));
        assert_eq!(channel.as_wire_text().unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_sending_null_counts_as_sent() {
        let mut channel = ResultChannel::new();
        channel.send(GuestValue::Null).unwrap();
        assert!(channel.is_set());
        assert_eq!(channel.as_wire_text().unwrap().as_deref(), Some("null"));
        assert!(channel.send(GuestValue::Null).is_err());
    }

    #[test]
    fn test_reset_rearms() {
        let mut channel = ResultChannel::new();
        channel.send(GuestValue::Bool(true)).unwrap();
        channel.reset();
        assert!(channel.peek().is_none());
        channel.send(GuestValue::Bool(false)).unwrap();
        assert_eq!(channel.as_wire_text().unwrap().as_deref(), Some("false"));
    }

    #[test]
    fn test_unserializable_value_surfaces_error() {
        let mut channel = ResultChannel::new();
        channel
            .send(GuestValue::Opaque("generator".into()))
            .unwrap();
        let err = channel.as_wire_text().unwrap_err();
        assert_eq!(err.kind(), "SerializationFailure");
    }
}
