use crate::engine::protocol::InboundFrame;
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Frame(InboundFrame),
    /// Byte-identical to the previous frame; nothing to apply.
    Suppressed,
}

/// Decodes inbound frames and drops immediate redeliveries.
///
/// Only the most recent raw payload is remembered, and it is compared by exact
/// string equality. Two different events that happen to serialize identically
/// back to back are indistinguishable from a redelivery.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    previous: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, raw: &str) -> Result<Decoded, DecodeError> {
        if self.previous.as_deref() == Some(raw) {
            tracing::debug!("suppressing duplicate frame");
            return Ok(Decoded::Suppressed);
        }
        let frame = InboundFrame::parse(raw)?;
        self.previous = Some(raw.to_owned());
        Ok(Decoded::Frame(frame))
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_A: &str =
        r#"{"type":"result","data":{"host":{"id":1,"hostname":"a"},"rows":[{"x":"1"}]}}"#;
    const RESULT_B: &str =
        r#"{"type":"result","data":{"host":{"id":2,"hostname":"b"},"rows":[]}}"#;

    #[test]
    fn identical_raw_frame_is_suppressed_once_seen() {
        let mut decoder = FrameDecoder::new();
        assert!(matches!(decoder.decode(RESULT_A).unwrap(), Decoded::Frame(_)));
        assert_eq!(decoder.decode(RESULT_A).unwrap(), Decoded::Suppressed);
        assert!(matches!(decoder.decode(RESULT_B).unwrap(), Decoded::Frame(_)));
        // Only the last payload is remembered.
        assert!(matches!(decoder.decode(RESULT_A).unwrap(), Decoded::Frame(_)));
    }

    #[test]
    fn whitespace_differences_are_not_duplicates() {
        let mut decoder = FrameDecoder::new();
        let spaced = RESULT_A.replace(",\"rows\"", ", \"rows\"");
        decoder.decode(RESULT_A).unwrap();
        assert!(matches!(decoder.decode(&spaced).unwrap(), Decoded::Frame(_)));
    }

    #[test]
    fn malformed_frame_is_an_error_and_not_remembered() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode("{oops").is_err());
        assert!(decoder.decode("{oops").is_err());
    }

    #[test]
    fn reset_forgets_previous_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.decode(RESULT_A).unwrap();
        decoder.reset();
        assert!(matches!(decoder.decode(RESULT_A).unwrap(), Decoded::Frame(_)));
    }
}
