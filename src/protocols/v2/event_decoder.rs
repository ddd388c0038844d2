use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::core::constants::event_log::{DISCRIMINATOR_LEN, PROGRAM_DATA_PREFIX};
use crate::core::discriminator::DiscriminatorRegistry;
use crate::protocols::error::DecodeError;

use super::events::ProgramEvent;

/// One event recovered from the log, in log order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedEvent {
    pub name: &'static str,
    pub log_index: usize,
    pub event: ProgramEvent,
}

pub struct EventDecoder {
    registry: Arc<DiscriminatorRegistry<ProgramEvent>>,
}

impl EventDecoder {
    pub fn new(registry: Arc<DiscriminatorRegistry<ProgramEvent>>) -> Self {
        Self { registry }
    }

    /// Scans every line; a bad line never stops the scan.
    pub fn decode_logs<S: AsRef<str>>(&self, logs: &[S]) -> Vec<DecodedEvent> {
        self.scan_logs(logs).0
    }

    /// Like [`EventDecoder::decode_logs`], also returning why each rejected
    /// `Program data` line failed.
    pub fn scan_logs<S: AsRef<str>>(&self, logs: &[S]) -> (Vec<DecodedEvent>, Vec<DecodeError>) {
        let mut events = Vec::new();
        let mut errors = Vec::new();
        for (log_index, line) in logs.iter().enumerate() {
            match self.try_decode_line(line.as_ref()) {
                Ok(Some((name, event))) => events.push(DecodedEvent {
                    name,
                    log_index,
                    event,
                }),
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(log_index, "skipping log line: {err}");
                    errors.push(err);
                }
            }
        }
        (events, errors)
    }

    pub fn decode_line(&self, line: &str) -> Option<(&'static str, ProgramEvent)> {
        self.try_decode_line(line).ok().flatten()
    }

    /// `Ok(None)` for lines that are not event data and for unregistered tags.
    pub fn try_decode_line(
        &self,
        line: &str,
    ) -> Result<Option<(&'static str, ProgramEvent)>, DecodeError> {
        let Some(encoded) = line.strip_prefix(PROGRAM_DATA_PREFIX) else {
            return Ok(None);
        };
        let payload = STANDARD.decode(encoded.trim_end())?;
        if payload.len() <= DISCRIMINATOR_LEN {
            return Err(DecodeError::short_data(DISCRIMINATOR_LEN + 1, payload.len()));
        }

        let (tag, body) = payload.split_at(DISCRIMINATOR_LEN);
        let Some((name, decoded)) = self.registry.decode(tag, body) else {
            tracing::debug!("unregistered discriminator: {}", hex::encode(tag));
            return Ok(None);
        };
        Ok(Some((name, decoded?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::event_names;
    use crate::core::discriminator::discriminator;
    use crate::protocols::v2::events::default_registry;

    fn collect_payload() -> Vec<u8> {
        let mut data = discriminator("event", event_names::COLLECT_FEE).to_vec();
        data.extend_from_slice(&[1u8; 32]);
        data.extend_from_slice(&[2u8; 32]);
        data.extend_from_slice(&[3u8; 32]);
        for value in [10u64, 20, 300, 400] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        data
    }

    fn line(bytes: &[u8]) -> String {
        format!("{PROGRAM_DATA_PREFIX}{}", STANDARD.encode(bytes))
    }

    #[test]
    fn decodes_registered_event() {
        let decoder = EventDecoder::new(Arc::new(default_registry()));
        let (name, event) = decoder.decode_line(&line(&collect_payload())).unwrap();
        assert_eq!(name, event_names::COLLECT_FEE);
        match event {
            ProgramEvent::CollectFee(e) => {
                assert_eq!((e.fee_a, e.fee_b), (10, 20));
                assert_eq!((e.vault_a_balance, e.vault_b_balance), (300, 400));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn prefix_is_case_sensitive() {
        let decoder = EventDecoder::new(Arc::new(default_registry()));
        let lowered = line(&collect_payload()).replacen("Program data", "program data", 1);
        assert!(decoder.decode_line(&lowered).is_none());
    }

    #[test]
    fn rejects_payload_of_exactly_one_tag() {
        let decoder = EventDecoder::new(Arc::new(default_registry()));
        let tag = discriminator("event", event_names::COLLECT_FEE);
        assert!(decoder.decode_line(&line(&tag)).is_none());
    }

    #[test]
    fn truncated_payload_skips_only_that_line() {
        let decoder = EventDecoder::new(Arc::new(default_registry()));
        let mut truncated = collect_payload();
        truncated.truncate(truncated.len() - 4);
        let logs = vec![line(&truncated), line(&collect_payload())];

        let (events, errors) = decoder.scan_logs(&logs);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].log_index, 1);
        assert!(matches!(errors.as_slice(), [DecodeError::BinaryReader(_)]));
    }

    #[test]
    fn unregistered_tags_and_plain_logs_are_not_errors() {
        let decoder = EventDecoder::new(Arc::new(default_registry()));
        let mut unknown = discriminator("event", "SomethingElse").to_vec();
        unknown.extend_from_slice(&[0u8; 16]);
        let logs = vec![
            "Program log: Instruction: Swap".to_string(),
            line(&unknown),
            format!("{PROGRAM_DATA_PREFIX}%%%"),
        ];

        let (events, errors) = decoder.scan_logs(&logs);
        assert!(events.is_empty());
        assert!(matches!(errors.as_slice(), [DecodeError::Base64(_)]));
    }
}
