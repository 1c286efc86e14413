//! Decode errors for exchange wire records.

use thiserror::Error;

/// Errors raised while decoding a positional wire array into a typed
/// record. Every variant names the offending field so a contract change
/// upstream is diagnosable from the log line alone.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload was not a JSON array.
    #[error("expected a JSON array, got {0}")]
    NotArray(&'static str),

    /// The array carried fewer fields than the record requires.
    #[error("{record}: expected at least {expected} fields, got {actual}")]
    Arity {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A field failed to parse as its expected type.
    #[error("{record}[{index}] ({name}): expected {expected}")]
    Field {
        record: &'static str,
        index: usize,
        name: &'static str,
        expected: &'static str,
    },

    /// A wallet type string outside the known vocabulary.
    #[error("unknown wallet type: {0}")]
    WalletType(String),
}

impl DecodeError {
    pub(crate) fn field(
        record: &'static str,
        index: usize,
        name: &'static str,
        expected: &'static str,
    ) -> Self {
        Self::Field {
            record,
            index,
            name,
            expected,
        }
    }
}
