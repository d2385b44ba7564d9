use alloy::transports::TransportError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure a deposit operation can report, one variant per stage so
/// callers can tell a bad input from a rejected transaction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no wallet provider configured (missing --rpc-url)")]
    ProviderAbsent,

    #[error("no active account (wallet authorization missing or denied)")]
    NoAccount,

    #[error("malformed deposit JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("deposit JSON must be an array of deposit records")]
    NotAnArray,

    #[error("deposit record #{index}: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("deposit record #{index}: invalid {field}: {reason}")]
    InvalidField {
        index: usize,
        field: &'static str,
        reason: String,
    },

    #[error("refusing to submit an empty deposit batch")]
    EmptyBatch,

    #[error("single deposit expects exactly one record, got {0}")]
    RecordCount(usize),

    #[error("contract binding: {0}")]
    Binding(String),

    #[error("{context}: {source}")]
    Submission {
        context: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("waiting for confirmation: {0}")]
    Pending(#[from] alloy::providers::PendingTransactionError),

    #[error("transaction {0} reverted")]
    Reverted(alloy::primitives::TxHash),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn submission(context: &'static str) -> impl FnOnce(TransportError) -> Self {
        move |source| Error::Submission { context, source }
    }

    pub(crate) fn field(index: usize, field: &'static str, reason: impl ToString) -> Self {
        Error::InvalidField {
            index,
            field,
            reason: reason.to_string(),
        }
    }
}
