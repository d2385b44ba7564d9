use alloy::providers::{DynProvider, Provider, ProviderBuilder, mock::Asserter};

/// Provider answering from a queue of canned JSON-RPC responses, no fillers
/// so every request the code under test makes is one pushed response
pub(crate) fn mocked_provider() -> (DynProvider, Asserter) {
    let asserter = Asserter::new();
    let provider = ProviderBuilder::new()
        .disable_recommended_fillers()
        .connect_mocked_client(asserter.clone())
        .erased();
    (provider, asserter)
}
