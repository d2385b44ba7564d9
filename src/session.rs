use colored::*;
use log::*;
use std::path::PathBuf;

use alloy::{
    network::EthereumWallet,
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
};

use crate::{
    chain::{self, ChainData},
    contract::{ContractBinding, Variant},
    error::{Error, Result},
    helpers,
};

// EIP-1193 provider error codes
const USER_REJECTED_REQUEST: i64 = 4001;
const METHOD_NOT_FOUND: i64 = -32601;

/// How to reach the wallet: a JSON-RPC endpoint, optionally with a local
/// keystore signing on top of it
#[derive(Debug, Clone, Default)]
pub struct WalletOpts {
    pub rpc_url: Option<String>,
    pub keystore: Option<PathBuf>,
    pub password: Option<String>,
}

/// Provider, active account and contract binding of the current session.
/// Owned by the caller and passed down, every field stays unset when the
/// wallet is unavailable.
pub struct Session {
    rpc_url: Option<String>,
    provider: Option<DynProvider>,
    signer: Option<PrivateKeySigner>,
    account: Option<Address>,
    chain_id: u64,
    chain: &'static ChainData,
    contract: Option<ContractBinding>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            rpc_url: None,
            provider: None,
            signer: None,
            account: None,
            chain_id: 0,
            chain: chain::unknown(),
            contract: None,
        }
    }
}

impl Session {
    /// Detect the wallet, request authorization and select the first
    /// authorized account. Never fails: an absent wallet or a denied request
    /// leaves the session without provider or account.
    pub async fn connect(opts: &WalletOpts) -> Session {
        let rpc_url = match &opts.rpc_url {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => {
                warn!("{}", "No wallet provider detected (set --rpc-url)".yellow());
                return Session::default();
            }
        };

        let (signer, locked) = match &opts.keystore {
            Some(keystore) => match unlock_keystore(keystore, &opts.password) {
                Ok(signer) => (Some(signer), false),
                Err(e) => {
                    error!("{}", e);
                    (None, true)
                }
            },
            None => (None, false),
        };

        let provider = match &signer {
            Some(signer) => ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer.clone()))
                .connect(&rpc_url)
                .await
                .map(|p| p.erased()),
            None => ProviderBuilder::new()
                .connect(&rpc_url)
                .await
                .map(|p| p.erased()),
        };
        let provider = match provider {
            Ok(provider) => provider,
            Err(e) => {
                error!("Connect failed to '{}': {}", rpc_url, e);
                return Session::default();
            }
        };

        // A keystore that stays locked keeps the provider but yields no account,
        // the node's own accounts must not stand in for it
        let mut session = Session::attach(provider, signer, !locked).await;
        session.rpc_url = Some(rpc_url);
        session
    }

    pub async fn with_provider(provider: DynProvider, signer: Option<PrivateKeySigner>) -> Session {
        Session::attach(provider, signer, true).await
    }

    async fn attach(
        provider: DynProvider,
        signer: Option<PrivateKeySigner>,
        authorize: bool,
    ) -> Session {
        let account = match (&signer, authorize) {
            (Some(signer), _) => Some(signer.address()),
            (None, true) => request_account(&provider).await,
            (None, false) => None,
        };

        let chain_id = match provider.get_chain_id().await {
            Ok(chain_id) => chain_id,
            Err(e) => {
                warn!("Unable to read chain id: {}", e);
                0
            }
        };
        let chain = chain::chain(chain_id);

        debug!(
            "Connected to {} {}:{} {}:{}",
            chain.name.green().bold(),
            "chainId".white().bold(),
            chain_id.to_string().blue(),
            "account".white().bold(),
            account
                .map(|a| a.to_string())
                .unwrap_or("<none>".to_string())
                .blue(),
        );

        Session {
            rpc_url: None,
            provider: Some(provider),
            signer,
            account,
            chain_id,
            chain,
            contract: None,
        }
    }

    /// Reconnect with new wallet options. A batch binding keeps its address
    /// on the new provider, a deposit contract binding is resolved again
    /// against the new chain.
    pub async fn reconnect(&mut self, opts: &WalletOpts) {
        let previous = self.contract.as_ref().map(|c| (c.address(), c.variant()));
        *self = Session::connect(opts).await;
        let Some(provider) = self.provider.clone() else {
            return;
        };
        match previous {
            Some((address, Variant::Batch)) => {
                self.contract = Some(ContractBinding::at(provider, address, Variant::Batch));
            }
            Some((_, Variant::Single)) => {
                if let Err(e) = self.bind(None, Variant::Single) {
                    warn!("{}", e);
                }
            }
            None => {}
        }
    }

    pub fn is_connected(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider(&self) -> Result<&DynProvider> {
        self.provider.as_ref().ok_or(Error::ProviderAbsent)
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn active_account(&self) -> Result<Address> {
        self.account.ok_or(Error::NoAccount)
    }

    pub fn signer(&self) -> Option<&PrivateKeySigner> {
        self.signer.as_ref()
    }

    pub fn rpc_url(&self) -> Option<&str> {
        self.rpc_url.as_deref()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn chain(&self) -> &'static ChainData {
        self.chain
    }

    /// Bind the deposit contract at `address`, falling back to the current
    /// batch binding (batch) or the chain's deposit contract (single)
    pub fn bind(&mut self, address: Option<&str>, variant: Variant) -> Result<&ContractBinding> {
        let provider = self.provider()?.clone();
        let binding = match address {
            Some(address) => ContractBinding::new(provider, address, variant)?,
            None => ContractBinding::at(provider, self.default_address(variant)?, variant),
        };
        let binding: &ContractBinding = self.contract.insert(binding);
        Ok(binding)
    }

    fn default_address(&self, variant: Variant) -> Result<Address> {
        match variant {
            Variant::Single => match self.chain.deposit_contract {
                Address::ZERO => Err(Error::Binding(format!(
                    "no known deposit contract for chain id {}, use --contract",
                    self.chain_id
                ))),
                address => Ok(address),
            },
            Variant::Batch => match &self.contract {
                Some(contract) if contract.variant() == Variant::Batch => Ok(contract.address()),
                _ => Err(Error::Binding(
                    "no batch deposit contract address, use --contract".to_string(),
                )),
            },
        }
    }

    pub fn contract(&self) -> Result<&ContractBinding> {
        self.contract
            .as_ref()
            .ok_or_else(|| Error::Binding("no contract bound".to_string()))
    }

    pub fn sprintf(&self) -> String {
        let align = 16;
        let mut pretty = String::default();
        macro_rules! push_field {
            ($s:expr, $v: expr, $c: ident) => {
                pretty.push_str(
                    format!(
                        "    {:align$}{}\n",
                        format!("{}:", $s).white().bold(),
                        format!("{}", $v).$c(),
                    )
                    .as_str(),
                );
            };
        }
        push_field!(
            "provider",
            self.rpc_url().unwrap_or("<not connected>"),
            green
        );
        push_field!(
            "chain",
            format!("{} ({})", self.chain.name, self.chain_id),
            white
        );
        push_field!(
            "wallet",
            match self.signer {
                Some(_) => "keystore",
                None => "provider",
            },
            magenta
        );
        push_field!(
            "account",
            self.account
                .map(|a| a.to_string())
                .unwrap_or("<none>".to_string()),
            blue
        );
        if let Some(contract) = &self.contract {
            push_field!(
                "contract",
                format!("{} [{}]", contract.address(), contract.variant()),
                yellow
            );
        }
        pretty
    }
}

/// Ask the wallet for authorization, then read the authorized accounts.
/// Endpoints without `eth_requestAccounts` go straight to `eth_accounts`.
async fn request_account(provider: &DynProvider) -> Option<Address> {
    match provider
        .raw_request::<_, Vec<Address>>("eth_requestAccounts".into(), ())
        .await
    {
        Ok(_) => {}
        Err(e) => match e.as_error_resp().map(|payload| payload.code) {
            Some(METHOD_NOT_FOUND) => {
                debug!("eth_requestAccounts unsupported, reading eth_accounts");
            }
            Some(USER_REJECTED_REQUEST) => {
                warn!("{}", "Wallet authorization denied".yellow());
                return None;
            }
            _ => {
                error!("Wallet authorization failed: {}", e);
                return None;
            }
        },
    }

    match provider.get_accounts().await {
        Ok(accounts) => match accounts.first() {
            Some(account) => Some(*account),
            None => {
                warn!("{}", "Wallet has no authorized accounts".yellow());
                None
            }
        },
        Err(e) => {
            error!("eth_accounts failed: {}", e);
            None
        }
    }
}

fn unlock_keystore(keystore: &PathBuf, password: &Option<String>) -> Result<PrivateKeySigner> {
    let keypath = helpers::expand_path(keystore).map_err(|e| Error::Signing(e.to_string()))?;
    let password = match password {
        Some(password) => password.clone(),
        None => helpers::reedline::read_password(
            format!("Please provide the password for keystore {}.\n", keypath.display()).as_str(),
        )
        .map_err(|e| Error::Signing(format!("keystore password: {}", e)))?,
    };
    let signer = PrivateKeySigner::decrypt_keystore(&keypath, password)
        .map_err(|e| Error::Signing(format!("{}: {}", keypath.display(), e)))?;
    debug!("unlocked address: {}", signer.address().to_string().blue());
    Ok(signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use alloy::{primitives::U64, rpc::json_rpc::ErrorPayload};

    fn error_payload(code: i64, message: &'static str) -> ErrorPayload {
        ErrorPayload {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[tokio::test]
    async fn absent_provider_leaves_session_unset() {
        let mut session = Session::connect(&WalletOpts::default()).await;
        assert!(!session.is_connected());
        assert_eq!(session.account(), None);
        assert!(matches!(session.active_account(), Err(Error::NoAccount)));
        assert!(matches!(
            session.bind(Some("0x4242424242424242424242424242424242424242"), Variant::Batch),
            Err(Error::ProviderAbsent)
        ));
        assert!(session.contract().is_err(), "binding attempted without provider");

        let blank = WalletOpts {
            rpc_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!Session::connect(&blank).await.is_connected());
    }

    #[tokio::test]
    async fn selects_first_authorized_account() {
        let (provider, asserter) = testing::mocked_provider();
        let accounts = vec![Address::repeat_byte(0xaa), Address::repeat_byte(0xbb)];
        asserter.push_success(&accounts);
        asserter.push_success(&accounts);
        asserter.push_success(&U64::from(1));

        let mut session = Session::with_provider(provider, None).await;
        assert_eq!(session.account(), Some(Address::repeat_byte(0xaa)));
        assert_eq!(session.chain().name, "mainnet");

        // Single variant falls back to the chain's deposit contract
        let binding = session.bind(None, Variant::Single).unwrap();
        assert_eq!(binding.address(), chain::chain(1).deposit_contract);
        // No batch contract is known
        assert!(matches!(
            session.bind(None, Variant::Batch),
            Err(Error::Binding(_))
        ));
        let binding = session
            .bind(Some("0x1111111111111111111111111111111111111111"), Variant::Batch)
            .unwrap();
        assert_eq!(binding.variant(), Variant::Batch);
        assert_eq!(
            session.bind(None, Variant::Batch).unwrap().address(),
            Address::repeat_byte(0x11)
        );
    }

    #[tokio::test]
    async fn denied_authorization_means_no_account() {
        let (provider, asserter) = testing::mocked_provider();
        asserter.push_failure(error_payload(USER_REJECTED_REQUEST, "User rejected the request."));
        asserter.push_success(&U64::from(17000));

        let session = Session::with_provider(provider, None).await;
        assert!(session.is_connected());
        assert_eq!(session.account(), None);
        assert_eq!(session.chain().name, "holesky");
    }

    #[tokio::test]
    async fn falls_back_to_eth_accounts() {
        let (provider, asserter) = testing::mocked_provider();
        asserter.push_failure(error_payload(METHOD_NOT_FOUND, "Method not found"));
        asserter.push_success(&vec![Address::repeat_byte(0xcc)]);
        asserter.push_success(&U64::from(1337));

        let session = Session::with_provider(provider, None).await;
        assert_eq!(session.account(), Some(Address::repeat_byte(0xcc)));
        assert_eq!(session.chain_id(), 1337);
        assert_eq!(session.chain().name, "unknown");
    }

    #[tokio::test]
    async fn empty_account_list() {
        let (provider, asserter) = testing::mocked_provider();
        asserter.push_success(&Vec::<Address>::new());
        asserter.push_success(&Vec::<Address>::new());
        asserter.push_success(&U64::from(1));

        let session = Session::with_provider(provider, None).await;
        assert!(matches!(session.active_account(), Err(Error::NoAccount)));
    }

    #[tokio::test]
    async fn keystore_signer_is_the_active_account() {
        let (provider, asserter) = testing::mocked_provider();
        let signer = PrivateKeySigner::from_slice(&[0x11; 32]).unwrap();
        let address = signer.address();
        asserter.push_success(&U64::from(560048));

        let session = Session::with_provider(provider, Some(signer)).await;
        assert_eq!(session.account(), Some(address));
        assert!(session.signer().is_some());
        assert_eq!(session.chain().name, "hoodi");
    }

    const UNREACHABLE: &str = "http://127.0.0.1:9";

    async fn session_on(chain_id: u64) -> Session {
        let (provider, asserter) = testing::mocked_provider();
        let accounts = vec![Address::repeat_byte(0xaa)];
        asserter.push_success(&accounts);
        asserter.push_success(&accounts);
        asserter.push_success(&U64::from(chain_id));
        Session::with_provider(provider, None).await
    }

    fn unreachable() -> WalletOpts {
        WalletOpts {
            rpc_url: Some(UNREACHABLE.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn deposit_contract_ignores_previous_binding() {
        let mut session = session_on(1).await;
        session
            .bind(Some("0x9999999999999999999999999999999999999999"), Variant::Single)
            .unwrap();
        assert_eq!(
            session.bind(None, Variant::Single).unwrap().address(),
            chain::chain(1).deposit_contract
        );
    }

    #[tokio::test]
    async fn malformed_address_keeps_binding() {
        let mut session = session_on(1).await;
        session
            .bind(Some("0x1111111111111111111111111111111111111111"), Variant::Batch)
            .unwrap();
        assert!(session.bind(Some("not-an-address"), Variant::Batch).is_err());
        assert_eq!(
            session.contract().unwrap().address(),
            Address::repeat_byte(0x11)
        );
    }

    #[tokio::test]
    async fn reconnect_resolves_deposit_contract_for_new_chain() {
        let mut session = session_on(17000).await;
        assert_eq!(
            session.bind(None, Variant::Single).unwrap().address(),
            chain::chain(17000).deposit_contract
        );

        // Unreachable endpoint: connected, chain unknown
        session.reconnect(&unreachable()).await;
        assert!(session.is_connected());
        assert_eq!(session.rpc_url(), Some(UNREACHABLE));
        assert_eq!(session.chain_id(), 0);
        assert!(session.contract().is_err());
        assert!(matches!(
            session.bind(None, Variant::Single),
            Err(Error::Binding(_))
        ));
    }

    #[tokio::test]
    async fn reconnect_keeps_batch_contract() {
        let mut session = session_on(1).await;
        session
            .bind(Some("0x1111111111111111111111111111111111111111"), Variant::Batch)
            .unwrap();

        session.reconnect(&unreachable()).await;
        let binding = session.contract().unwrap();
        assert_eq!(binding.variant(), Variant::Batch);
        assert_eq!(binding.address(), Address::repeat_byte(0x11));
    }

    #[tokio::test]
    async fn locked_keystore_keeps_provider() {
        let opts = WalletOpts {
            keystore: Some(PathBuf::from("/nonexistent/keystore.json")),
            password: Some("secret".to_string()),
            ..unreachable()
        };
        let session = Session::connect(&opts).await;
        assert!(session.is_connected());
        assert!(session.signer().is_none());
        assert!(matches!(session.active_account(), Err(Error::NoAccount)));
    }

    #[test]
    fn missing_keystore_is_a_signing_error() {
        let password = Some("secret".to_string());
        assert!(matches!(
            unlock_keystore(&PathBuf::from("/nonexistent/keystore.json"), &password),
            Err(Error::Signing(_))
        ));
    }
}
