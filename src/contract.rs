use colored::*;
use log::*;

use alloy::{
    primitives::{Address, B256, Bytes, FixedBytes, hex},
    providers::{DynProvider, Provider},
    sol_types::{SolCall, SolEvent},
};

use crate::{
    deposit::DepositArgs,
    error::{Error, Result},
};

// https://github.com/ethereum/consensus-specs/blob/dev/solidity_deposit_contract/deposit_contract.sol
alloy::sol! {
    #[sol(rpc)]
    #[derive(Debug, PartialEq)]
    interface IDepositContract {
        /// @notice A processed deposit event.
        event DepositEvent(
            bytes pubkey,
            bytes withdrawal_credentials,
            bytes amount,
            bytes signature,
            bytes index
        );

        /// @notice Submit a Phase 0 DepositData object.
        function deposit(
            bytes calldata pubkey,
            bytes calldata withdrawal_credentials,
            bytes calldata signature,
            bytes32 deposit_data_root
        ) external payable;

        /// @notice Query the current deposit root hash.
        function get_deposit_root() external view returns (bytes32);

        /// @notice Query the current deposit count, little endian u64.
        function get_deposit_count() external view returns (bytes memory);

        function supportsInterface(bytes4 interfaceId) external pure returns (bool);
    }
}

// Batching contracts forward `msg.value / n` to the deposit contract per record
alloy::sol! {
    #[sol(rpc)]
    #[derive(Debug, PartialEq)]
    interface IBatchDeposit {
        function batchDeposit(
            bytes[] calldata pubkeys,
            bytes[] calldata withdrawal_credentials,
            bytes[] calldata signatures,
            bytes32[] calldata deposit_data_roots
        ) external payable;
    }
}

const ERC165_INTERFACE_ID: [u8; 4] = [0x01, 0xff, 0xc9, 0xa7];

/// Which of the two contract shapes a binding talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Variant {
    /// `batchDeposit` taking four parallel arrays, 32 eth per record
    #[default]
    Batch,
    /// The canonical deposit contract, one record per transaction
    Single,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Variant::Batch => write!(f, "batch"),
            Variant::Single => write!(f, "single"),
        }
    }
}

/// Static description of the entry points a variant exposes, as
/// (signature, selector) pairs
pub fn interface(variant: Variant) -> Vec<(&'static str, [u8; 4])> {
    match variant {
        Variant::Batch => vec![(
            IBatchDeposit::batchDepositCall::SIGNATURE,
            IBatchDeposit::batchDepositCall::SELECTOR,
        )],
        Variant::Single => vec![
            (
                IDepositContract::depositCall::SIGNATURE,
                IDepositContract::depositCall::SELECTOR,
            ),
            (
                IDepositContract::get_deposit_rootCall::SIGNATURE,
                IDepositContract::get_deposit_rootCall::SELECTOR,
            ),
            (
                IDepositContract::get_deposit_countCall::SIGNATURE,
                IDepositContract::get_deposit_countCall::SELECTOR,
            ),
            (
                IDepositContract::supportsInterfaceCall::SIGNATURE,
                IDepositContract::supportsInterfaceCall::SELECTOR,
            ),
        ],
    }
}

pub fn print_interface(variant: Variant) {
    println!("[{}]", variant.to_string().to_uppercase().magenta().bold());
    interface(variant).iter().for_each(|(signature, selector)| {
        println!(
            "    {} {}",
            format!("0x{}", hex::encode(selector)).yellow(),
            signature.white().bold()
        );
    });
    if variant == Variant::Single {
        println!(
            "    {} {}",
            "event".magenta(),
            IDepositContract::DepositEvent::SIGNATURE.white().bold()
        );
    }
}

/// A callable proxy over the provider for one deposit contract
pub enum ContractBinding {
    Batch(IBatchDeposit::IBatchDepositInstance<DynProvider>),
    Single(IDepositContract::IDepositContractInstance<DynProvider>),
}

impl ContractBinding {
    /// Only the address format is checked, a wrong contract surfaces
    /// as a provider error once called
    pub fn new(provider: DynProvider, address: &str, variant: Variant) -> Result<Self> {
        let address = address
            .trim()
            .parse::<Address>()
            .map_err(|e| Error::Binding(format!("invalid address '{}': {}", address, e)))?;
        Ok(Self::at(provider, address, variant))
    }

    pub fn at(provider: DynProvider, address: Address, variant: Variant) -> Self {
        debug!(
            "Binding {} contract at {}",
            variant.to_string().magenta(),
            address.to_string().blue()
        );
        match variant {
            Variant::Batch => ContractBinding::Batch(IBatchDeposit::new(address, provider)),
            Variant::Single => ContractBinding::Single(IDepositContract::new(address, provider)),
        }
    }

    pub fn address(&self) -> Address {
        match self {
            ContractBinding::Batch(c) => *c.address(),
            ContractBinding::Single(c) => *c.address(),
        }
    }

    pub fn variant(&self) -> Variant {
        match self {
            ContractBinding::Batch(_) => Variant::Batch,
            ContractBinding::Single(_) => Variant::Single,
        }
    }

    fn provider(&self) -> &DynProvider {
        match self {
            ContractBinding::Batch(c) => c.provider(),
            ContractBinding::Single(c) => c.provider(),
        }
    }

    /// Encode the deposit call for `args`, the single variant takes
    /// exactly one record
    pub fn encode(&self, args: &DepositArgs) -> Result<Bytes> {
        match self {
            ContractBinding::Batch(c) => Ok(c
                .batchDeposit(
                    args.pubkeys.clone(),
                    args.withdrawal_credentials.clone(),
                    args.signatures.clone(),
                    args.deposit_data_roots.clone(),
                )
                .calldata()
                .clone()),
            ContractBinding::Single(c) => match args.pubkeys.len() {
                1 => Ok(c
                    .deposit(
                        args.pubkeys[0].clone(),
                        args.withdrawal_credentials[0].clone(),
                        args.signatures[0].clone(),
                        args.deposit_data_roots[0],
                    )
                    .calldata()
                    .clone()),
                n => Err(Error::RecordCount(n)),
            },
        }
    }

    pub async fn is_deployed(&self) -> Result<bool> {
        let code = self
            .provider()
            .get_code_at(self.address())
            .await
            .map_err(Error::submission("eth_getCode failed"))?;
        Ok(!code.is_empty())
    }

    fn single(&self) -> Result<&IDepositContract::IDepositContractInstance<DynProvider>> {
        match self {
            ContractBinding::Single(c) => Ok(c),
            ContractBinding::Batch(_) => Err(Error::Binding(
                "not a deposit contract binding (single variant)".to_string(),
            )),
        }
    }

    pub async fn deposit_count(&self) -> Result<u64> {
        let count = self.single()?.get_deposit_count().call().await?;
        let bytes: [u8; 8] = count.as_ref().try_into().map_err(|_| {
            Error::Binding(format!("unexpected deposit count encoding: {}", count))
        })?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub async fn deposit_root(&self) -> Result<B256> {
        Ok(self.single()?.get_deposit_root().call().await?)
    }

    pub async fn supports_erc165(&self) -> Result<bool> {
        Ok(self
            .single()?
            .supportsInterface(FixedBytes::from(ERC165_INTERFACE_ID))
            .call()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{deposit, testing};
    use alloy::{primitives::U256, sol_types::SolValue};

    fn args(n: u8) -> DepositArgs {
        let mut args = DepositArgs::default();
        for i in 0..n {
            args.pubkeys.push(Bytes::from(vec![i; 48]));
            args.withdrawal_credentials.push(Bytes::from(vec![i; 32]));
            args.signatures.push(Bytes::from(vec![i; 96]));
            args.deposit_data_roots.push(B256::repeat_byte(i));
        }
        args
    }

    #[test]
    fn interface_selectors() {
        let single = interface(Variant::Single);
        assert_eq!(single[0].0, "deposit(bytes,bytes,bytes,bytes32)");
        assert_eq!(hex::encode(single[0].1), "22895118");
        assert_eq!(single[3].1, ERC165_INTERFACE_ID, "supportsInterface selector");
        let batch = interface(Variant::Batch);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].0, "batchDeposit(bytes[],bytes[],bytes[],bytes32[])");
    }

    #[test]
    fn binding_rejects_malformed_address() {
        let (provider, _asserter) = testing::mocked_provider();
        assert!(matches!(
            ContractBinding::new(provider.clone(), "0x1234", Variant::Batch),
            Err(Error::Binding(_))
        ));
        let binding = ContractBinding::new(
            provider,
            " 0x4242424242424242424242424242424242424242 ",
            Variant::Single,
        )
        .unwrap();
        assert_eq!(binding.address(), Address::repeat_byte(0x42));
        assert_eq!(binding.variant(), Variant::Single);
    }

    #[test]
    fn batch_calldata_keeps_record_order() {
        let (provider, _asserter) = testing::mocked_provider();
        let binding = ContractBinding::at(provider, Address::repeat_byte(1), Variant::Batch);
        let args = args(3);
        let data = binding.encode(&args).unwrap();
        assert_eq!(data[..4], IBatchDeposit::batchDepositCall::SELECTOR);
        let call = IBatchDeposit::batchDepositCall::abi_decode(&data).unwrap();
        assert_eq!(call.pubkeys, args.pubkeys);
        assert_eq!(call.withdrawal_credentials, args.withdrawal_credentials);
        assert_eq!(call.signatures, args.signatures);
        assert_eq!(call.deposit_data_roots, args.deposit_data_roots);
    }

    #[test]
    fn single_calldata_takes_one_record() {
        let (provider, _asserter) = testing::mocked_provider();
        let binding = ContractBinding::at(provider, Address::repeat_byte(1), Variant::Single);
        assert!(matches!(binding.encode(&args(2)), Err(Error::RecordCount(2))));

        let args = args(1);
        let data = binding.encode(&args).unwrap();
        let call = IDepositContract::depositCall::abi_decode(&data).unwrap();
        assert_eq!(call.pubkey, args.pubkeys[0]);
        assert_eq!(call.deposit_data_root, args.deposit_data_roots[0]);
    }

    #[test]
    fn empty_batch_still_encodes() {
        let (provider, _asserter) = testing::mocked_provider();
        let binding = ContractBinding::at(provider, Address::repeat_byte(1), Variant::Batch);
        let batch = deposit::prepare("[]").unwrap();
        assert_eq!(batch.value, U256::ZERO);
        let data = binding.encode(&batch.call_args().unwrap()).unwrap();
        let call = IBatchDeposit::batchDepositCall::abi_decode(&data).unwrap();
        assert!(call.pubkeys.is_empty());
    }

    #[tokio::test]
    async fn reads_deposit_count_little_endian() {
        let (provider, asserter) = testing::mocked_provider();
        let binding = ContractBinding::at(provider, Address::repeat_byte(1), Variant::Single);
        // ABI encoded `bytes` holding 8 little endian bytes (count = 5)
        let count = Bytes::from(vec![5u8, 0, 0, 0, 0, 0, 0, 0]);
        asserter.push_success(&Bytes::from(count.abi_encode()));
        assert_eq!(binding.deposit_count().await.unwrap(), 5);

        let batch = ContractBinding::at(
            testing::mocked_provider().0,
            Address::repeat_byte(1),
            Variant::Batch,
        );
        assert!(matches!(batch.deposit_root().await, Err(Error::Binding(_))));
    }

    #[tokio::test]
    async fn detects_missing_code() {
        let (provider, asserter) = testing::mocked_provider();
        let binding = ContractBinding::at(provider, Address::repeat_byte(1), Variant::Batch);
        asserter.push_success(&Bytes::new());
        assert!(!binding.is_deployed().await.unwrap());
        asserter.push_success(&Bytes::from(vec![0x60, 0x80]));
        assert!(binding.is_deployed().await.unwrap());
    }
}
