use alloy::primitives::Address;
use log::*;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::macros::parse_address;

#[derive(Debug, Clone)]
pub struct ChainData {
    pub id: u64,
    pub name: &'static str,
    pub deposit_contract: Address,
}

pub fn chain(chain_id: u64) -> &'static ChainData {
    let chain = match CHAINDATA.get(&chain_id) {
        Some(cd) => cd,
        None => &CHAIN_UNKNOWN,
    };
    trace!("{:#?}", chain);
    chain
}

pub fn unknown() -> &'static ChainData {
    &CHAIN_UNKNOWN
}

static CHAINDATA: Lazy<HashMap<u64, ChainData>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(1, CHAIN_ETH_MAINNET.clone());
    m.insert(17000, CHAIN_ETH_HOLESKY.clone());
    m.insert(560048, CHAIN_ETH_HOODI.clone());
    m
});

static CHAIN_UNKNOWN: Lazy<ChainData> = Lazy::new(|| ChainData {
    id: 0,
    name: "unknown",
    deposit_contract: Address::ZERO,
});

static CHAIN_ETH_MAINNET: Lazy<ChainData> = Lazy::new(|| ChainData {
    id: 1,
    name: "mainnet",
    deposit_contract: parse_address!("0x00000000219ab540356cBB839Cbe05303d7705Fa"),
});

static CHAIN_ETH_HOLESKY: Lazy<ChainData> = Lazy::new(|| ChainData {
    id: 17000,
    name: "holesky",
    deposit_contract: parse_address!("0x4242424242424242424242424242424242424242"),
});

static CHAIN_ETH_HOODI: Lazy<ChainData> = Lazy::new(|| ChainData {
    id: 560048,
    name: "hoodi",
    deposit_contract: parse_address!("0x00000000219ab540356cBB839Cbe05303d7705Fa"),
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_chains() {
        assert_eq!(chain(1).name, "mainnet");
        assert_eq!(
            chain(17000).deposit_contract,
            Address::repeat_byte(0x42),
            "holesky deposit contract"
        );
        assert_eq!(chain(1337).id, 0);
        assert_eq!(chain(1337).deposit_contract, Address::ZERO);
    }
}
