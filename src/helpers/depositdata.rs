use alloy::primitives::{B256, FixedBytes};
use tree_hash::TreeHash;

/// Phase 0 `DepositData` SSZ container, the message whose hash tree root the
/// deposit contract expects as `deposit_data_root`
#[derive(Debug, tree_hash_derive::TreeHash, serde::Serialize)]
pub struct DepositData {
    /// Validator public key
    pub pubkey: FixedBytes<48>,
    /// Withdrawal credentials
    pub withdrawal_credentials: B256,
    /// Amount of ether deposited in gwei
    #[serde(with = "serde_utils::quoted_u64")]
    pub amount: u64,
    /// Deposit signature
    pub signature: FixedBytes<96>,
}

impl DepositData {
    pub fn root(&self) -> B256 {
        B256::from(self.tree_hash_root().0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_depends_on_amount() {
        let mut data = DepositData {
            pubkey: FixedBytes::repeat_byte(0x11),
            withdrawal_credentials: B256::repeat_byte(0x22),
            amount: 32_000_000_000,
            signature: FixedBytes::repeat_byte(0x33),
        };
        let root = data.root();
        assert_eq!(root, data.root(), "root is not deterministic");
        data.amount = 1_000_000_000;
        assert_ne!(root, data.root(), "amount ignored by root");
    }

    #[test]
    fn amount_serializes_quoted() {
        let data = DepositData {
            pubkey: FixedBytes::ZERO,
            withdrawal_credentials: B256::ZERO,
            amount: 32_000_000_000,
            signature: FixedBytes::ZERO,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["amount"], "32000000000");
    }
}
