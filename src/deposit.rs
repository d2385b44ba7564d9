use colored::*;
use log::*;
use serde_derive::Deserialize;
use serde_json::Value;

use alloy::primitives::{
    B256, Bytes, FixedBytes, U256, hex,
    utils::{Unit, format_ether},
};

use crate::{
    error::{Error, Result},
    helpers::depositdata::DepositData,
};

/// Every batched record attaches exactly this much ether
pub const DEPOSIT_AMOUNT_ETH: u64 = 32;
pub const DEPOSIT_AMOUNT_GWEI: u64 = DEPOSIT_AMOUNT_ETH * 1_000_000_000;

/// A single validator deposit as found in `deposit_data-*.json`, extra
/// fields written by the deposit cli (`fork_version`, `network_name`, ...)
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepositRecord {
    pub pubkey: String,
    pub withdrawal_credentials: String,
    pub signature: String,
    pub deposit_data_root: String,
    /// Deposit amount in gwei, only used for verification
    #[serde(default)]
    pub amount: Option<u64>,
}

impl DepositRecord {
    pub fn normalized(&self) -> Self {
        Self {
            pubkey: normalize_hex(&self.pubkey),
            withdrawal_credentials: normalize_hex(&self.withdrawal_credentials),
            signature: normalize_hex(&self.signature),
            deposit_data_root: normalize_hex(&self.deposit_data_root),
            amount: self.amount,
        }
    }
}

/// Prefix with "0x" unless already there
pub fn normalize_hex(value: &str) -> String {
    match value.starts_with("0x") {
        true => value.to_string(),
        false => format!("0x{value}"),
    }
}

/// Ether attached to a batch of `count` records, in wei
pub fn deposit_value(count: usize) -> U256 {
    U256::from(count) * U256::from(DEPOSIT_AMOUNT_ETH) * Unit::ETHER.wei()
}

/// Decode free text into deposit records, rejecting malformed JSON and
/// records missing a required field before anything else happens
pub fn parse_records(text: &str) -> Result<Vec<DepositRecord>> {
    let value: Value = serde_json::from_str(text).map_err(Error::Json)?;
    let Value::Array(items) = value else {
        return Err(Error::NotAnArray);
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<DepositRecord>(item)
                .map_err(|source| Error::InvalidRecord { index, source })
        })
        .collect()
}

/// Same as `parse_records` but also accepts a bare object, the result must
/// hold exactly one record
pub fn parse_single(text: &str) -> Result<DepositRecord> {
    let value: Value = serde_json::from_str(text).map_err(Error::Json)?;
    let mut records = match value {
        Value::Object(_) => vec![
            serde_json::from_value::<DepositRecord>(value)
                .map_err(|source| Error::InvalidRecord { index: 0, source })?,
        ],
        Value::Array(_) => parse_records(text)?,
        _ => return Err(Error::NotAnArray),
    };
    match records.len() {
        1 => Ok(records.remove(0)),
        n => Err(Error::RecordCount(n)),
    }
}

/// Parse, normalize and lay out `text` as the four parallel arrays the
/// batch deposit call takes. An empty array prepares fine with zero value.
pub fn prepare(text: &str) -> Result<PreparedBatch> {
    let records = parse_records(text)?;
    let batch = PreparedBatch::from_records(&records, deposit_value(records.len()));
    debug!(
        "Prepared {} deposit(s), value: {} eth",
        batch.len().to_string().magenta(),
        format_ether(batch.value).yellow()
    );
    Ok(batch)
}

/// Prepare a single record deposit attaching `value` wei
pub fn prepare_single(text: &str, value: U256) -> Result<PreparedBatch> {
    let record = parse_single(text)?;
    Ok(PreparedBatch::from_records(&[record], value))
}

/// Normalized deposit records laid out column-wise, index `i` of every
/// column belongs to record `i` of the input
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreparedBatch {
    pubkeys: Vec<String>,
    withdrawal_credentials: Vec<String>,
    signatures: Vec<String>,
    deposit_data_roots: Vec<String>,
    amounts: Vec<Option<u64>>,
    pub value: U256,
}

/// Typed ABI arguments decoded from a `PreparedBatch`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DepositArgs {
    pub pubkeys: Vec<Bytes>,
    pub withdrawal_credentials: Vec<Bytes>,
    pub signatures: Vec<Bytes>,
    pub deposit_data_roots: Vec<B256>,
}

impl PreparedBatch {
    pub fn from_records(records: &[DepositRecord], value: U256) -> Self {
        let mut batch = Self {
            value,
            ..Default::default()
        };
        records.iter().for_each(|record| batch.push(record));
        batch
    }

    fn push(&mut self, record: &DepositRecord) {
        let record = record.normalized();
        self.pubkeys.push(record.pubkey);
        self.withdrawal_credentials
            .push(record.withdrawal_credentials);
        self.signatures.push(record.signature);
        self.deposit_data_roots.push(record.deposit_data_root);
        self.amounts.push(record.amount);
    }

    pub fn len(&self) -> usize {
        self.pubkeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pubkeys.is_empty()
    }

    pub fn pubkeys(&self) -> &[String] {
        &self.pubkeys
    }

    pub fn withdrawal_credentials(&self) -> &[String] {
        &self.withdrawal_credentials
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    pub fn deposit_data_roots(&self) -> &[String] {
        &self.deposit_data_roots
    }

    /// Hex decode every column, `deposit_data_root` must be exactly 32 bytes
    pub fn call_args(&self) -> Result<DepositArgs> {
        let mut args = DepositArgs::default();
        for index in 0..self.len() {
            args.pubkeys
                .push(decode(index, "pubkey", &self.pubkeys[index])?);
            args.withdrawal_credentials.push(decode(
                index,
                "withdrawal_credentials",
                &self.withdrawal_credentials[index],
            )?);
            args.signatures
                .push(decode(index, "signature", &self.signatures[index])?);
            let root = decode_fixed::<32>(
                index,
                "deposit_data_root",
                &self.deposit_data_roots[index],
            )?;
            args.deposit_data_roots.push(root);
        }
        Ok(args)
    }

    /// Check every record against what the deposit contract will enforce:
    /// field sizes, a valid BLS pubkey and a `deposit_data_root` matching
    /// the SSZ root of the deposit data for `amount_gwei`
    pub fn verify(&self, amount_gwei: u64) -> Result<()> {
        for index in 0..self.len() {
            let pubkey = decode_fixed::<48>(index, "pubkey", &self.pubkeys[index])?;
            blst::min_pk::PublicKey::key_validate(pubkey.as_slice())
                .map_err(|e| Error::field(index, "pubkey", format!("{:?}", e)))?;
            let withdrawal_credentials = decode_fixed::<32>(
                index,
                "withdrawal_credentials",
                &self.withdrawal_credentials[index],
            )?;
            let signature = decode_fixed::<96>(index, "signature", &self.signatures[index])?;
            let root = decode_fixed::<32>(
                index,
                "deposit_data_root",
                &self.deposit_data_roots[index],
            )?;

            if let Some(amount) = self.amounts[index] {
                if amount != amount_gwei {
                    return Err(Error::field(
                        index,
                        "amount",
                        format!("record amount {amount} gwei, attaching {amount_gwei} gwei"),
                    ));
                }
            }

            let deposit_data = DepositData {
                pubkey,
                withdrawal_credentials,
                amount: amount_gwei,
                signature,
            };
            trace!("{}", serde_json::to_string(&deposit_data).unwrap_or_default());
            let computed = deposit_data.root();
            if computed != root {
                return Err(Error::field(
                    index,
                    "deposit_data_root",
                    format!("expected {}", computed),
                ));
            }
            debug!(
                "Deposit #{} verified: {}",
                index,
                self.pubkeys[index].to_string().blue()
            );
        }
        Ok(())
    }

    pub fn sprintf(&self) -> String {
        let mut pretty = String::default();
        let align = 26;
        macro_rules! push_column {
            ($s:expr, $v:expr, $c:ident) => {
                pretty.push_str(
                    format!(
                        "    {:align$}{}\n",
                        format!("{}:", $s).white().bold(),
                        format!("[{}]", $v.join(", ")).$c(),
                    )
                    .as_str(),
                );
            };
        }
        push_column!("pubkeys", self.pubkeys, blue);
        push_column!("withdrawal_credentials", self.withdrawal_credentials, green);
        push_column!("signatures", self.signatures, normal);
        push_column!("deposit_data_roots", self.deposit_data_roots, magenta);
        pretty.push_str(
            format!(
                "    {:align$}{} ({} wei)\n",
                "value:".white().bold(),
                format!("{} eth", format_ether(self.value)).yellow(),
                self.value,
            )
            .as_str(),
        );
        pretty
    }
}

fn decode(index: usize, field: &'static str, value: &str) -> Result<Bytes> {
    hex::decode(value)
        .map(Bytes::from)
        .map_err(|e| Error::field(index, field, e))
}

fn decode_fixed<const N: usize>(
    index: usize,
    field: &'static str,
    value: &str,
) -> Result<FixedBytes<N>> {
    let bytes = decode(index, field, value)?;
    match bytes.len() == N {
        true => Ok(FixedBytes::<N>::from_slice(&bytes)),
        false => Err(Error::field(
            index,
            field,
            format!("expected {} bytes, got {}", N, bytes.len()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[{"pubkey":"ab","withdrawal_credentials":"0xcd","signature":"ef","deposit_data_root":"01"}]"#;

    fn valid_record_json(amount: Option<u64>) -> (String, B256) {
        let sk = blst::min_pk::SecretKey::key_gen(&[7u8; 32], &[]).unwrap();
        let pubkey = FixedBytes::<48>::from(sk.sk_to_pk().compress());
        let withdrawal_credentials = B256::repeat_byte(0x01);
        let signature = FixedBytes::<96>::repeat_byte(0x42);
        let root = DepositData {
            pubkey,
            withdrawal_credentials,
            amount: DEPOSIT_AMOUNT_GWEI,
            signature,
        }
        .root();
        let mut record = serde_json::json!({
            "pubkey": hex::encode(pubkey),
            "withdrawal_credentials": hex::encode(withdrawal_credentials),
            "signature": hex::encode(signature),
            "deposit_data_root": hex::encode(root),
            "fork_version": "00000000",
            "network_name": "mainnet",
        });
        if let Some(amount) = amount {
            record["amount"] = amount.into();
        }
        (serde_json::json!([record]).to_string(), root)
    }

    #[test]
    fn normalize_is_idempotent() {
        assert_eq!(normalize_hex("ab"), "0xab");
        assert_eq!(normalize_hex("0xab"), "0xab");
        assert_eq!(normalize_hex(&normalize_hex("ab")), normalize_hex("ab"));
        assert_eq!(normalize_hex(""), "0x");
    }

    #[test]
    fn deposit_value_is_32_eth_per_record() {
        assert_eq!(deposit_value(0), U256::ZERO);
        assert_eq!(
            deposit_value(1),
            U256::from(32_000_000_000_000_000_000u128),
            "one record"
        );
        assert_eq!(deposit_value(3), deposit_value(1) * U256::from(3));
    }

    #[test]
    fn prepare_normalizes_sample() {
        let batch = prepare(SAMPLE).unwrap();
        assert_eq!(batch.pubkeys(), ["0xab"]);
        assert_eq!(batch.withdrawal_credentials(), ["0xcd"]);
        assert_eq!(batch.signatures(), ["0xef"]);
        assert_eq!(batch.deposit_data_roots(), ["0x01"]);
        assert_eq!(batch.value, deposit_value(1));
    }

    #[test]
    fn prepare_keeps_index_correspondence() {
        let records: Vec<Value> = (0..5)
            .map(|i| {
                serde_json::json!({
                    "pubkey": format!("{:02x}", i),
                    "withdrawal_credentials": format!("0x{:02x}", i + 16),
                    "signature": format!("{:02x}", i + 32),
                    "deposit_data_root": format!("{:02x}", i + 48),
                })
            })
            .collect();
        let batch = prepare(&Value::Array(records).to_string()).unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.withdrawal_credentials().len(), 5);
        assert_eq!(batch.signatures().len(), 5);
        assert_eq!(batch.deposit_data_roots().len(), 5);
        for i in 0..5 {
            assert_eq!(batch.pubkeys()[i], format!("0x{:02x}", i));
            assert_eq!(batch.withdrawal_credentials()[i], format!("0x{:02x}", i + 16));
            assert_eq!(batch.signatures()[i], format!("0x{:02x}", i + 32));
            assert_eq!(batch.deposit_data_roots()[i], format!("0x{:02x}", i + 48));
        }
        assert_eq!(batch.value, deposit_value(5));
    }

    #[test]
    fn prepare_empty_array() {
        let batch = prepare("[]").unwrap();
        assert!(batch.is_empty());
        assert!(batch.withdrawal_credentials().is_empty());
        assert!(batch.signatures().is_empty());
        assert!(batch.deposit_data_roots().is_empty());
        assert_eq!(batch.value, U256::ZERO);
        assert_eq!(batch.call_args().unwrap(), DepositArgs::default());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(prepare("not json"), Err(Error::Json(_))));
        assert!(matches!(prepare(r#"{"pubkey":"ab"}"#), Err(Error::NotAnArray)));
    }

    #[test]
    fn missing_field_reports_index() {
        let text = r#"[
            {"pubkey":"ab","withdrawal_credentials":"cd","signature":"ef","deposit_data_root":"01"},
            {"pubkey":"ab","withdrawal_credentials":"cd","deposit_data_root":"01"}
        ]"#;
        match prepare(text) {
            Err(Error::InvalidRecord { index, source }) => {
                assert_eq!(index, 1);
                assert!(source.to_string().contains("signature"), "{}", source);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            prepare(r#"[{"pubkey":1,"withdrawal_credentials":"cd","signature":"ef","deposit_data_root":"01"}]"#),
            Err(Error::InvalidRecord { index: 0, .. })
        ));
    }

    #[test]
    fn call_args_require_32_byte_root() {
        let batch = prepare(SAMPLE).unwrap();
        match batch.call_args() {
            Err(Error::InvalidField { index, field, .. }) => {
                assert_eq!(index, 0);
                assert_eq!(field, "deposit_data_root");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let root = "11".repeat(32);
        let text = format!(
            r#"[{{"pubkey":"ab","withdrawal_credentials":"0xcd","signature":"ef","deposit_data_root":"{root}"}}]"#
        );
        let args = prepare(&text).unwrap().call_args().unwrap();
        assert_eq!(args.pubkeys, vec![Bytes::from(vec![0xab])]);
        assert_eq!(args.withdrawal_credentials, vec![Bytes::from(vec![0xcd])]);
        assert_eq!(args.signatures, vec![Bytes::from(vec![0xef])]);
        assert_eq!(args.deposit_data_roots, vec![B256::repeat_byte(0x11)]);
    }

    #[test]
    fn call_args_reject_bad_hex() {
        let text = r#"[{"pubkey":"zz","withdrawal_credentials":"cd","signature":"ef","deposit_data_root":"01"}]"#;
        assert!(matches!(
            prepare(text).unwrap().call_args(),
            Err(Error::InvalidField { field: "pubkey", .. })
        ));
    }

    #[test]
    fn parse_single_accepts_object_or_one_element_array() {
        let object = r#"{"pubkey":"ab","withdrawal_credentials":"cd","signature":"ef","deposit_data_root":"01"}"#;
        let one = parse_single(object).unwrap();
        assert_eq!(one, parse_single(SAMPLE).unwrap());
        assert!(matches!(parse_single("[]"), Err(Error::RecordCount(0))));
        let two = format!("[{object},{object}]");
        assert!(matches!(parse_single(&two), Err(Error::RecordCount(2))));

        let batch = prepare_single(object, Unit::ETHER.wei()).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.value, Unit::ETHER.wei());
    }

    #[test]
    fn verify_accepts_matching_root() {
        let (text, _) = valid_record_json(Some(DEPOSIT_AMOUNT_GWEI));
        let batch = prepare(&text).unwrap();
        batch.verify(DEPOSIT_AMOUNT_GWEI).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_amount_and_root() {
        let (text, _) = valid_record_json(Some(1_000_000_000));
        assert!(matches!(
            prepare(&text).unwrap().verify(DEPOSIT_AMOUNT_GWEI),
            Err(Error::InvalidField { field: "amount", .. })
        ));

        let (text, _) = valid_record_json(None);
        assert!(matches!(
            prepare(&text).unwrap().verify(1_000_000_000),
            Err(Error::InvalidField {
                field: "deposit_data_root",
                ..
            })
        ));
    }

    #[test]
    fn verify_rejects_invalid_pubkey() {
        assert!(matches!(
            prepare(SAMPLE).unwrap().verify(DEPOSIT_AMOUNT_GWEI),
            Err(Error::InvalidField { field: "pubkey", .. })
        ));
    }
}
