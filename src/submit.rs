use alloy::{
    consensus::{SignableTransaction, TxEnvelope},
    eips::eip2718::Decodable2718,
    hex,
    network::{TransactionBuilder, TxSigner},
    primitives::{
        Address, Bytes, TxHash, TxKind, U256,
        utils::{format_units, parse_units},
    },
    providers::Provider,
    rpc::types::{TransactionReceipt, TransactionRequest},
};
use colored::*;
use log::*;
use std::{
    io::{Read, Write},
    path::Path,
    time::Duration,
};

use crate::{
    config::TxCommonArgs,
    deposit::PreparedBatch,
    error::{Error, Result},
    format_eth, helpers,
    session::Session,
};

const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Deposit transaction: sender is the active account, recipient the bound
/// contract, value and calldata come from the prepared batch
pub fn build_request(from: Address, to: Address, value: U256, input: Bytes) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(from)
        .with_to(to)
        .with_value(value)
        .with_input(input)
}

fn gwei(amount: f64) -> Result<u128> {
    let wei: U256 = parse_units(&amount.to_string(), "gwei")
        .map_err(|e| Error::InvalidArgument(format!("{} gwei: {}", amount, e)))?
        .into();
    u128::try_from(wei).map_err(|_| Error::InvalidArgument(format!("{} gwei overflows", amount)))
}

fn apply_tx_args(tx: TransactionRequest, tx_args: &TxCommonArgs) -> Result<TransactionRequest> {
    let tx = match tx_args.gas_limit {
        Some(gas_limit) => tx.with_gas_limit(gas_limit),
        None => tx,
    };
    match (tx_args.max_fee, tx_args.max_priority) {
        (Some(max_fee), Some(max_priority)) => {
            let (max_fee, max_priority) = (gwei(max_fee)?, gwei(max_priority)?);
            if max_fee < max_priority {
                return Err(Error::InvalidArgument(format!(
                    "max fee ({}) must not be lower than priority fee ({})",
                    max_fee, max_priority
                )));
            }
            Ok(tx
                .with_max_fee_per_gas(max_fee)
                .with_max_priority_fee_per_gas(max_priority))
        }
        _ => Ok(tx),
    }
}

/// Submit the prepared deposits to the bound contract as one transaction
/// from the active account. Returns the hash reported by the wallet, `None`
/// when nothing was broadcast (dry run, offline signing or cancelled).
/// Failures are reported once, nothing is retried.
pub async fn submit(
    session: &Session,
    batch: &PreparedBatch,
    tx_args: &TxCommonArgs,
) -> Result<Option<TxHash>> {
    session.provider()?;
    let from = session.active_account()?;
    let contract = session.contract()?;
    if batch.is_empty() && !tx_args.allow_empty {
        return Err(Error::EmptyBatch);
    }

    let input = contract.encode(&batch.call_args()?)?;
    let tx = apply_tx_args(
        build_request(from, contract.address(), batch.value, input),
        tx_args,
    )?;
    debug!(
        "{} deposit(s) to {} [{}]",
        batch.len(),
        contract.address(),
        contract.variant()
    );
    send(session, tx, tx_args).await
}

async fn send(
    session: &Session,
    tx: TransactionRequest,
    tx_args: &TxCommonArgs,
) -> Result<Option<TxHash>> {
    let provider = session.provider()?;

    let tx = match tx.gas {
        Some(_) => tx,
        None => {
            let gas_limit = provider
                .estimate_gas(tx.clone())
                .await
                .map_err(Error::submission("gas estimation failed"))?;
            debug!("estimated gas: {}", gas_limit);
            tx.with_gas_limit(gas_limit)
        }
    };

    // Bail early if simulation fails
    provider
        .call(tx.clone())
        .await
        .map_err(Error::submission("transaction simulation failed"))?;

    if tx_args.dry_run {
        println!("{}", sprintf_tx(&tx));
        println!("{}", "Simulation succeeded, transaction not sent.".green());
        return Ok(None);
    }

    if let Some(out) = &tx_args.out {
        sign_offline(session, tx, out).await?;
        return Ok(None);
    }

    if !tx_args.yes && !confirm(&tx) {
        println!("{}", "Transaction cancelled.".yellow());
        return Ok(None);
    }

    let pending = provider
        .send_transaction(tx)
        .await
        .map_err(Error::submission("transaction rejected"))?;
    let tx_hash = *pending.tx_hash();
    info!("Transaction {} sent", tx_hash);
    println!(
        "Transaction {} successfully sent.",
        tx_hash.to_string().red()
    );

    if tx_args.wait {
        println!("Waiting for transaction confirmation...");
        let receipt = pending
            .with_required_confirmations(1)
            .with_timeout(Some(CONFIRMATION_TIMEOUT))
            .get_receipt()
            .await?;
        report_receipt(&receipt)?;
    }
    Ok(Some(tx_hash))
}

/// A reverted receipt is an error carrying the transaction hash
fn report_receipt(receipt: &TransactionReceipt) -> Result<()> {
    match receipt.status() {
        true => {
            println!(
                "Transaction {} confirmed in block {}.",
                receipt.transaction_hash.to_string().red(),
                receipt.block_number.unwrap_or_default().to_string().blue()
            );
            Ok(())
        }
        false => Err(Error::Reverted(receipt.transaction_hash)),
    }
}

fn confirm(tx: &TransactionRequest) -> bool {
    let prompt = format!(
        "\n{}\n{} {} {}\n",
        sprintf_tx(tx),
        "Please type".green(),
        "YES".red().bold(),
        "to confirm sending the transaction, anything else cancels.".green()
    );
    helpers::reedline::confirm(&prompt, "YES").unwrap_or(false)
}

/// Sign with the keystore wallet and write the EIP-2718 envelope as hex
/// instead of broadcasting it
async fn sign_offline(session: &Session, tx: TransactionRequest, out: &str) -> Result<TxHash> {
    let signer = session
        .signer()
        .ok_or_else(|| Error::Signing("offline signing requires a keystore wallet".to_string()))?;
    let provider = session.provider()?;
    // Chain id 0 means the lookup failed
    if session.chain_id() == 0 {
        return Err(Error::Signing(
            "unknown chain id, refusing to sign offline".to_string(),
        ));
    }

    let nonce = match tx.nonce {
        Some(nonce) => nonce,
        None => provider
            .get_transaction_count(signer.address())
            .await
            .map_err(Error::submission("nonce query failed"))?,
    };
    let tx = match (tx.max_fee_per_gas, tx.max_priority_fee_per_gas) {
        (Some(_), Some(_)) => tx,
        _ => {
            let estimation = provider
                .estimate_eip1559_fees()
                .await
                .map_err(Error::submission("fee estimation failed"))?;
            tx.with_max_fee_per_gas(estimation.max_fee_per_gas)
                .with_max_priority_fee_per_gas(estimation.max_priority_fee_per_gas)
        }
    };
    let tx = tx.with_nonce(nonce).with_chain_id(session.chain_id());

    let mut unsigned = tx
        .clone()
        .build_unsigned()
        .map_err(|e| Error::Signing(e.to_string()))?;
    let signature = signer
        .sign_transaction(&mut unsigned)
        .await
        .map_err(|e| Error::Signing(e.to_string()))?;
    let mut buf: Vec<u8> = Vec::new();
    unsigned.into_signed(signature).eip2718_encode(&mut buf);
    let envelope =
        TxEnvelope::decode_2718(&mut buf.as_ref()).map_err(|e| Error::Signing(e.to_string()))?;

    write_raw(out, &buf)?;
    println!("{}", sprintf_tx(&tx));
    println!(
        "\n{} {} {}{}{}",
        "Transaction".white(),
        envelope.hash().to_string().red(),
        "successfully written to \"".white(),
        out.green(),
        "\".".white(),
    );
    Ok(*envelope.hash())
}

fn expand(filepath: &str) -> Result<std::path::PathBuf> {
    helpers::expand_path(Path::new(filepath)).map_err(|e| Error::InvalidArgument(e.to_string()))
}

fn write_raw(filepath: &str, data: &[u8]) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(expand(filepath)?)?;
    file.write_all(hex::encode(data).as_bytes())?;
    Ok(())
}

fn read_raw(filepath: &str) -> Result<Vec<u8>> {
    let mut hexdata = String::new();
    std::fs::File::open(expand(filepath)?)?.read_to_string(&mut hexdata)?;
    hex::decode(hexdata.trim())
        .map_err(|e| Error::InvalidArgument(format!("{}: {}", filepath, e)))
}

/// Broadcast a transaction previously signed with `--out`
pub async fn send_raw(
    session: &Session,
    filepath: &str,
    tx_args: &TxCommonArgs,
) -> Result<Option<TxHash>> {
    let provider = session.provider()?;
    let raw = read_raw(filepath)?;
    let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
        .map_err(|e| Error::InvalidArgument(format!("{}: {}", filepath, e)))?;

    if tx_args.dry_run {
        println!("Signed transaction {}, not sent.", envelope.hash().to_string().red());
        return Ok(None);
    }
    if !tx_args.yes {
        let prompt = format!(
            "{} {} {} {}\n",
            "Please type".green(),
            "YES".red().bold(),
            "to broadcast".green(),
            envelope.hash().to_string().red(),
        );
        if !helpers::reedline::confirm(&prompt, "YES").unwrap_or(false) {
            println!("{}", "Transaction cancelled.".yellow());
            return Ok(None);
        }
    }

    let pending = provider
        .send_raw_transaction(&raw)
        .await
        .map_err(Error::submission("raw transaction rejected"))?;
    let tx_hash = *pending.tx_hash();
    println!(
        "Transaction {} successfully sent.",
        tx_hash.to_string().red()
    );
    Ok(Some(tx_hash))
}

pub fn sprintf_tx(tx: &TransactionRequest) -> String {
    let align = 16;
    let mut pretty_tx = String::default();
    macro_rules! push_field {
        ($s:expr, $v: expr, $c: ident) => {
            pretty_tx.push_str(
                format!(
                    "\n    {:align$}{}",
                    format!("{}:", $s).white().bold(),
                    format!("{}", $v).$c(),
                )
                .as_str(),
            );
        };
    }
    if let Some(chain_id) = tx.chain_id {
        push_field!("chain_id", chain_id, green);
    }
    if let Some(nonce) = tx.nonce {
        push_field!("nonce", nonce, magenta);
    }
    if let Some(from) = tx.from {
        push_field!("from", from, blue);
    }
    if let Some(TxKind::Call(to)) = tx.to {
        push_field!("to", to, blue);
    }
    let value = tx.value.unwrap_or_default();
    push_field!(
        "value",
        format!("{} eth", format_units(value, "ether").unwrap_or_default()),
        yellow
    );
    if let Some(input) = tx.input.input() {
        push_field!("data", format!("{} bytes", input.len()), white);
    }
    if let Some(gas) = tx.gas {
        push_field!("gas_limit", gas, green);
    }
    if let (Some(max_fee), Some(max_priority)) = (tx.max_fee_per_gas, tx.max_priority_fee_per_gas)
    {
        pretty_tx.push('\n');
        pretty_tx.push_str(format_eth!(align, "max_priority_fee", white, max_priority, blue));
        pretty_tx.push_str(format_eth!(align, "max_fee_per_gas", white, max_fee, blue));
    }
    pretty_tx
}
