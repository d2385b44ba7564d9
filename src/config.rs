use std::ffi::OsStr;
use std::path::PathBuf;
use std::{fs::File, io::BufReader};

use eyre::{Result, WrapErr, bail};
use serde_derive::Deserialize;

use clap_serde_derive::{
    ClapSerde,
    clap::{self, Parser, Subcommand},
};

use crate::contract::Variant;

#[allow(deprecated)]
fn home_dir() -> PathBuf {
    std::env::home_dir().unwrap_or_default()
}

fn datadir() -> PathBuf {
    home_dir().join(".deposit-knife")
}

fn config_file() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".config"))
        .join("deposit-knife")
        .join("config.toml")
}

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Config file
    #[arg(short, long = "config", default_value = config_file().into_os_string())]
    pub config_path: Option<PathBuf>,

    /// Keystore password, prompted for when missing
    #[arg(long, required = false)]
    pub password: Option<String>,

    /// Global arguments
    #[command(flatten)]
    pub config: <CliArgs as ClapSerde>::Opt,

    // Subcommands
    #[command(subcommand)]
    pub command: CliCmd,
}

// Make sure all values are optional or parsing fails if a value
// is missing in the config file
#[derive(Debug, Clone, ClapSerde, Deserialize)]
pub struct CliArgs {
    /// Logging level
    #[arg(short, long = "log-level", required = false, default_value = "3")]
    pub log_level: Option<u8>,

    /// Enable vi edit mode
    #[arg(long = "vi", required = false, action = clap::ArgAction::SetTrue)]
    pub vi_mode: bool,

    /// Command history length, 0 to disable history
    #[arg(long, required = false, default_value = "10000")]
    pub history: usize,

    /// Data directory
    #[arg(long = "datadir", default_value = datadir().into_os_string())]
    pub datadir: Option<PathBuf>,

    /// Wallet provider JsonRPC URL
    #[arg(long = "rpc-url", required = false)]
    pub rpc_url: Option<String>,

    /// Batch deposit contract address
    #[arg(long = "batch-contract", required = false)]
    pub contract: Option<String>,

    /// Sign locally with this keystore instead of the provider's accounts
    #[arg(long, required = false)]
    pub keystore: Option<PathBuf>,
}

/// Where the deposit JSON comes from, prompted for when neither is given
#[derive(Parser, Debug, Clone, Default)]
pub struct InputArgs {
    /// Deposit data JSON file, "-" for stdin
    #[arg(short, long, required = false, conflicts_with = "json")]
    pub file: Option<PathBuf>,
    /// Deposit data JSON text
    #[arg(short, long, required = false)]
    pub json: Option<String>,
}

// Command line cmds
#[derive(Subcommand)]
pub enum CliCmd {
    /// Print version information
    #[clap(visible_alias = "ver")]
    Version {},
    /// Start an interactive REPL
    Console {},
    /// Connect to a wallet provider and start an interactive REPL
    #[clap(visible_alias = "at")]
    Attach {
        #[arg(required = false)]
        rpc_url: Option<String>,
    },
    /// Display the connected network and active account
    #[clap(visible_alias = "ac")]
    Account {},
    /// Parse deposit data and print the batch call arguments
    #[clap(visible_alias = "p")]
    Prepare {
        #[command(flatten)]
        input: InputArgs,
        /// Check key validity, field sizes and deposit data roots
        #[arg(long, required = false, action = clap::ArgAction::SetTrue)]
        verify: bool,
    },
    /// Submit all deposits in one batch contract transaction
    #[clap(visible_alias = "s")]
    Submit {
        #[command(flatten)]
        input: InputArgs,
        /// Batch deposit contract address
        #[arg(short, long, required = false)]
        contract: Option<String>,
        /// Check key validity, field sizes and deposit data roots
        #[arg(long, required = false, action = clap::ArgAction::SetTrue)]
        verify: bool,
        /// tx common args
        #[command(flatten)]
        tx_args: TxCommonArgs,
    },
    /// Submit a single deposit to the deposit contract
    #[clap(visible_aliases = &["d", "topup"])]
    Deposit {
        #[command(flatten)]
        input: InputArgs,
        /// Deposit contract address, defaults to the network's
        #[arg(short, long, required = false)]
        contract: Option<String>,
        /// Eth amount to deposit
        #[arg(short, long = "eth", visible_aliases = &["a", "amount"], default_value_t = 32.0)]
        eth: f64,
        /// Check key validity, field sizes and deposit data root
        #[arg(long, required = false, action = clap::ArgAction::SetTrue)]
        verify: bool,
        /// tx common args
        #[command(flatten)]
        tx_args: TxCommonArgs,
    },
    /// Broadcast a transaction signed with --out
    #[clap(visible_alias = "sr")]
    SendRaw {
        /// Filepath
        #[arg(required = true)]
        filepath: String,
        /// tx common args
        #[command(flatten)]
        tx_args: TxCommonArgs,
    },
    /// Print the contract interface with function selectors
    #[clap(visible_alias = "abi")]
    Interface {
        #[arg(required = false, value_enum)]
        variant: Option<Variant>,
    },
    /// Query the deposit contract
    #[command(subcommand)]
    Contract(CmdContract),
}

#[derive(Subcommand)]
pub enum CmdContract {
    /// Deposit count and root of the deposit contract
    #[clap(visible_alias = "i")]
    Info {
        /// Deposit contract address, defaults to the network's
        #[arg(short, long, required = false)]
        contract: Option<String>,
    },
}

#[derive(Parser)]
pub enum ReplCmd {
    // Subcommands
    #[command(flatten)]
    CliCmd(CliCmd),
    /// Disconnect from the wallet provider
    #[clap(visible_aliases = &["dt"])]
    Detach {},
    /// Global config
    #[command(subcommand)]
    #[clap(visible_aliases = &["c", "cfg"])]
    Config(CmdConfig),
}

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Get config
    #[clap(visible_alias = "g")]
    Get {},
    /// Set config
    #[command(subcommand)]
    #[clap(visible_alias = "s")]
    Set(CmdConfigSet),
}

#[derive(Subcommand)]
pub enum CmdConfigSet {
    /// App logging level
    #[command(subcommand)]
    #[clap(visible_alias = "l")]
    LogLevel(CmdLogSet),
    /// Wallet provider JsonRPC URL, reconnects
    #[clap(visible_alias = "u")]
    RpcUrl {
        #[arg(required = true)]
        rpc_url: String,
    },
    /// Batch deposit contract address, rebinds
    #[clap(visible_alias = "c")]
    Contract {
        #[arg(required = true)]
        contract: String,
    },
}

#[derive(Subcommand)]
pub enum CmdLogSet {
    #[clap(visible_alias = "c", disable_help_flag(true))]
    Critical {},
    #[clap(visible_alias = "e", disable_help_flag(true))]
    Error {},
    #[clap(visible_alias = "w", disable_help_flag(true))]
    Warning {},
    #[clap(visible_alias = "i", disable_help_flag(true))]
    Info {},
    #[clap(visible_alias = "d", disable_help_flag(true))]
    Debug {},
    #[clap(visible_alias = "t", disable_help_flag(true))]
    Trace {},
}

impl CmdLogSet {
    pub fn level(&self) -> u8 {
        match self {
            CmdLogSet::Critical {} => 0,
            CmdLogSet::Error {} => 1,
            CmdLogSet::Warning {} => 2,
            CmdLogSet::Info {} => 3,
            CmdLogSet::Debug {} => 4,
            CmdLogSet::Trace {} => 5,
        }
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[clap(
    // Fees are "all-or-none", if one is present the other must be as well
    group(clap::ArgGroup::new("fee_args")
        .required(false)
        .multiple(true)
        .requires_all(&["max_fee", "max_priority"])
        .args(&["max_fee", "max_priority"])
    ),
)]
pub struct TxCommonArgs {
    /// Skip user confirmation ("YES" prompt)
    #[arg(short, long, required = false, action = clap::ArgAction::SetTrue)]
    pub yes: bool,
    /// Wait for network confirmation
    #[arg(short, long, required = false, action = clap::ArgAction::SetTrue)]
    pub wait: bool,
    /// Simulate the transaction without sending it
    #[arg(long, required = false, action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,
    /// Submit even when the deposit list is empty
    #[arg(long, required = false, action = clap::ArgAction::SetTrue)]
    pub allow_empty: bool,
    /// Sign with the keystore and write the tx data to file instead of sending
    #[arg(short, long, value_name = "FILEPATH", required = false)]
    pub out: Option<String>,
    /// Max priority fee per gas in gwei
    #[arg(long, required = false)]
    pub max_priority: Option<f64>,
    /// Max fee per gas in gwei
    #[arg(long, required = false)]
    pub max_fee: Option<f64>,
    /// TX gas limit
    #[arg(long, required = false)]
    pub gas_limit: Option<u64>,
}

pub fn merge_args_from_file<T>(
    args: <T as ClapSerde>::Opt,
    maybe_path: Option<PathBuf>,
) -> Result<T>
where
    T: ClapSerde + serde::de::DeserializeOwned,
{
    let path = match maybe_path {
        Some(path) if path.exists() => path,
        _ => return Ok(T::from(args)),
    };
    let config = match path.extension().and_then(OsStr::to_str) {
        Some("toml") => read_toml_config::<T, _>(path.as_path()),
        Some("json") => read_json_config::<T, _>(path.as_path()),
        Some("jsonc") => read_jsonc_config::<T, _>(path.as_path()),
        _ => {
            bail!("Unsupported config file type: {:?}", path);
        }
    }?;
    // Values present in the config file replace the command line ones
    Ok(T::from(args).merge(config))
}

fn read_toml_config<T, P>(path: P) -> Result<<T as ClapSerde>::Opt>
where
    P: AsRef<std::path::Path> + std::fmt::Debug + Copy,
    T: ClapSerde + serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path).wrap_err_with(|| format!("{:?}", path))?;
    toml::from_str(&content).wrap_err_with(|| format!("{:?}", path))
}

fn read_json_config<T: ClapSerde, P>(path: P) -> Result<<T as ClapSerde>::Opt>
where
    P: AsRef<std::path::Path> + std::fmt::Debug + Copy,
{
    let f = File::open(path).wrap_err_with(|| format!("{:?}", path))?;
    serde_json::from_reader::<_, <T as ClapSerde>::Opt>(BufReader::new(f))
        .wrap_err_with(|| format!("{:?}", path))
}

fn read_jsonc_config<T: ClapSerde, P>(path: P) -> Result<<T as ClapSerde>::Opt>
where
    P: AsRef<std::path::Path> + std::fmt::Debug + Copy,
{
    let f = File::open(path).wrap_err_with(|| format!("{:?}", path))?;
    serde_jsonc::from_reader::<_, <T as ClapSerde>::Opt>(BufReader::new(f))
        .wrap_err_with(|| format!("{:?}", path))
}
