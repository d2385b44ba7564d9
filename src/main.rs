#[macro_use]
extern crate log;

use clap::{CommandFactory, Parser};
use colored::*;
use eyre::{Result, WrapErr, eyre};

use alloy::primitives::{
    U256,
    utils::{Unit, format_ether, parse_ether},
};

use clap_repl::{
    ClapEditor, ReadCommandOutput,
    reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory},
};

use deposit_knife::{
    config::{self, *},
    contract::{self, Variant},
    deposit::{self, DEPOSIT_AMOUNT_GWEI, PreparedBatch},
    helpers,
    logger::{DEFAULT_LOG_LEVEL, Logger},
    session::{Session, WalletOpts},
    submit,
};

/// Everything a command needs: the merged config, the logger and the
/// wallet session, connected on first use
struct App {
    config: CliArgs,
    logger: Logger,
    password: Option<String>,
    session: Session,
    attached: bool,
}

impl App {
    fn wallet_opts(&self) -> WalletOpts {
        WalletOpts {
            rpc_url: self.config.rpc_url.clone(),
            keystore: self.config.keystore.clone(),
            password: self.password.clone(),
        }
    }

    async fn attach(&mut self) {
        self.session = Session::connect(&self.wallet_opts()).await;
        self.attached = true;
    }

    async fn session(&mut self) -> &mut Session {
        if !self.attached {
            self.attach().await;
        }
        &mut self.session
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args with clap
    let args = Cli::parse();

    // Load config file & shellexpand datadir so we can use "~/...", etc
    let mut config = config::merge_args_from_file::<CliArgs>(args.config, args.config_path)?;
    if let Some(datadir) = &config.datadir {
        config.datadir = Some(helpers::expand_path(datadir)?);
    }

    let logger = Logger::new(config.log_level.unwrap_or(DEFAULT_LOG_LEVEL));
    logger.set_global();

    let mut app = App {
        config,
        logger,
        password: args.password,
        session: Session::default(),
        attached: false,
    };

    match &args.command {
        CliCmd::Console {} => run_console(&mut app).await,
        CliCmd::Attach { rpc_url } => {
            if rpc_url.is_some() {
                app.config.rpc_url = rpc_url.clone();
            }
            run_console(&mut app).await
        }
        cmd => cmd_dispatch(&mut app, cmd).await,
    }
}

async fn run_console(app: &mut App) -> Result<()> {
    app.attach().await;
    print!("{}", app.session.sprintf());

    let mut rl = match (app.config.history, &app.config.datadir) {
        (0, _) | (_, None) => ClapEditor::<ReplCmd>::builder(),
        (history, Some(datadir)) => {
            std::fs::create_dir_all(datadir)
                .wrap_err_with(|| format!("create datadir {:?}", datadir))?;
            let history_file = datadir.join("history");
            ClapEditor::<ReplCmd>::builder().with_editor_hook(move |reed| {
                match FileBackedHistory::with_file(history, history_file.clone()) {
                    Ok(h) => reed.with_history(Box::new(h)),
                    Err(e) => {
                        warn!("History disabled: {}", e);
                        reed
                    }
                }
            })
        }
    };

    if app.config.vi_mode {
        rl = rl.with_edit_mode(helpers::reedline::edit_mode_vi());
    };

    let mut rl = rl.build();

    loop {
        rl.set_prompt(Box::new(build_prompt(&app.session)));
        match rl.read_command() {
            ReadCommandOutput::Command(c) => {
                if let Err(e) = repl_cmd_dispatch(app, &c).await {
                    println!("{}", format!("Error: {:?}", e).red());
                }
            }
            ReadCommandOutput::EmptyLine => (),
            ReadCommandOutput::ClapError(e) => {
                if let Err(e) = e.print() {
                    error!("{}", e);
                }
            }
            ReadCommandOutput::ShlexError => {
                println!(
                    "{} input was not valid and could not be processed",
                    ("Error:").red().bold()
                );
            }
            ReadCommandOutput::ReedlineError(e) => {
                return Err(eyre!("{}", e));
            }
            ReadCommandOutput::CtrlC => continue,
            ReadCommandOutput::CtrlD => break,
        }
    }
    Ok(())
}

async fn repl_cmd_dispatch(app: &mut App, cmd: &ReplCmd) -> Result<()> {
    match cmd {
        ReplCmd::Detach {} => {
            app.session = Session::default();
            println!("Detached from wallet provider");
        }
        ReplCmd::CliCmd(CliCmd::Console {}) => println!("Already in console"),
        ReplCmd::CliCmd(CliCmd::Attach { rpc_url }) => {
            if rpc_url.is_some() {
                app.config.rpc_url = rpc_url.clone();
            }
            let opts = app.wallet_opts();
            app.session.reconnect(&opts).await;
            print!("{}", app.session.sprintf());
        }
        ReplCmd::CliCmd(cmd) => cmd_dispatch(app, cmd).await?,
        ReplCmd::Config(CmdConfig::Get {}) => {
            println!("{:#?}", app.config);
        }
        ReplCmd::Config(CmdConfig::Set(cmd_set)) => match cmd_set {
            CmdConfigSet::LogLevel(log_set) => {
                app.config.log_level = Some(log_set.level());
                app.logger.set_log_level(log_set.level());
                println!("Logging level set to {}", app.logger.log_level());
            }
            CmdConfigSet::RpcUrl { rpc_url } => {
                app.config.rpc_url = Some(rpc_url.clone());
                let opts = app.wallet_opts();
                app.session.reconnect(&opts).await;
                print!("{}", app.session.sprintf());
            }
            CmdConfigSet::Contract { contract } => {
                let binding = app.session().await.bind(Some(contract), Variant::Batch)?;
                println!("Bound batch contract {}", binding.address().to_string().yellow());
                app.config.contract = Some(contract.clone());
            }
        },
    }
    Ok(())
}

async fn cmd_dispatch(app: &mut App, cmd: &CliCmd) -> Result<()> {
    match cmd {
        CliCmd::Version {} => {
            let mut ver = Cli::command().render_version();
            ver.pop(); // remove "\n"
            println!("version: {}", ver);
        }
        CliCmd::Console {} | CliCmd::Attach { .. } => {
            println!("Console is only available from the command line");
        }
        CliCmd::Account {} => {
            let session = app.session().await;
            print!("{}", session.sprintf());
            if session.account().is_none() {
                warn!("{}", "No active account".yellow());
            }
        }
        CliCmd::Prepare { input, verify } => {
            let batch = deposit::prepare(&read_input(input)?)?;
            if *verify {
                batch.verify(DEPOSIT_AMOUNT_GWEI)?;
            }
            print!("{}", batch.sprintf());
        }
        CliCmd::Submit {
            input,
            contract,
            verify,
            tx_args,
        } => {
            let contract = contract.clone().or_else(|| app.config.contract.clone());
            bind(app, contract.as_deref(), Variant::Batch).await?;
            let batch = deposit::prepare(&read_input(input)?)?;
            if *verify {
                batch.verify(DEPOSIT_AMOUNT_GWEI)?;
            }
            submit_batch(app, &batch, tx_args).await?;
        }
        CliCmd::Deposit {
            input,
            contract,
            eth,
            verify,
            tx_args,
        } => {
            let value = parse_ether(&eth.to_string())?;
            bind(app, contract.as_deref(), Variant::Single).await?;
            let batch = deposit::prepare_single(&read_input(input)?, value)?;
            if *verify {
                batch.verify(to_gwei(value)?)?;
            }
            submit_batch(app, &batch, tx_args).await?;
        }
        CliCmd::SendRaw { filepath, tx_args } => {
            submit::send_raw(app.session().await, filepath, tx_args).await?;
        }
        CliCmd::Interface { variant } => match variant {
            Some(variant) => contract::print_interface(*variant),
            None => {
                contract::print_interface(Variant::Batch);
                contract::print_interface(Variant::Single);
            }
        },
        CliCmd::Contract(CmdContract::Info { contract }) => {
            let binding = app.session().await.bind(contract.as_deref(), Variant::Single)?;
            let align = 16;
            println!(
                "    {:align$}{}",
                "address:".white().bold(),
                binding.address().to_string().yellow()
            );
            println!(
                "    {:align$}{}",
                "deployed:".white().bold(),
                binding.is_deployed().await?.to_string().green()
            );
            println!(
                "    {:align$}{}",
                "erc165:".white().bold(),
                binding.supports_erc165().await?.to_string().green()
            );
            println!(
                "    {:align$}{}",
                "deposit_count:".white().bold(),
                binding.deposit_count().await?.to_string().magenta()
            );
            println!(
                "    {:align$}{}",
                "deposit_root:".white().bold(),
                binding.deposit_root().await?.to_string().blue()
            );
        }
    };
    Ok(())
}

fn read_input(input: &InputArgs) -> Result<String> {
    helpers::read_deposit_input(&input.file, &input.json)
}

fn to_gwei(value: U256) -> Result<u64> {
    u64::try_from(value / Unit::GWEI.wei())
        .map_err(|_| eyre!("{} eth does not fit a deposit amount", format_ether(value)))
}

/// Bind the target contract, warning when nothing is deployed there
async fn bind(app: &mut App, address: Option<&str>, variant: Variant) -> Result<()> {
    let binding = app.session().await.bind(address, variant)?;
    match binding.is_deployed().await {
        Ok(true) => {}
        Ok(false) => warn!(
            "{}",
            format!("No contract code at {}", binding.address()).yellow()
        ),
        Err(e) => debug!("code lookup failed: {}", e),
    }
    Ok(())
}

async fn submit_batch(app: &mut App, batch: &PreparedBatch, tx_args: &TxCommonArgs) -> Result<()> {
    debug!("\n{}", batch.sprintf());
    if let Some(tx_hash) = submit::submit(app.session().await, batch, tx_args).await? {
        info!("Deposit transaction hash: {}", tx_hash);
    }
    Ok(())
}

fn build_prompt(session: &Session) -> DefaultPrompt {
    match session.is_connected() {
        false => DefaultPrompt {
            left_prompt: DefaultPromptSegment::Basic(
                "[DISCONNECTED]".white().bold().to_string(),
            ),
            ..DefaultPrompt::default()
        },
        true => DefaultPrompt {
            left_prompt: DefaultPromptSegment::Basic(format!(
                "{} {} {}",
                format!(
                    "({})",
                    match session.chain().id {
                        0 => format!("chainId:{}", session.chain_id()),
                        _ => session.chain().name.to_owned(),
                    }
                )
                .white()
                .bold(),
                match session.account() {
                    Some(account) => account.to_string().green(),
                    None => "<no account>".yellow(),
                },
                session.rpc_url().unwrap_or_default().blue(),
            )),
            ..DefaultPrompt::default()
        },
    }
}
