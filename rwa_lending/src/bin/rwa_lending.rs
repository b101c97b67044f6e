use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use rwa_lending::{
    bridges::selector,
    config::Settings,
    gateway::{ContractGateway, EvmContractGateway, InMemoryGateway},
    reconcile::reconcile_borrower,
    services::{AssetRegistry, LoanLedger, TokenizationRequest},
    storage::{LendingStore, MemoryStore, SupabaseStore},
    terms::monthly_payment,
    types::{Address, TxHash, U256},
    wallet::{LocalKeyWallet, WalletProvider},
    workflow::{LoanOrigination, LoanWorkflow, OriginationRequest},
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "rwa-lending", version, about = "RWA-backed loan workflow client")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "RWA_CONFIG")]
    config: Option<PathBuf>,

    /// Hex private key of the borrower wallet
    #[arg(long, env = "RWA_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Use the in-process contract simulation instead of RPC
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    InitConfig { path: PathBuf },
    /// List configured networks
    Networks,
    /// Show the routing selector of a source chain
    Selector { chain: String },
    /// Quote loan terms from the contract
    Terms {
        #[arg(long)]
        amount: String,
        #[arg(long)]
        months: u32,
        #[arg(long)]
        network: Option<String>,
    },
    /// Amortised monthly payment for a principal
    Payment {
        #[arg(long)]
        principal: f64,
        /// Annual rate in percent
        #[arg(long)]
        rate: f64,
        #[arg(long)]
        months: u32,
    },
    /// Create a loan on-chain and record it
    CreateLoan {
        /// Collateral asset record id
        #[arg(long)]
        asset_id: Uuid,
        #[arg(long)]
        token_id: u64,
        #[arg(long)]
        account_token_id: u64,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        months: u32,
        /// Annual rate in percent for the payment schedule
        #[arg(long)]
        rate: f64,
        /// Payment token; defaults to the network's configured token
        #[arg(long)]
        token: Option<Address>,
        #[arg(long)]
        cross_chain: bool,
        #[arg(long)]
        source_chain: Option<String>,
        #[arg(long)]
        network: Option<String>,
    },
    /// Pay one monthly installment
    Pay {
        #[arg(long)]
        loan_id: u64,
        #[arg(long)]
        network: Option<String>,
    },
    /// Repay a loan in full
    Repay {
        #[arg(long)]
        loan_id: u64,
        #[arg(long)]
        network: Option<String>,
    },
    /// List on-chain loan ids and mirrored records of the wallet
    Loans {
        #[arg(long)]
        network: Option<String>,
    },
    /// Compare on-chain loans with mirrored records
    Reconcile {
        #[arg(long)]
        network: Option<String>,
    },
    /// Block explorer link for a transaction
    Explorer {
        tx_hash: TxHash,
        #[arg(long)]
        network: Option<String>,
    },
    /// Asset tokenization requests
    #[command(subcommand)]
    Asset(AssetCommands),
}

#[derive(Subcommand)]
enum AssetCommands {
    /// Request tokenization of an asset owned by the wallet
    Request {
        #[arg(long)]
        name: String,
        #[arg(long)]
        value: f64,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        blockchain: Option<String>,
    },
    /// Approve a pending asset
    Approve { id: Uuid },
    /// Reject a pending asset
    Reject { id: Uuid },
    /// List assets of the wallet
    List,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_store(settings: &Settings) -> Arc<dyn LendingStore> {
    match &settings.supabase {
        Some(supabase) => Arc::new(SupabaseStore::new(supabase)),
        None => {
            warn!("No Supabase endpoint configured, records are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    }
}

fn open_gateway(settings: &Settings, dry_run: bool) -> Result<Arc<dyn ContractGateway>> {
    if dry_run {
        info!("Dry run: using the in-memory contract simulation");
        return Ok(Arc::new(InMemoryGateway::new(settings.clone())));
    }
    Ok(Arc::new(EvmContractGateway::new(settings.clone())?))
}

async fn connected_wallet(cli: &Cli, settings: &Settings) -> Result<Arc<LocalKeyWallet>> {
    let key = cli
        .private_key
        .as_deref()
        .ok_or_else(|| anyhow!("A private key is required (--private-key or RWA_PRIVATE_KEY)"))?;
    let wallet = Arc::new(LocalKeyWallet::from_private_key(key, settings)?);
    wallet.connect().await?;
    Ok(wallet)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Commands::InitConfig { path } = &cli.command {
        Settings::default().write(path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    let gateway = open_gateway(&settings, cli.dry_run)?;
    let store = open_store(&settings);

    match &cli.command {
        Commands::InitConfig { .. } => unreachable!("handled before loading configuration"),
        Commands::Networks => {
            print_json(&serde_json::json!({
                "current": gateway.get_current_network().await,
                "supported": gateway.get_supported_networks(),
            }))?;
        }
        Commands::Selector { chain } => {
            print_json(&serde_json::json!({
                "chain": chain,
                "selector": selector::resolve(chain),
                "known": selector::try_resolve(chain).is_some(),
            }))?;
        }
        Commands::Payment { principal, rate, months } => {
            print_json(&serde_json::json!({
                "monthly_payment": monthly_payment(*principal, *rate, *months),
            }))?;
        }
        Commands::Explorer { tx_hash, network } => {
            println!("{}", gateway.get_block_explorer_url(tx_hash, network.as_deref()).await?);
        }
        Commands::Asset(AssetCommands::Approve { id }) => {
            print_json(&AssetRegistry::new(store).approve(*id).await?)?;
        }
        Commands::Asset(AssetCommands::Reject { id }) => {
            print_json(&AssetRegistry::new(store).reject(*id).await?)?;
        }
        command => {
            let wallet = connected_wallet(&cli, &settings).await?;
            let workflow = Arc::new(LoanWorkflow::new(
                wallet.clone(),
                gateway.clone(),
                settings.payment_token_decimals,
            ));
            let origination = LoanOrigination::new(workflow.clone(), LoanLedger::new(store.clone()));
            let address = wallet
                .address()
                .await
                .ok_or_else(|| anyhow!("wallet disconnected"))?;

            match command {
                Commands::Terms { amount, months, network } => {
                    let terms = workflow.calculate_terms(amount, *months, network.as_deref()).await?;
                    print_json(&terms)?;
                }
                Commands::CreateLoan {
                    asset_id,
                    token_id,
                    account_token_id,
                    amount,
                    months,
                    rate,
                    token,
                    cross_chain,
                    source_chain,
                    network,
                } => {
                    let network_name = network.clone().unwrap_or_else(|| settings.default_network.clone());
                    let token_address = match token {
                        Some(token) => *token,
                        None => settings
                            .network(&network_name)?
                            .payment_token
                            .ok_or_else(|| anyhow!("No payment token configured for {}", network_name))?,
                    };
                    let outcome = origination
                        .originate(OriginationRequest {
                            asset_id: *asset_id,
                            token_id: U256::from(*token_id),
                            account_token_id: U256::from(*account_token_id),
                            amount: amount.clone(),
                            duration_months: *months,
                            interest_rate: *rate,
                            token_address,
                            cross_chain: *cross_chain,
                            source_chain: source_chain.clone(),
                            network: network.clone(),
                        })
                        .await?;
                    let url = gateway
                        .get_block_explorer_url(&outcome.receipt.tx_hash, network.as_deref())
                        .await?;
                    print_json(&serde_json::json!({ "outcome": outcome, "explorer": url }))?;
                }
                Commands::Pay { loan_id, network } => {
                    let receipt = origination
                        .pay_installment(U256::from(*loan_id), network.as_deref())
                        .await?;
                    print_json(&receipt)?;
                }
                Commands::Repay { loan_id, network } => {
                    let receipt = origination
                        .repay_in_full(U256::from(*loan_id), network.as_deref())
                        .await?;
                    print_json(&receipt)?;
                }
                Commands::Loans { network } => {
                    let onchain = workflow.get_user_loans(network.as_deref()).await?;
                    let records = origination.ledger().loans_for(&address).await?;
                    print_json(&serde_json::json!({ "onchain": onchain, "records": records }))?;
                }
                Commands::Reconcile { network } => {
                    let report =
                        reconcile_borrower(gateway.as_ref(), store.as_ref(), address, network.as_deref()).await?;
                    print_json(&report)?;
                }
                Commands::Asset(AssetCommands::Request { name, value, location, blockchain }) => {
                    let asset = AssetRegistry::new(store.clone())
                        .request_tokenization(TokenizationRequest {
                            owner: address,
                            name: name.clone(),
                            value: *value,
                            location: location.clone(),
                            blockchain: blockchain.clone(),
                            token_id: None,
                        })
                        .await?;
                    print_json(&asset)?;
                }
                Commands::Asset(AssetCommands::List) => {
                    print_json(&AssetRegistry::new(store.clone()).list_for_owner(&address).await?)?;
                }
                _ => unreachable!("handled without a wallet"),
            }
        }
    }

    Ok(())
}
