//! pool-ledger CLI: run a staking pool backed by a local JSON state file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::{rngs::OsRng, RngCore};

use pool_ledger::access::signing_key_from_hex;
use pool_ledger::config::{PoolConfig, DEFAULT_CONFIG_FILE};
use pool_ledger::store::{load_ledger, save_ledger};
use pool_ledger::{Amount, OperatorKey, RewardAuthorization, StakingPool, TracingSink};

/// Pooled staking ledger: deposit, distribute rewards, withdraw.
#[derive(Parser)]
#[command(name = "pool-ledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, env = "POOL_LEDGER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a pool config and a fresh operator keypair
    Init {
        /// Directory receiving sk.hex and pk.hex
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Pool label
        #[arg(long, default_value = "pool")]
        label: String,

        /// Overwrite an existing config
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Stake `amount` on behalf of `account`
    Deposit {
        #[arg(long)]
        account: String,
        #[arg(long)]
        amount: Amount,
    },

    /// Distribute a reward across current stakers (operator only)
    Reward {
        #[arg(long)]
        amount: Amount,

        /// Operator secret key, 64 hex chars
        #[arg(long, env = "POOL_LEDGER_OPERATOR_SK", hide_env_values = true)]
        sk_hex: String,
    },

    /// Withdraw the full stake and reward of `account`
    Withdraw {
        #[arg(long)]
        account: String,
    },

    /// List every staked account with its pending reward
    Accounts,

    /// Show pool totals and the state root
    Status,
}

fn write_key_file(path: &Path, hex: &str) -> Result<()> {
    fs::write(path, hex).with_context(|| format!("write {}", path.display()))
}

fn init_cmd(config_path: &Path, out_dir: PathBuf, label: String, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    fs::create_dir_all(&out_dir).with_context(|| format!("mkdir {}", out_dir.display()))?;

    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    let sk = SigningKey::from_bytes(&sk_bytes);
    let operator = OperatorKey::new(sk.verifying_key());

    write_key_file(&out_dir.join("sk.hex"), &hex::encode(sk_bytes))?;
    write_key_file(&out_dir.join("pk.hex"), &operator.to_hex())?;
    PoolConfig::new(label, &operator).save(config_path)?;

    tracing::info!(config = %config_path.display(), "pool initialized");
    println!("config written → {}", config_path.display());
    println!("operator keypair written → {}", out_dir.display());
    Ok(())
}

/// Loads config and state, runs `f` against the pool, then persists the result.
fn with_pool<R>(
    config_path: &Path,
    f: impl FnOnce(&StakingPool<TracingSink>) -> Result<R>,
) -> Result<R> {
    let config = PoolConfig::load(config_path)?;
    let operator = config.operator()?;
    let ledger = load_ledger(&config.state_path)?;
    let pool = StakingPool::from_ledger(operator, ledger, TracingSink);

    let out = f(&pool)?;

    let (ledger, _) = pool.into_parts()?;
    save_ledger(&config.state_path, &ledger)?;
    Ok(out)
}

fn deposit_cmd(config_path: &Path, account: String, amount: Amount) -> Result<()> {
    with_pool(config_path, |pool| {
        pool.deposit(&account, amount)
            .with_context(|| format!("deposit {amount} for {account}"))?;
        println!(
            "Deposit: {account} staked {amount} (balance {})",
            pool.staked_balance(&account)?
        );
        Ok(())
    })
}

fn reward_cmd(config_path: &Path, amount: Amount, sk_hex: String) -> Result<()> {
    let sk = signing_key_from_hex(&sk_hex).context("invalid --sk-hex")?;
    with_pool(config_path, |pool| {
        let sequence = pool.reward_sequence()?;
        let auth = RewardAuthorization::sign(&sk, amount, sequence);
        pool.distribute_exact(amount, &auth)
            .with_context(|| format!("reward {amount}"))?;
        println!("Reward: {amount} distributed (sequence {sequence})");
        Ok(())
    })
}

fn withdraw_cmd(config_path: &Path, account: String) -> Result<()> {
    with_pool(config_path, |pool| {
        let payout = pool
            .withdraw(&account)
            .with_context(|| format!("withdraw for {account}"))?;
        println!(
            "Withdraw: {account} (principal: {}, reward: {}, total: {})",
            payout.principal, payout.reward, payout.total
        );
        Ok(())
    })
}

fn accounts_cmd(config_path: &Path) -> Result<()> {
    let config = PoolConfig::load(config_path)?;
    let ledger = load_ledger(&config.state_path)?;
    for view in ledger.accounts()? {
        println!(
            "Account: {} (Staked: {}, reward: {})",
            view.account, view.staked, view.pending_reward
        );
    }
    Ok(())
}

fn status_cmd(config_path: &Path) -> Result<()> {
    let config = PoolConfig::load(config_path)?;
    let ledger = load_ledger(&config.state_path)?;
    let totals = ledger.totals();
    println!("pool:                 {}", config.label);
    println!("operator:             {}", config.operator_pubkey_hex);
    println!("accounts:             {}", ledger.account_count());
    println!("total staked:         {}", ledger.pool().total_staked);
    println!("held in pool:         {}", totals.held());
    println!(
        "deposited / rewarded: {} / {}",
        totals.deposited, totals.rewarded
    );
    println!("withdrawn:            {}", totals.withdrawn);
    println!("rounding slack:       {}", ledger.unallocated_slack()?);
    println!("acc reward per share: {}", ledger.pool().acc_reward_per_share);
    println!(
        "height / rewards:     {} / {}",
        ledger.meta().height,
        ledger.meta().reward_sequence
    );
    println!("state root:           {}", hex::encode(ledger.state_root()));
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init {
            out_dir,
            label,
            force,
        } => init_cmd(&cli.config, out_dir, label, force),
        Commands::Deposit { account, amount } => deposit_cmd(&cli.config, account, amount),
        Commands::Reward { amount, sk_hex } => reward_cmd(&cli.config, amount, sk_hex),
        Commands::Withdraw { account } => withdraw_cmd(&cli.config, account),
        Commands::Accounts => accounts_cmd(&cli.config),
        Commands::Status => status_cmd(&cli.config),
    }
}
