use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context, Result};
use cbdc_ledger::{
    config::LedgerConfig,
    ledger::{Amount, BasisPoints, Timestamp},
    request::SignedRequest,
    store::LedgerStore,
    telemetry, Address, Genesis, LedgerFacade, Operation,
};
use clap::{ArgAction, Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::{rngs::OsRng, RngCore};
use tracing::info;

//==================== CLI ====================//

#[derive(Parser)]
#[command(name = "cbdc", version, about = "Governed CBDC ledger with treasury-bond staking")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a new ledger: the whole initial supply goes to the controller.
    Init {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        controller: Address,
        #[arg(long, default_value_t = 10_000_000)]
        supply: Amount,
        /// JSON config (name, symbol, default_interest_rate_bps, restake_policy).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate an ed25519 key pair (sk.hex / pk.hex) and print its address.
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Print the address controlled by a secret key.
    Address {
        #[arg(long)]
        sk_hex: String,
    },
    /// Sign an operation; prints the request JSON or writes it to --out.
    Sign {
        #[arg(long)]
        sk_hex: String,
        #[arg(long, default_value_t = 0)]
        nonce: u64,
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(subcommand)]
        op: OpArgs,
    },
    /// Verify and execute a signed request against the state file.
    Submit {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        request: PathBuf,
        /// Override the host clock (unix seconds).
        #[arg(long)]
        now: Option<Timestamp>,
    },
    /// Read-only queries.
    Query {
        #[arg(long)]
        state: PathBuf,
        #[command(subcommand)]
        query: QueryArgs,
    },
}

#[derive(Subcommand)]
enum OpArgs {
    Transfer {
        to: Address,
        amount: Amount,
    },
    UpdateControllingParty {
        controller: Address,
    },
    UpdateInterestRate {
        basis_points: BasisPoints,
    },
    IncreaseTokenSupply {
        amount: Amount,
    },
    UpdateBlacklist {
        account: Address,
        #[arg(action = ArgAction::Set)]
        blacklisted: bool,
    },
    Stake {
        amount: Amount,
    },
    Unstake {
        amount: Amount,
    },
    Claim,
}

impl From<OpArgs> for Operation {
    fn from(args: OpArgs) -> Self {
        match args {
            OpArgs::Transfer { to, amount } => Operation::Transfer { to, amount },
            OpArgs::UpdateControllingParty { controller } => {
                Operation::UpdateControllingParty { controller }
            }
            OpArgs::UpdateInterestRate { basis_points } => {
                Operation::UpdateInterestRate { basis_points }
            }
            OpArgs::IncreaseTokenSupply { amount } => Operation::IncreaseTokenSupply { amount },
            OpArgs::UpdateBlacklist {
                account,
                blacklisted,
            } => Operation::UpdateBlacklist {
                account,
                blacklisted,
            },
            OpArgs::Stake { amount } => Operation::StakeTreasuryBonds { amount },
            OpArgs::Unstake { amount } => Operation::UnstakeTreasuryBonds { amount },
            OpArgs::Claim => Operation::ClaimTreasuryBonds,
        }
    }
}

#[derive(Subcommand)]
enum QueryArgs {
    Name,
    Symbol,
    BalanceOf {
        account: Address,
    },
    TotalSupply,
    ControllingParty,
    InterestRate,
    Blacklist {
        account: Address,
    },
    StakedAmountOf {
        account: Address,
    },
    /// Interest a claim would realize right now (or at --now).
    PendingReward {
        account: Address,
        #[arg(long)]
        now: Option<Timestamp>,
    },
    /// Full state with its merkle root, as JSON.
    Snapshot,
    /// Event log, as JSON lines.
    Events,
}

//==================== Utilities ====================//

fn host_now() -> Result<Timestamp> {
    let since = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?;
    Ok(since.as_secs())
}

fn parse_sk_hex(sk_hex: &str) -> Result<SigningKey> {
    let sk_bytes = hex::decode(sk_hex.trim()).context("invalid sk-hex")?;
    let arr: [u8; 32] = match sk_bytes.try_into() {
        Ok(arr) => arr,
        Err(_) => bail!("sk-hex must be 32 bytes (64 hex chars)"),
    };
    Ok(SigningKey::from_bytes(&arr))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

//==================== Commands ====================//

fn init_cmd(state: &Path, controller: Address, supply: Amount, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    let facade = LedgerFacade::new(
        config,
        Genesis {
            controller,
            initial_supply: supply,
        },
    )?;
    let store = LedgerStore::create(state, facade)?;
    println!(
        "{} ({}) deployed → {}, controller {}, supply {}",
        store.facade().name(),
        store.facade().symbol(),
        state.display(),
        controller,
        supply
    );
    Ok(())
}

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    let sk = SigningKey::from_bytes(&sk_bytes);
    let pk = sk.verifying_key();

    write_file(&out_dir.join("sk.hex"), hex::encode(sk_bytes).as_bytes())?;
    write_file(&out_dir.join("pk.hex"), hex::encode(pk.as_bytes()).as_bytes())?;
    println!("{}", Address::from_verifying_key(&pk));
    Ok(())
}

fn sign_cmd(sk_hex: &str, nonce: u64, out: Option<&Path>, op: OpArgs) -> Result<()> {
    let sk = parse_sk_hex(sk_hex)?;
    let request = SignedRequest::sign(&sk, op.into(), nonce)?;
    let json = serde_json::to_vec_pretty(&request)?;
    match out {
        Some(path) => {
            write_file(path, &json)?;
            println!("signed request → {}", path.display());
        }
        None => println!("{}", String::from_utf8_lossy(&json)),
    }
    Ok(())
}

fn submit_cmd(state: &Path, request: &Path, now: Option<Timestamp>) -> Result<()> {
    let bytes = fs::read(request).with_context(|| format!("read {}", request.display()))?;
    let request: SignedRequest = serde_json::from_slice(&bytes).context("request parse")?;
    let now = match now {
        Some(now) => now,
        None => host_now()?,
    };
    let mut store = LedgerStore::open(state)?;
    let receipt = store.submit(&request, now)?;
    info!(height = receipt.height, "request applied");
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

fn query_cmd(state: &Path, query: QueryArgs) -> Result<()> {
    let store = LedgerStore::open(state)?;
    let facade = store.facade();
    match query {
        QueryArgs::Name => println!("{}", facade.name()),
        QueryArgs::Symbol => println!("{}", facade.symbol()),
        QueryArgs::BalanceOf { account } => println!("{}", facade.balance_of(&account)),
        QueryArgs::TotalSupply => println!("{}", facade.total_supply()),
        QueryArgs::ControllingParty => println!("{}", facade.controlling_party()),
        QueryArgs::InterestRate => println!("{}", facade.interest_rate_basis_points()),
        QueryArgs::Blacklist { account } => println!("{}", facade.blacklist(&account)),
        QueryArgs::StakedAmountOf { account } => println!("{}", facade.staked_amount_of(&account)),
        QueryArgs::PendingReward { account, now } => {
            let now = match now {
                Some(now) => now,
                None => host_now()?,
            };
            println!("{}", facade.pending_reward(&account, now)?);
        }
        QueryArgs::Snapshot => println!("{}", serde_json::to_string_pretty(&facade.snapshot())?),
        QueryArgs::Events => {
            for event in facade.events() {
                println!("{}", serde_json::to_string(event)?);
            }
        }
    }
    Ok(())
}

//==================== main ====================//

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Init {
            state,
            controller,
            supply,
            config,
        } => init_cmd(&state, controller, supply, config.as_deref()),
        Command::Keygen { out_dir } => keygen_cmd(&out_dir),
        Command::Address { sk_hex } => {
            let sk = parse_sk_hex(&sk_hex)?;
            println!("{}", Address::from_verifying_key(&sk.verifying_key()));
            Ok(())
        }
        Command::Sign {
            sk_hex,
            nonce,
            out,
            op,
        } => sign_cmd(&sk_hex, nonce, out.as_deref(), op),
        Command::Submit {
            state,
            request,
            now,
        } => submit_cmd(&state, &request, now),
        Command::Query { state, query } => query_cmd(&state, query),
    }
}
