//! Lounge Admin CLI: register members, look them up by card code, and run
//! ledger operations against a snapshot file.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use lounge_core::config::AppConfig;
use lounge_core::event_bus::{LedgerEvent, LedgerEventSink};
use lounge_core::types::{Account, AccountId, AchievementId, Principal};
use lounge_core::LoungeError;
use lounge_loyalty::{AccountService, DataUriRenderer, LedgerService, RegistrationRequest};
use lounge_store::MemoryStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "lounge-admin")]
#[command(about = "Paradise Lounge loyalty administration tool")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "LOUNGE_CONFIG")]
    config: Option<String>,

    /// Snapshot file (overrides config)
    #[arg(long, env = "LOUNGE__STORE__SNAPSHOT_PATH")]
    data: Option<String>,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new member account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Repeat of the password (defaults to --password)
        #[arg(long)]
        confirm_password: Option<String>,
        /// Date of birth, YYYY-MM-DD
        #[arg(long)]
        date_of_birth: Option<NaiveDate>,
    },

    /// Confirm a member's email and activate the account
    Activate {
        /// Member card code
        code: String,
    },

    /// Look up a member by card code
    Find { code: String },

    /// Show tier, cashback and deduction limits for an order
    Quote {
        code: String,
        #[arg(long)]
        order: u64,
    },

    /// Record a paid order and credit cashback
    Accrue {
        code: String,
        #[arg(long)]
        order: u64,
    },

    /// Pay part of an order with points
    Deduct {
        code: String,
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        order: u64,
    },

    /// Count a visit without changing the balance
    Visit {
        code: String,
        #[arg(long)]
        order: Option<u64>,
    },

    /// Visit history, newest first
    History { code: String },

    /// Achievement progress for a member
    Achievements {
        code: String,
        /// Persist the re-evaluated progress
        #[arg(long, default_value_t = false)]
        save: bool,
    },

    /// Claim an unlocked achievement on the member's behalf
    Claim {
        code: String,
        /// master_relax, guru_comfort, smoky_discharge, no_break
        achievement: String,
    },

    /// Reset an achievement so it can be earned again
    ResetAchievement { code: String, achievement: String },

    /// Soft-delete a member account
    Delete { code: String },
}

/// Forwards ledger events to the log.
struct LogSink;

impl LedgerEventSink for LogSink {
    fn emit(&self, event: LedgerEvent) {
        debug!(
            event_id = %event.event_id,
            event_type = ?event.event_type,
            account_id = %event.account_id,
            points = ?event.points,
            "Ledger event"
        );
    }
}

struct Lounge {
    config: AppConfig,
    accounts: AccountService<MemoryStore>,
    ledger: LedgerService<MemoryStore>,
}

impl Lounge {
    fn new(store: Arc<MemoryStore>, config: AppConfig) -> Self {
        let events: Arc<dyn LedgerEventSink> = Arc::new(LogSink);
        Self {
            accounts: AccountService::new(
                store.clone(),
                &config.accounts,
                Arc::new(DataUriRenderer),
                events.clone(),
            ),
            ledger: LedgerService::new(store, &config, events),
            config,
        }
    }

    /// The operator running this tool acts as the configured administrator.
    fn admin(&self) -> Principal {
        Principal {
            account_id: AccountId::from("lounge-admin"),
            email: self.config.accounts.admin_email.clone(),
            email_verified: true,
        }
    }

    fn lookup(&self, code: &str) -> anyhow::Result<Account> {
        Ok(self.accounts.find_by_code(&self.admin(), code)?)
    }

    /// Act as the member whose card was presented, with the verification
    /// state on record.
    fn member(&self, code: &str) -> anyhow::Result<Principal> {
        let account = self.lookup(code)?;
        Ok(Principal {
            account_id: account.id,
            email: account.email,
            email_verified: account.email_verified,
        })
    }
}

fn parse_achievement(raw: &str) -> anyhow::Result<AchievementId> {
    AchievementId::parse(raw).with_context(|| format!("unknown achievement '{raw}'"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(lounge: &Lounge, command: Commands) -> anyhow::Result<()> {
    let admin = lounge.admin();

    match command {
        Commands::Register {
            name,
            email,
            password,
            confirm_password,
            date_of_birth,
        } => {
            let request = RegistrationRequest {
                name,
                email,
                confirm_password: confirm_password.unwrap_or_else(|| password.clone()),
                password,
                date_of_birth,
            };
            print_json(&lounge.accounts.register(AccountId::new_random(), &request)?)
        }
        Commands::Activate { code } => {
            let member = Principal {
                email_verified: true,
                ..lounge.member(&code)?
            };
            print_json(&lounge.accounts.activate(&member)?)
        }
        Commands::Find { code } => print_json(&lounge.lookup(&code)?),
        Commands::Quote { code, order } => {
            let account = lounge.lookup(&code)?;
            print_json(&lounge.ledger.quote(&admin, &account.id, order)?)
        }
        Commands::Accrue { code, order } => {
            let account = lounge.lookup(&code)?;
            print_json(&lounge.ledger.accrue(&admin, &account.id, order)?)
        }
        Commands::Deduct {
            code,
            amount,
            order,
        } => {
            let account = lounge.lookup(&code)?;
            print_json(&lounge.ledger.deduct(&admin, &account.id, amount, order)?)
        }
        Commands::Visit { code, order } => {
            let account = lounge.lookup(&code)?;
            print_json(&lounge.ledger.record_visit(&admin, &account.id, order)?)
        }
        Commands::History { code } => {
            let account = lounge.lookup(&code)?;
            print_json(&lounge.ledger.visit_history(&admin, &account.id)?)
        }
        Commands::Achievements { code, save } => {
            let account = lounge.lookup(&code)?;
            let progress = if save {
                lounge.ledger.evaluate_achievements(&admin, &account.id)?
            } else {
                lounge.ledger.achievements(&admin, &account.id)?
            };
            print_json(&progress)
        }
        Commands::Claim { code, achievement } => {
            let achievement = parse_achievement(&achievement)?;
            let member = lounge.member(&code)?;
            print_json(&lounge.ledger.claim_achievement(&member, achievement)?)
        }
        Commands::ResetAchievement { code, achievement } => {
            let achievement = parse_achievement(&achievement)?;
            let account = lounge.lookup(&code)?;
            print_json(
                &lounge
                    .ledger
                    .reset_achievement(&admin, &account.id, achievement)?,
            )
        }
        Commands::Delete { code } => {
            let member = lounge.member(&code)?;
            print_json(&lounge.accounts.delete_account(&member)?)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lounge_admin=info,lounge_loyalty=info".into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let mut config = AppConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(data) = cli.data {
        config.store.snapshot_path = data;
    }
    let snapshot = config.store.snapshot_path.clone();

    let store = Arc::new(
        MemoryStore::load_snapshot(&snapshot)
            .with_context(|| format!("failed to load snapshot {snapshot}"))?,
    );
    info!(
        snapshot = %snapshot,
        accounts = store.account_count(),
        visits = store.visit_count(),
        "Snapshot loaded"
    );

    let lounge = Lounge::new(store.clone(), config);
    if let Err(err) = run(&lounge, cli.command) {
        // Rejected input exits with 2 so scripts can tell it from failures.
        if err
            .downcast_ref::<LoungeError>()
            .is_some_and(LoungeError::is_user_error)
        {
            warn!(error = %err, "Request rejected");
            std::process::exit(2);
        }
        return Err(err);
    }

    store
        .save_snapshot(&snapshot)
        .with_context(|| format!("failed to save snapshot {snapshot}"))?;
    Ok(())
}
