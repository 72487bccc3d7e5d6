//! Kith CLI
//!
//! Drives a Kith engine from the shell. Each invocation opens the database,
//! runs one command, prints the result as JSON on stdout and exits.
//!
//! Failed operations print `{"error": {code, kind, message}}` on stderr and
//! exit with status 1.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use kith_core::{Engine, EngineConfig, Error, StorageConfig, UserId};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "kith", version, about = "Kith relationship-graph engine")]
struct Cli {
    /// SQLite database file
    #[arg(long, default_value = "kith.db", env = "KITH_DB", global = true)]
    db: String,

    /// Repair each pair as it is read
    #[arg(
        long,
        default_value_t = true,
        env = "KITH_RECONCILE_ON_READ",
        action = clap::ArgAction::Set,
        global = true
    )]
    reconcile_on_read: bool,

    /// Pairs reconciled concurrently by a sweep
    #[arg(long, default_value_t = 8, env = "KITH_SWEEP_CONCURRENCY", global = true)]
    sweep_concurrency: usize,

    #[command(subcommand)]
    command: Command,
}

/// An actor and the user they act on
#[derive(clap::Args, Debug)]
struct Pair {
    /// User performing the operation
    actor: String,
    /// The counterpart
    target: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add users to the directory
    Register {
        #[arg(required = true)]
        users: Vec<String>,
    },
    /// Send a friend request
    Send(Pair),
    /// Accept a friend request (actor is the recipient)
    Accept(Pair),
    /// Decline a friend request (actor is the recipient)
    Decline(Pair),
    /// Cancel an outgoing friend request
    Cancel(Pair),
    /// End a friendship
    Unfriend(Pair),
    /// Block a user
    Block(Pair),
    /// Lift a block
    Unblock(Pair),
    /// Show the state of a pair
    State { a: String, b: String },
    /// List a user's friends
    Friends { user: String },
    /// List requests a user has received
    Incoming { user: String },
    /// List requests a user has sent
    Outgoing { user: String },
    /// List users a user has blocked
    Blocked { user: String },
    /// Reconcile every pair
    Sweep {
        /// Keep sweeping periodically until interrupted
        #[arg(long)]
        watch: bool,

        /// Seconds between sweeps in watch mode
        #[arg(
            long,
            default_value_t = 300,
            env = "KITH_SWEEP_INTERVAL_SECS",
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        interval_secs: u64,
    },
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        let sweep_interval_secs = match self.command {
            Command::Sweep { interval_secs, .. } => interval_secs,
            _ => 0,
        };

        EngineConfig {
            reconcile_on_read: self.reconcile_on_read,
            sweep_interval_secs,
            sweep_concurrency: self.sweep_concurrency,
            storage: StorageConfig {
                database_path: Some(self.db.clone()),
            },
        }
    }
}

// ── Command Dispatch ──────────────────────────────────────────────────────────

fn user(raw: &str) -> kith_core::Result<UserId> {
    UserId::new(raw)
}

fn pair(args: &Pair) -> kith_core::Result<(UserId, UserId)> {
    Ok((user(&args.actor)?, user(&args.target)?))
}

fn users_json(users: Vec<UserId>) -> Value {
    json!(users)
}

/// Run one command against an open engine
async fn run(engine: &Engine, command: &Command) -> kith_core::Result<Value> {
    let friends = engine.friends();

    let value = match command {
        Command::Register { users } => {
            let mut registered = Vec::with_capacity(users.len());
            for raw in users {
                let id = user(raw)?;
                engine.register_user(&id).await?;
                registered.push(id);
            }
            json!({ "registered": registered })
        }
        Command::Send(args) => {
            let (actor, target) = pair(args)?;
            serde_json::to_value(friends.send_request(&actor, &target).await?)?
        }
        Command::Accept(args) => {
            let (actor, target) = pair(args)?;
            serde_json::to_value(friends.accept_request(&actor, &target).await?)?
        }
        Command::Decline(args) => {
            let (actor, target) = pair(args)?;
            serde_json::to_value(friends.decline_request(&actor, &target).await?)?
        }
        Command::Cancel(args) => {
            let (actor, target) = pair(args)?;
            serde_json::to_value(friends.cancel_request(&actor, &target).await?)?
        }
        Command::Unfriend(args) => {
            let (actor, target) = pair(args)?;
            serde_json::to_value(friends.remove_friend(&actor, &target).await?)?
        }
        Command::Block(args) => {
            let (actor, target) = pair(args)?;
            serde_json::to_value(friends.block_user(&actor, &target).await?)?
        }
        Command::Unblock(args) => {
            let (actor, target) = pair(args)?;
            serde_json::to_value(friends.unblock_user(&actor, &target).await?)?
        }
        Command::State { a, b } => {
            let (a, b) = (user(a)?, user(b)?);
            let state = friends.get_pair_state(&a, &b).await?;
            json!({ "a": a, "b": b, "state": state })
        }
        Command::Friends { user: raw } => users_json(friends.list_friends(&user(raw)?).await?),
        Command::Incoming { user: raw } => {
            users_json(friends.list_incoming_requests(&user(raw)?).await?)
        }
        Command::Outgoing { user: raw } => {
            users_json(friends.list_outgoing_requests(&user(raw)?).await?)
        }
        Command::Blocked { user: raw } => users_json(friends.list_blocked(&user(raw)?).await?),
        Command::Sweep { .. } => serde_json::to_value(engine.reconciler().sweep().await?)?,
    };

    Ok(value)
}

fn error_json(error: &Error) -> Value {
    json!({
        "error": {
            "code": error.code(),
            "kind": error.kind(),
            "message": error.to_string(),
        }
    })
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kith=info,kith_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = Engine::open(cli.engine_config()).await?;

    let watch = matches!(cli.command, Command::Sweep { watch: true, .. });

    let value = match run(&engine, &cli.command).await {
        Ok(value) => value,
        Err(e) => {
            engine.shutdown().await?;
            eprintln!("{}", error_json(&e));
            std::process::exit(1);
        }
    };
    println!("{}", serde_json::to_string_pretty(&value)?);

    if watch {
        if !engine.start_sweeper() {
            engine.shutdown().await?;
            color_eyre::eyre::bail!("Background sweeper could not be started");
        }
        tracing::info!("Watching, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
    }

    engine.shutdown().await?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
