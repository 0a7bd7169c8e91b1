//! gatepass - gate pass dispatch CLI
//!
//! # Usage
//! ```bash
//! gatepass --config gatepass.toml check      # Validate config only
//! gatepass --config gatepass.toml demo       # Run one pass through its lifecycle
//! gatepass --config gatepass.toml monitor    # Run the overdue monitor until Ctrl-C
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gatepass_core::app::{App, AppBuilder, ReturnProof};
use gatepass_core::domain::{
    Action, Actor, DepartmentId, DivisionId, MaterialCondition, MaterialDetails, MaterialType,
    NewGatePass, Receiver, Role, StoreLocation, UserId,
};
use gatepass_core::impls::{InMemoryPassStore, StaticDirectory, TracingNotifier};
use gatepass_core::GatePassConfig;
use ulid::Ulid;

/// Development-only key used by `demo` when no config file exists.
const DEMO_SECRET_HEX: &str = "67617465706173732d64656d6f2d6b6579";

#[derive(Parser, Debug)]
#[command(name = "gatepass")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gatepass.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate configuration and exit
    Check,
    /// Drive one returnable pass through every gate against in-memory adapters
    Demo,
    /// Run the overdue monitor until Ctrl-C
    Monitor,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    match args.command {
        Command::Check => {
            let config = load_config(&args.config)?;
            info!(
                ttl_secs = config.token.ttl_secs,
                fast_secs = config.monitor.fast_interval_secs,
                slow_secs = config.monitor.slow_interval_secs,
                "configuration is valid"
            );
        }
        Command::Demo => {
            let config = if args.config.exists() {
                load_config(&args.config)?
            } else {
                warn!(path = %args.config.display(), "no config file; using the built-in demo key");
                GatePassConfig::with_secret_hex(DEMO_SECRET_HEX)
            };
            run_demo(config).await?;
        }
        Command::Monitor => {
            let config = load_config(&args.config)?;
            run_monitor(config).await?;
        }
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: &Path) -> Result<GatePassConfig> {
    GatePassConfig::load_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

struct DemoOrg {
    directory: StaticDirectory,
    department: DepartmentId,
    requester: Actor,
    head: Actor,
    store_manager: Actor,
    security: Actor,
}

fn demo_org() -> DemoOrg {
    let department = DepartmentId::from_ulid(Ulid::new());
    let user = |role: Role| Actor::new(UserId::from_ulid(Ulid::new()), role);
    let requester = user(Role::Requester);
    let head = user(Role::DepartmentHead(department));
    let store_manager = user(Role::StoreManager(StoreLocation::new("store_1")));
    let security = user(Role::Security);
    let admin = user(Role::Admin);

    let mut directory = StaticDirectory::new().with_member(requester.user_id, department);
    for a in [&requester, &head, &store_manager, &security, &admin] {
        directory = directory.with_user(a.user_id, a.role.clone());
    }
    DemoOrg {
        directory,
        department,
        requester,
        head,
        store_manager,
        security,
    }
}

fn build_app(config: GatePassConfig, directory: StaticDirectory) -> Result<App> {
    AppBuilder::new(config)
        .store(Arc::new(InMemoryPassStore::new()))
        .notifier(Arc::new(TracingNotifier))
        .directory(Arc::new(directory))
        .build()
        .context("Failed to wire application")
}

async fn run_demo(config: GatePassConfig) -> Result<()> {
    let org = demo_org();
    let app = build_app(config, org.directory.clone())?;
    let approvals = &app.approvals;

    let now = chrono::Utc::now();
    let input = NewGatePass {
        division_id: DivisionId::from_ulid(Ulid::new()),
        department_id: org.department,
        details: MaterialDetails {
            description: "Portable generator".into(),
            destination: "Site B".into(),
            purpose: "Temporary power during maintenance".into(),
            receiver: Receiver {
                name: "Site B supervisor".into(),
                contact: "site-b@example.com".into(),
            },
        },
        condition: MaterialCondition::Other,
        material_type: MaterialType::Returnable,
        sent_at: now,
        expected_return: Some(now + chrono::Duration::days(3)),
        urgent: false,
    };

    let draft = approvals.create_draft(&org.requester, input).await?;
    approvals.submit_draft(draft.id, &org.requester).await?;
    for approver in [&org.head, &org.store_manager, &org.security] {
        approvals
            .submit_transition(draft.id, approver, Action::Approve, None)
            .await?;
    }
    approvals
        .submit_transition(draft.id, &org.security, Action::Dispatch, None)
        .await?;

    let issued = approvals.generate_return_token(draft.id).await?;
    info!(token = %issued.token, "return code printed");
    let returned = approvals
        .mark_returned(
            draft.id,
            ReturnProof::ScannedToken {
                scanner: org.security.clone(),
                token: issued.token,
            },
        )
        .await?;

    let history = approvals.history(draft.id).await?;
    let report = serde_json::json!({ "pass": returned, "history": history });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_monitor(config: GatePassConfig) -> Result<()> {
    let app = build_app(config, StaticDirectory::new())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = app.monitor.clone().spawn(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("shutdown requested");
    shutdown_tx.send(true).ok();
    handle.await.context("Overdue monitor task panicked")?;
    Ok(())
}
