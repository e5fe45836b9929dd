use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tq_core::{
    ActorId, EscalationFilter, EscalationId, EscalationStatus, FaultCause, HandoverType, NewTicket,
    Priority, Scope, ScopeFields, ScopeType, StepUpdate, TicketId, TicketSource, TicketStatus,
    TicketType,
};
use tq_engine::{
    Engine, EngineConfig, EngineError, EscalationDetector, HandoverGate, RequestContext,
    TicketLifecycle, VerificationTracker,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tq", version, about = "Ticket lifecycle, handover and escalation engine")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file; overrides `[store] path`
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Acting user recorded in history
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    /// Give up on a write after this many milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema
    Init,
    /// Ticket records and status workflow
    #[command(subcommand)]
    Ticket(TicketCmd),
    /// Verification checklist
    #[command(subcommand)]
    Verify(VerifyCmd),
    /// Ownership handover between teams
    #[command(subcommand)]
    Handover(HandoverCmd),
    /// Repeat-fault escalations
    #[command(subcommand)]
    Escalation(EscalationCmd),
    /// Run detection over every recently seen scope
    Scan {
        /// Repeat every N seconds; run once when omitted
        #[arg(long)]
        every_secs: Option<u64>,
        /// Stop after this many rounds
        #[arg(long)]
        rounds: Option<u32>,
    },
    /// History integrity
    #[command(subcommand)]
    Audit(AuditCmd),
}

#[derive(Subcommand)]
enum TicketCmd {
    /// Open a ticket
    Create(CreateArgs),
    /// Print a ticket by id or FT code
    Show { ticket: String },
    /// Move a ticket to a new status
    Transition {
        ticket: String,
        status: TicketStatus,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Change the assignee
    Assign {
        ticket: String,
        assignee: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Attribute the fault cause
    FaultCause {
        ticket: String,
        cause: FaultCause,
        #[arg(long)]
        details: Option<String>,
    },
    /// Change history of a ticket
    History { ticket: String },
}

#[derive(Args)]
struct CreateArgs {
    #[arg(long)]
    title: String,
    #[arg(long = "type", default_value = "maintenance")]
    ticket_type: TicketType,
    #[arg(long, default_value = "manual")]
    source: TicketSource,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    assignee: Option<String>,
    #[arg(long)]
    pole: Option<String>,
    #[arg(long)]
    pon: Option<String>,
    #[arg(long)]
    zone: Option<String>,
    #[arg(long)]
    dr: Option<String>,
}

#[derive(Subcommand)]
enum VerifyCmd {
    /// Update one checklist step
    Step {
        ticket: String,
        step: u32,
        #[arg(long, conflicts_with = "reopen")]
        complete: bool,
        #[arg(long)]
        reopen: bool,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        by: Option<String>,
        /// Attach a photo; an empty value removes it
        #[arg(long)]
        photo: Option<String>,
        /// Mark the attached photo verified (or `false` to clear)
        #[arg(long)]
        photo_verified: Option<bool>,
    },
    /// Completion summary
    Progress { ticket: String },
    /// All twelve steps
    List { ticket: String },
}

#[derive(Subcommand)]
enum HandoverCmd {
    /// Evaluate the gate without changing anything
    Check {
        ticket: String,
        handover_type: HandoverType,
    },
    /// Evaluate and hand over
    Create {
        ticket: String,
        handover_type: HandoverType,
    },
    /// Owner and snapshots
    History { ticket: String },
}

#[derive(Subcommand)]
enum EscalationCmd {
    /// Check one scope
    Detect {
        scope_type: ScopeType,
        scope_value: String,
        #[arg(long)]
        threshold: Option<u32>,
        #[arg(long)]
        window_days: Option<u32>,
    },
    /// Close an open escalation
    Resolve {
        id: EscalationId,
        status: EscalationStatus,
        #[arg(long)]
        notes: String,
    },
    /// List escalations
    List {
        #[arg(long)]
        status: Option<EscalationStatus>,
        #[arg(long)]
        scope_type: Option<ScopeType>,
        #[arg(long)]
        scope_value: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Walk the history hash chain
    Verify,
}

fn init_tracing(default_filter: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Accept either a ticket UUID or its FT code
fn resolve_ticket(engine: &Engine, reference: &str) -> Result<TicketId> {
    if let Ok(id) = reference.parse::<TicketId>() {
        return Ok(id);
    }
    let ticket = engine
        .tickets()
        .get_ticket_by_uid(reference)
        .with_context(|| format!("no ticket {reference}"))?;
    Ok(ticket.id)
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(db) = &cli.db {
        config = config.with_store_path(db);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging.filter, cli.log_json);

    let mut ctx = RequestContext::new(cli.actor.clone());
    if let Some(ms) = cli.timeout_ms {
        ctx = ctx.with_timeout(Duration::from_millis(ms));
    }
    let engine = Engine::open(config).context("opening store")?;

    match cli.command {
        Commands::Init => {
            let version = engine.store().schema_version()?;
            info!(version, "schema ready");
            emit(&serde_json::json!({
                "path": engine.config().store.path,
                "schema_version": version,
            }))?;
        }
        Commands::Ticket(cmd) => run_ticket(&engine, &ctx, cmd)?,
        Commands::Verify(cmd) => run_verify(&engine, &ctx, cmd)?,
        Commands::Handover(cmd) => run_handover(&engine, &ctx, cmd)?,
        Commands::Escalation(cmd) => run_escalation(&engine, &ctx, cmd)?,
        Commands::Scan { every_secs, rounds } => {
            run_scan(Arc::new(engine), ctx, every_secs, rounds).await?;
        }
        Commands::Audit(AuditCmd::Verify) => {
            let report = engine.verify_history()?;
            emit(&report)?;
            if !report.valid {
                bail!("history chain broken");
            }
        }
    }
    Ok(())
}

fn run_ticket(engine: &Engine, ctx: &RequestContext, cmd: TicketCmd) -> Result<()> {
    match cmd {
        TicketCmd::Create(args) => {
            let scope = ScopeFields {
                pole_number: args.pole,
                pon: args.pon,
                zone_id: args.zone,
                dr_number: args.dr,
            };
            let mut new = NewTicket::new(args.title, args.ticket_type, args.source, scope);
            new.description = args.description;
            if let Some(priority) = args.priority {
                new = new.with_priority(priority);
            }
            if let Some(assignee) = args.assignee {
                new = new.with_assignee(ActorId::new(assignee));
            }
            let ticket = engine.tickets().create_ticket(ctx, new)?;
            emit(&ticket)
        }
        TicketCmd::Show { ticket } => {
            let id = resolve_ticket(engine, &ticket)?;
            let ticket = engine.tickets().get_ticket(id)?;
            let next = engine.tickets().available_transitions(id)?;
            emit(&serde_json::json!({ "ticket": ticket, "available_transitions": next }))
        }
        TicketCmd::Transition {
            ticket,
            status,
            reason,
        } => {
            let id = resolve_ticket(engine, &ticket)?;
            emit(&engine.transition_status(ctx, id, status, reason.as_deref())?)
        }
        TicketCmd::Assign {
            ticket,
            assignee,
            reason,
        } => {
            let id = resolve_ticket(engine, &ticket)?;
            emit(&engine.assign(ctx, id, ActorId::new(assignee), reason.as_deref())?)
        }
        TicketCmd::FaultCause {
            ticket,
            cause,
            details,
        } => {
            let id = resolve_ticket(engine, &ticket)?;
            emit(&engine
                .tickets()
                .set_fault_cause(ctx, id, cause, details.as_deref())?)
        }
        TicketCmd::History { ticket } => {
            let id = resolve_ticket(engine, &ticket)?;
            emit(&engine.tickets().ticket_history(id)?)
        }
    }
}

fn run_verify(engine: &Engine, ctx: &RequestContext, cmd: VerifyCmd) -> Result<()> {
    match cmd {
        VerifyCmd::Step {
            ticket,
            step,
            complete,
            reopen,
            notes,
            by,
            photo,
            photo_verified,
        } => {
            let id = resolve_ticket(engine, &ticket)?;
            let update = StepUpdate {
                completed: match (complete, reopen) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                completed_by: by.map(ActorId::new),
                photo_url: photo,
                photo_verified,
                notes,
            };
            let step = engine.update_verification_step(ctx, id, step, update)?;
            engine.tickets().refresh_qa_readiness(ctx, id)?;
            emit(&step)
        }
        VerifyCmd::Progress { ticket } => {
            let id = resolve_ticket(engine, &ticket)?;
            emit(&engine.verification_progress(id)?)
        }
        VerifyCmd::List { ticket } => {
            let id = resolve_ticket(engine, &ticket)?;
            emit(&engine.verification().list(id)?)
        }
    }
}

fn run_handover(engine: &Engine, ctx: &RequestContext, cmd: HandoverCmd) -> Result<()> {
    match cmd {
        HandoverCmd::Check {
            ticket,
            handover_type,
        } => {
            let id = resolve_ticket(engine, &ticket)?;
            emit(&engine.validate_handover_gate(id, handover_type)?)
        }
        HandoverCmd::Create {
            ticket,
            handover_type,
        } => {
            let id = resolve_ticket(engine, &ticket)?;
            match engine.create_handover(ctx, id, handover_type) {
                Ok(snapshot) => emit(&snapshot),
                Err(EngineError::HandoverGateFailed(eval)) => {
                    emit(&eval)?;
                    bail!("handover blocked by {} issue(s)", eval.blocking_issues.len())
                }
                Err(e) => Err(e.into()),
            }
        }
        HandoverCmd::History { ticket } => {
            let id = resolve_ticket(engine, &ticket)?;
            emit(&engine.handover_history(id)?)
        }
    }
}

fn run_escalation(engine: &Engine, ctx: &RequestContext, cmd: EscalationCmd) -> Result<()> {
    match cmd {
        EscalationCmd::Detect {
            scope_type,
            scope_value,
            threshold,
            window_days,
        } => {
            let scope = Scope::new(scope_type, scope_value);
            emit(&engine.detect_fault_pattern(ctx, &scope, threshold, window_days)?)
        }
        EscalationCmd::Resolve { id, status, notes } => {
            emit(&engine.resolve_escalation(ctx, id, status, &notes)?)
        }
        EscalationCmd::List {
            status,
            scope_type,
            scope_value,
            limit,
        } => {
            let filter = EscalationFilter {
                scope_type,
                scope_value,
                status,
                limit,
            };
            emit(&engine.escalation().list(&filter)?)
        }
    }
}

async fn run_scan(
    engine: Arc<Engine>,
    ctx: RequestContext,
    every_secs: Option<u64>,
    rounds: Option<u32>,
) -> Result<()> {
    let Some(secs) = every_secs else {
        let hits = engine.scan(&ctx)?;
        return emit(&hits);
    };

    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    let mut done = 0u32;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!(rounds = done, "scan interrupted");
                return Ok(());
            }
        }
        let worker = Arc::clone(&engine);
        let round_ctx = ctx.renewed();
        match tokio::task::spawn_blocking(move || worker.scan(&round_ctx)).await? {
            Ok(hits) => emit(&hits)?,
            Err(e) if e.is_retryable() => warn!(error = %e, "scan round failed, retrying next tick"),
            Err(e) => return Err(e.into()),
        }
        done += 1;
        if rounds.is_some_and(|limit| done >= limit) {
            return Ok(());
        }
    }
}
