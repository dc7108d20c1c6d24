//! attendance - command-line front end for the attendance portal.
//!
//! Each command loads one page, applies the requested filters or actions,
//! and prints what the page rendered. Exports are written to `--out`.

mod commands;
mod context;
mod output;

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use attendance_core::models::AnalyticsPeriod;
use attendance_core::views::admin::{EventSort, EventStatusFilter, PaymentTab};
use attendance_core::views::member::EventsFilter;
use attendance_core::Config;

use context::AppContext;
use output::Output;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Directory for CSV exports
    #[arg(long, global = true, default_value = ".")]
    out: PathBuf,

    /// Print raw HTML fragments instead of text
    #[arg(long, global = true)]
    html: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in
    Login {
        /// Login ID; defaults to the remembered one
        #[arg(long)]
        id: Option<String>,
        /// Remember the login ID and password
        #[arg(long)]
        remember: bool,
    },
    /// Sign out
    Logout {
        /// Also drop remembered credentials
        #[arg(long)]
        forget: bool,
    },
    /// Show the signed-in user
    Whoami,
    /// Member home page
    Home,
    /// Your events
    Events {
        #[arg(long, default_value = "upcoming")]
        tab: EventsFilter,
        #[arg(long)]
        search: Option<String>,
        /// Bypass the cache
        #[arg(long)]
        refresh: bool,
    },
    /// One event: details, your answer, payment
    MyEvent {
        id: String,
        /// attend, absent or pending
        #[arg(long)]
        answer: Option<String>,
        #[arg(long, default_value = "")]
        notes: String,
        /// Report a payment with this method (cash, bank, paypay, line_pay)
        #[arg(long)]
        pay: Option<String>,
    },
    /// Attendance history
    History {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        export: bool,
    },
    /// Payments and receipts
    Receipts {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        status: Option<String>,
        /// Show one receipt
        #[arg(long)]
        receipt: Option<String>,
    },
    /// Your profile
    Profile {
        /// Change your password
        #[arg(long)]
        change_password: bool,
    },
    /// Staff dashboard
    Dashboard,
    /// Manage events
    AdminEvents {
        #[arg(long, default_value = "all")]
        status: EventStatusFilter,
        #[arg(long, default_value = "date_desc")]
        sort: EventSort,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        duplicate: Option<String>,
        #[arg(long)]
        delete: Option<String>,
    },
    /// One event's roster
    Event {
        id: String,
        /// attend, absent, pending, none or all
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        export: bool,
    },
    /// Manage members
    Members {
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        affiliation: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        delete: Option<String>,
        /// Show one member's current record
        #[arg(long)]
        show: Option<String>,
        /// Change a member's role (member, staff, admin, super_admin)
        #[arg(long, num_args = 2, value_names = ["ID", "ROLE"])]
        set_role: Option<Vec<String>>,
        #[arg(long)]
        export: bool,
    },
    /// Payment management
    Payments {
        #[arg(long, default_value = "unpaid")]
        tab: PaymentTab,
        #[arg(long)]
        event: Option<String>,
        #[arg(long)]
        member: Option<String>,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        confirm: Option<String>,
        #[arg(long)]
        receipt: Option<String>,
        #[arg(long)]
        export: bool,
    },
    /// Event-day check-in
    Checkin {
        event: String,
        member: Option<String>,
        /// Collect the fee when the member has not paid
        #[arg(long)]
        paid: bool,
    },
    /// Attendance analytics
    Analytics {
        #[arg(long)]
        period: Option<AnalyticsPeriod>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        affiliation: Option<String>,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        export: bool,
    },
    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum CacheCommand {
    Stats,
    List,
    Clear,
}

/// Log to a daily file so stdout stays clean for page output.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=debug).
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let appender = tracing_appender::rolling::daily(log_dir, "attendance.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = Config::load()?;
    let _guard = init_tracing(&config.cache_dir()?.join("logs"));
    info!(command = ?cli.command, "attendance starting");

    let ctx = AppContext::open(config)?;
    let output = Output {
        html: cli.html,
        out_dir: cli.out,
    };
    run(cli.command, ctx, &output).await
}

async fn run(command: Command, mut ctx: AppContext, output: &Output) -> Result<()> {
    use commands::*;

    match command {
        Command::Login { id, remember } => login(&mut ctx, id, remember).await,
        Command::Logout { forget } => logout(&ctx, forget).await,
        Command::Whoami => whoami(&ctx),
        Command::Home => home(&ctx, output).await,
        Command::Events { tab, search, refresh } => {
            events(&ctx, output, tab, search, refresh).await
        }
        Command::MyEvent {
            id,
            answer,
            notes,
            pay,
        } => my_event(&ctx, output, id, answer, notes, pay).await,
        Command::History {
            year,
            status,
            export,
        } => history(&ctx, output, year, status, export).await,
        Command::Receipts {
            year,
            status,
            receipt,
        } => receipts(&ctx, output, year, status, receipt).await,
        Command::Profile { change_password } => profile(&ctx, output, change_password).await,
        Command::Dashboard => dashboard(&ctx, output).await,
        Command::AdminEvents {
            status,
            sort,
            search,
            duplicate,
            delete,
        } => {
            admin_events(
                &ctx,
                output,
                AdminEventsArgs {
                    status,
                    sort,
                    search,
                    duplicate,
                    delete,
                },
            )
            .await
        }
        Command::Event {
            id,
            status,
            search,
            export,
        } => event_roster(&ctx, output, id, status, search, export).await,
        Command::Members {
            role,
            affiliation,
            search,
            delete,
            show,
            set_role,
            export,
        } => {
            members(
                &ctx,
                output,
                MembersArgs {
                    role,
                    affiliation,
                    search,
                    delete,
                    show,
                    set_role: set_role
                        .and_then(|pair| <[String; 2]>::try_from(pair).ok())
                        .map(|[id, role]| (id, role)),
                    export,
                },
            )
            .await
        }
        Command::Payments {
            tab,
            event,
            member,
            method,
            confirm,
            receipt,
            export,
        } => {
            payments(
                &ctx,
                output,
                PaymentsArgs {
                    tab,
                    event,
                    member,
                    method,
                    confirm,
                    receipt,
                    export,
                },
            )
            .await
        }
        Command::Checkin { event, member, paid } => {
            checkin(&ctx, output, event, member, paid).await
        }
        Command::Analytics {
            period,
            from,
            to,
            affiliation,
            position,
            tag,
            export,
        } => {
            analytics(
                &ctx,
                output,
                AnalyticsArgs {
                    period,
                    from,
                    to,
                    affiliation,
                    position,
                    tag,
                    export,
                },
            )
            .await
        }
        Command::Cache { action } => match action {
            CacheCommand::Stats => cache_stats(&ctx),
            CacheCommand::List => cache_list(&ctx),
            CacheCommand::Clear => cache_clear(&ctx),
        },
    }
}
