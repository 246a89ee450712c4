use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use covdash::api::{DashboardApi, HttpApi};
use covdash::cli::{self, AlertEdits, Style, DEFAULT_REPORT_LIMIT};
use covdash::prefs::{self, Theme};
use covdash::store::SqliteStore;

/// Derived coverage, drift and memory views for a test-generation
/// platform.
#[derive(Parser)]
#[command(name = "covdash", version, about)]
struct Cli {
    /// Base URL of the dashboard API.
    #[arg(long, global = true, env = "COVDASH_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Session cookie value used to authenticate.
    #[arg(long, global = true, env = "COVDASH_SESSION", hide_env_values = true)]
    session: Option<String>,

    /// Project to operate on.
    #[arg(long, global = true, env = "COVDASH_PROJECT")]
    project: Option<String>,

    /// Path to the local preferences database.
    #[arg(long, global = true, default_value = ".covdash.db")]
    db: PathBuf,

    /// Output style.
    #[arg(long, global = true, value_enum, default_value = "text")]
    style: Style,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-run rollup of recent reports.
    Runs {
        #[arg(long, default_value_t = DEFAULT_REPORT_LIMIT)]
        limit: usize,
    },

    /// Per-package rollup, best coverage first.
    Packages {
        #[arg(long, default_value_t = DEFAULT_REPORT_LIMIT)]
        limit: usize,
    },

    /// Per-pull-request rollup, most recent first.
    Prs {
        #[arg(long, default_value_t = DEFAULT_REPORT_LIMIT)]
        limit: usize,
    },

    /// Coverage trend, oldest first.
    Trend {
        #[arg(long, default_value_t = DEFAULT_REPORT_LIMIT)]
        limit: usize,
    },

    /// Per-file coverage of one report, worst files first.
    Heatmap {
        /// Report id.
        report: String,
    },

    /// Learned patterns and failed approaches.
    Memory,

    /// LLM token/cost usage and bug counts.
    Usage {
        #[arg(long, default_value_t = DEFAULT_REPORT_LIMIT)]
        limit: usize,
    },

    /// Drift check results with accepted baselines.
    Drift,

    /// Accept the current state of a drift check as the baseline.
    AcceptBaseline {
        /// Drift test name.
        test_name: String,
    },

    /// Show or update alert settings.
    Alerts {
        #[command(subcommand)]
        action: AlertsAction,
    },

    /// List recently used projects.
    Recent,

    /// Show or set the theme preference.
    Theme {
        #[arg(long)]
        set: Option<Theme>,
    },

    /// Show or set the sidebar state.
    Sidebar {
        #[arg(long)]
        collapsed: Option<bool>,
    },
}

#[derive(Subcommand)]
enum AlertsAction {
    Show,

    /// Update fields; pass an empty string to clear one.
    Set {
        #[arg(long)]
        webhook: Option<String>,
        #[arg(long)]
        daily_cost_usd: Option<String>,
        #[arg(long)]
        budget_percent: Option<String>,
        /// Comma-separated addresses.
        #[arg(long)]
        recipients: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        from: Option<String>,
        /// Seconds to wait for the server.
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Cli::parse();

    let store = SqliteStore::open(&args.db).context("Failed to open preferences database")?;
    let api: Arc<dyn DashboardApi> = Arc::new(HttpApi::new(&args.api_url, args.session.clone()));

    let project = || -> Result<String> {
        let project = args
            .project
            .clone()
            .context("--project (or COVDASH_PROJECT) is required for this command")?;
        prefs::visit_project(&store, &project)?;
        Ok(project)
    };

    let out = match args.command {
        Commands::Runs { limit } => cli::cmd_runs(api.as_ref(), &project()?, limit, args.style)?,
        Commands::Packages { limit } => {
            cli::cmd_packages(api.as_ref(), &project()?, limit, args.style)?
        }
        Commands::Prs { limit } => cli::cmd_prs(api.as_ref(), &project()?, limit, args.style)?,
        Commands::Trend { limit } => cli::cmd_trend(api.as_ref(), &project()?, limit, args.style)?,
        Commands::Heatmap { ref report } => cli::cmd_heatmap(api.as_ref(), report, args.style)?,
        Commands::Memory => cli::cmd_memory(api.as_ref(), &project()?, args.style)?,
        Commands::Usage { limit } => cli::cmd_usage(api.as_ref(), &project()?, limit, args.style)?,
        Commands::Drift => cli::cmd_drift(api.as_ref(), &store, &project()?, args.style)?,
        Commands::AcceptBaseline { ref test_name } => {
            cli::cmd_accept_baseline(&store, &project()?, test_name)?
        }
        Commands::Alerts { ref action } => match action {
            AlertsAction::Show => cli::cmd_alerts_show(api.as_ref(), &project()?, args.style)?,
            AlertsAction::Set {
                webhook,
                daily_cost_usd,
                budget_percent,
                recipients,
                provider,
                from,
                wait,
            } => {
                let edits = AlertEdits {
                    webhook: webhook.clone(),
                    daily_cost_usd: daily_cost_usd.clone(),
                    budget_percent: budget_percent.clone(),
                    recipients: recipients.clone(),
                    provider: provider.clone(),
                    from: from.clone(),
                };
                cli::cmd_alerts_set(
                    Arc::clone(&api),
                    &project()?,
                    edits,
                    Duration::from_secs(*wait),
                )?
            }
        },
        Commands::Recent => cli::cmd_recent(&store)?,
        Commands::Theme { set } => cli::cmd_theme(&store, set)?,
        Commands::Sidebar { collapsed } => cli::cmd_sidebar(&store, collapsed)?,
    };
    print!("{}", out);
    Ok(())
}
