//! `gstr` - GST return reconciliation from the command line.
//!
//! # Usage
//!
//! ```
//! gstr session create 29ABCDE1234F1Z5 --username acme
//! gstr session verify <SESSION_ID> 123456
//! gstr reconcile summary --session <SESSION_ID> --fy 2024 --quarter 1
//! gstr reconcile books-vs-credit --session <SESSION_ID> --fy 2024 --month 5 purchases.csv
//! ```
//!
//! Settings come from `gstr.toml` (or `--config`) and `GSTR__*` variables.
//! Every command prints its result as JSON on stdout.

mod books;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, Result, bail};
use clap::{Args, Parser, Subcommand};
use gstr_core::{
  Gstin, Period, PeriodDescriptor, cache::OwnerId, cache::ReturnType, period::Quarter,
};
use gstr_portal::PortalClient;
use gstr_service::{
  FetchContext, ReconciliationEngine, RunRequest, SessionManager, Settings, TokenProvider,
};
use gstr_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "gstr", version, about = "GST return reconciliation")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, env = "GSTR_CONFIG", default_value = "gstr.toml")]
  config: PathBuf,

  /// Consultant whose sessions, cache and reports are used.
  #[arg(long, env = "GSTR_OWNER", default_value = "default")]
  owner: String,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// OTP sessions with the portal
  Session {
    #[command(subcommand)]
    command: SessionCommand,
  },
  /// Fetch one cached return cell
  Fetch {
    #[command(subcommand)]
    command: FetchCommand,
    #[command(flatten)]
    run: RunArgs,
  },
  /// Run a reconciliation
  Reconcile {
    #[command(subcommand)]
    command: ReconcileCommand,
  },
  /// Cached portal responses
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },
  /// List archived reports for a GSTIN, newest first
  Reports { gstin: Gstin },
  /// Purge expired tokens, sessions and cache rows
  Maintain,
}

#[derive(Subcommand)]
enum SessionCommand {
  /// Request an OTP for a GSTIN
  Create {
    gstin:    String,
    #[arg(long)]
    username: String,
  },
  /// Submit the OTP for a pending session
  Verify {
    session_id: Uuid,
    otp:        String,
    /// Portal username, if different from the one used to request the OTP.
    #[arg(long)]
    username:   Option<String>,
  },
  /// Remaining lifetime of a session
  Status { session_id: Uuid },
}

/// A verified session plus the months to work on.
#[derive(Args, Clone)]
struct RunArgs {
  /// Verified session to fetch with.
  #[arg(long, env = "GSTR_SESSION")]
  session: Uuid,

  /// Ignore cached responses and refetch.
  #[arg(long, default_value_t = false)]
  refresh: bool,
}

/// Financial year plus at most one of month or quarter.
#[derive(Args, Clone)]
struct PeriodArgs {
  /// Year the financial year starts in (2024 means April 2024 to March 2025).
  #[arg(long)]
  fy:      i32,
  #[arg(long, conflicts_with = "quarter")]
  month:   Option<u32>,
  /// Quarter of the financial year, 1 to 4.
  #[arg(long)]
  quarter: Option<u32>,
}

impl PeriodArgs {
  fn descriptor(&self) -> Result<PeriodDescriptor> {
    let descriptor = match (self.month, self.quarter) {
      (Some(month), _) => PeriodDescriptor::Monthly { fy: self.fy, month },
      (None, Some(q)) => PeriodDescriptor::Quarterly {
        fy:      self.fy,
        quarter: Quarter::from_number(q)?,
      },
      (None, None) => PeriodDescriptor::FinancialYear { fy: self.fy },
    };
    // Surface an out-of-range month here rather than mid-run.
    descriptor.periods()?;
    Ok(descriptor)
  }
}

#[derive(Subcommand)]
enum FetchCommand {
  /// Outward-supply return summary
  Gstr1Summary { year: i32, month: u32 },
  /// One outward-supply section (b2b, b2cl, b2cs, cdnr, exp, ...)
  Gstr1Section { section: String, year: i32, month: u32 },
  /// Filed tax-summary return
  Gstr3b { year: i32, month: u32 },
  /// Liability the portal computes for the tax-summary return
  Gstr3bAutoLiability { year: i32, month: u32 },
  /// Credit statement
  Gstr2b { year: i32, month: u32 },
  /// One section of the auto-drafted credit return
  Gstr2aSection { section: String, year: i32, month: u32 },
  /// Registration details
  Details,
}

#[derive(Subcommand)]
enum ReconcileCommand {
  /// Outward liability vs the filed tax summary
  Summary {
    #[command(flatten)]
    run:    RunArgs,
    #[command(flatten)]
    period: PeriodArgs,
  },
  /// Credit statement vs credit claimed
  Credit {
    #[command(flatten)]
    run:    RunArgs,
    #[command(flatten)]
    period: PeriodArgs,
  },
  /// Summary and credit together
  Comprehensive {
    #[command(flatten)]
    run:    RunArgs,
    #[command(flatten)]
    period: PeriodArgs,
  },
  /// Sales books vs the filed tax summary
  BooksVsSummary {
    #[command(flatten)]
    run:    RunArgs,
    #[command(flatten)]
    period: PeriodArgs,
    /// Sales register as CSV.
    books:  PathBuf,
  },
  /// Sales books vs outward-supply sections
  BooksVsOutward {
    #[command(flatten)]
    run:    RunArgs,
    #[command(flatten)]
    period: PeriodArgs,
    books:  PathBuf,
  },
  /// Purchase books vs credit-statement invoices
  BooksVsCredit {
    #[command(flatten)]
    run:    RunArgs,
    #[command(flatten)]
    period: PeriodArgs,
    /// Purchase register as CSV.
    books:  PathBuf,
  },
  /// Two uploaded invoice lists; nothing is fetched
  Manual {
    gstin:  Gstin,
    #[command(flatten)]
    period: PeriodArgs,
    /// Invoices as filed by suppliers.
    filed:  PathBuf,
    /// Purchase register.
    books:  PathBuf,
  },
}

#[derive(Subcommand)]
enum CacheCommand {
  /// Drop every cached response for a GSTIN
  ClearGstin {
    gstin: Gstin,
    /// Clear for all owners, not just `--owner`.
    #[arg(long, default_value_t = false)]
    all_owners: bool,
  },
  /// Drop the cached responses for one return and month
  ClearPeriod {
    gstin:       Gstin,
    return_type: ReturnType,
    year:        i32,
    month:       u32,
  },
  /// Drop rows older than the TTL
  Purge {
    /// Override the configured TTL.
    #[arg(long)]
    ttl_days: Option<u32>,
  },
}

// ─── Main ─────────────────────────────────────────────────────────────────────

type Engine = ReconciliationEngine<SqliteStore, PortalClient>;

struct App {
  owner:    OwnerId,
  store:    Arc<SqliteStore>,
  portal:   Arc<PortalClient>,
  sessions: SessionManager<SqliteStore, PortalClient>,
  engine:   Engine,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config).context("failed to read settings")?;

  let store_path = expand_tilde(&settings.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = Arc::new(
    SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );
  let portal = Arc::new(
    PortalClient::new(settings.portal.clone()).context("failed to build portal client")?,
  );

  let app = App {
    owner: OwnerId::new(cli.owner),
    sessions: SessionManager::new(store.clone(), portal.clone()),
    engine: ReconciliationEngine::from_settings(store.clone(), portal.clone(), &settings),
    store,
    portal,
  };

  match cli.command {
    Command::Session { command } => app.session(command).await,
    Command::Fetch { command, run } => app.fetch(command, run).await,
    Command::Reconcile { command } => app.reconcile(command).await,
    Command::Cache { command } => app.cache(command).await,
    Command::Reports { gstin } => print(&app.engine.reports(&app.owner, &gstin).await?),
    Command::Maintain => app.maintain().await,
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

impl App {
  async fn session(&self, command: SessionCommand) -> Result<()> {
    match command {
      SessionCommand::Create { gstin, username } => {
        let session = self.sessions.create(self.owner.clone(), &gstin, &username).await?;
        print(&session)
      }
      SessionCommand::Verify { session_id, otp, username } => {
        let status = self
          .sessions
          .verify(&self.owner, session_id, &otp, username.as_deref())
          .await?;
        print(&status)
      }
      SessionCommand::Status { session_id } => {
        print(&self.sessions.status(&self.owner, session_id).await?)
      }
    }
  }

  /// A fetch context bound to a verified session.
  async fn context(&self, run: &RunArgs) -> Result<FetchContext> {
    let session = self.sessions.usable(&self.owner, run.session).await?;
    let Some(taxpayer_token) = session.taxpayer_token else {
      bail!("session {} has no taxpayer token", run.session);
    };
    Ok(FetchContext {
      owner: self.owner.clone(),
      gstin: session.gstin,
      taxpayer_token,
      force_refresh: run.refresh,
    })
  }

  async fn request(&self, run: &RunArgs, period: &PeriodArgs) -> Result<RunRequest> {
    let period = period.descriptor()?;
    let ctx = self.context(run).await?;
    Ok(RunRequest {
      owner: ctx.owner,
      gstin: ctx.gstin,
      period,
      taxpayer_token: ctx.taxpayer_token,
      force_refresh: ctx.force_refresh,
    })
  }

  async fn fetch(&self, command: FetchCommand, run: RunArgs) -> Result<()> {
    let ctx = self.context(&run).await?;
    let fetcher = self.engine.fetcher();
    let payload = match command {
      FetchCommand::Gstr1Summary { year, month } => {
        fetcher.gstr1_summary(&ctx, Period::new(year, month)?).await
      }
      FetchCommand::Gstr1Section { section, year, month } => {
        fetcher.gstr1_section(&ctx, &section, Period::new(year, month)?).await
      }
      FetchCommand::Gstr3b { year, month } => {
        fetcher.gstr3b_filed(&ctx, Period::new(year, month)?).await
      }
      FetchCommand::Gstr3bAutoLiability { year, month } => {
        fetcher.gstr3b_auto_liability(&ctx, Period::new(year, month)?).await
      }
      FetchCommand::Gstr2b { year, month } => {
        fetcher.gstr2b(&ctx, Period::new(year, month)?).await
      }
      FetchCommand::Gstr2aSection { section, year, month } => {
        fetcher.gstr2a_section(&ctx, &section, Period::new(year, month)?).await
      }
      FetchCommand::Details => fetcher.details(&ctx).await,
    };
    match payload {
      Some(value) => print(&value),
      None => bail!("no data returned; see the log for the upstream error"),
    }
  }

  async fn reconcile(&self, command: ReconcileCommand) -> Result<()> {
    let engine = &self.engine;
    match command {
      ReconcileCommand::Summary { run, period } => {
        print(&engine.summary(&self.request(&run, &period).await?).await?)
      }
      ReconcileCommand::Credit { run, period } => {
        print(&engine.credit(&self.request(&run, &period).await?).await?)
      }
      ReconcileCommand::Comprehensive { run, period } => {
        print(&engine.comprehensive(&self.request(&run, &period).await?).await?)
      }
      ReconcileCommand::BooksVsSummary { run, period, books } => {
        let table = books::load(&books)?;
        let req = self.request(&run, &period).await?;
        print(&engine.books_vs_summary(&req, &table).await?)
      }
      ReconcileCommand::BooksVsOutward { run, period, books } => {
        let table = books::load(&books)?;
        let req = self.request(&run, &period).await?;
        print(&engine.books_vs_outward(&req, &table).await?)
      }
      ReconcileCommand::BooksVsCredit { run, period, books } => {
        let table = books::load(&books)?;
        let req = self.request(&run, &period).await?;
        print(&engine.books_vs_credit(&req, &table).await?)
      }
      ReconcileCommand::Manual { gstin, period, filed, books } => {
        let filed = books::load(&filed)?;
        let books = books::load(&books)?;
        let report = engine
          .manual_credit_match(&self.owner, &gstin, &period.descriptor()?, &filed, &books)
          .await?;
        print(&report)
      }
    }
  }

  async fn cache(&self, command: CacheCommand) -> Result<()> {
    let cache = self.engine.fetcher().cache();
    let removed = match command {
      CacheCommand::ClearGstin { gstin, all_owners } => {
        let owner = (!all_owners).then_some(&self.owner);
        cache.clear_for_gstin(owner, &gstin).await?
      }
      CacheCommand::ClearPeriod { gstin, return_type, year, month } => {
        cache
          .clear_for_period(&gstin, return_type, Period::new(year, month)?)
          .await?
      }
      CacheCommand::Purge { ttl_days } => cache.purge_expired(ttl_days).await?,
    };
    print(&serde_json::json!({ "removed": removed }))
  }

  async fn maintain(&self) -> Result<()> {
    let tokens = TokenProvider::new(self.store.clone(), self.portal.clone())
      .purge_expired()
      .await?;
    let sessions = self.sessions.sweep_expired().await?;
    let responses = self.engine.fetcher().cache().purge_expired(None).await?;
    tracing::info!(tokens, sessions, responses, "maintenance complete");
    print(&serde_json::json!({
      "tokens": tokens,
      "sessions": sessions,
      "responses": responses,
    }))
  }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn cli_definition_is_consistent() { Cli::command().debug_assert(); }

  #[test]
  fn quarter_args_build_a_quarterly_descriptor() {
    let args = PeriodArgs { fy: 2024, month: None, quarter: Some(2) };
    assert_eq!(
      args.descriptor().unwrap(),
      PeriodDescriptor::Quarterly { fy: 2024, quarter: Quarter::Q2 }
    );
  }

  #[test]
  fn bare_fy_is_the_whole_year() {
    let args = PeriodArgs { fy: 2024, month: None, quarter: None };
    assert_eq!(args.descriptor().unwrap().periods().unwrap().len(), 12);
  }

  #[test]
  fn bad_month_and_quarter_are_rejected() {
    assert!(PeriodArgs { fy: 2024, month: Some(13), quarter: None }.descriptor().is_err());
    assert!(PeriodArgs { fy: 2024, month: None, quarter: Some(5) }.descriptor().is_err());
  }

  #[test]
  fn parses_a_nested_reconcile_command() {
    let cli = Cli::try_parse_from([
      "gstr",
      "reconcile",
      "books-vs-credit",
      "--session",
      "67e55044-10b1-426f-9247-bb680e5fe0c8",
      "--fy",
      "2024",
      "--month",
      "5",
      "purchases.csv",
    ])
    .unwrap();
    let Command::Reconcile { command: ReconcileCommand::BooksVsCredit { period, books, .. } } =
      cli.command
    else {
      panic!("wrong command");
    };
    assert_eq!(period.month, Some(5));
    assert_eq!(books, PathBuf::from("purchases.csv"));
  }

  #[test]
  fn expands_home() {
    let home = std::env::var("HOME").unwrap_or_default();
    if home.is_empty() {
      return;
    }
    assert_eq!(expand_tilde(Path::new("~/x.db")), PathBuf::from(home).join("x.db"));
    assert_eq!(expand_tilde(Path::new("/tmp/x.db")), PathBuf::from("/tmp/x.db"));
  }
}
