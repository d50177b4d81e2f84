//! Risk CLI - inspect relapse-risk estimates for an event log or database
//!
//! Commands:
//! - report: every estimate at once
//! - profile / peak / live / harbor / predict: single estimators
//! - gate: auto-trigger decision for a risk value
//! - recommend / accuracy: intervention history
//! - doctor: check the store and configuration

use chrono::{DateTime, FixedOffset, Local};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use relapse_risk::clock::{Clock, ManualClock, SystemClock};
use relapse_risk::store::{check_utc_offset, EventStore, MemoryStore, SqliteStore};
use relapse_risk::{EngineConfig, RiskEngine, RiskError, VERSION};

/// Risk - on-device relapse-risk estimation
#[derive(Parser)]
#[command(name = "risk")]
#[command(version = VERSION)]
#[command(about = "Estimate relapse risk from a local event log", long_about = None)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// JSON event-log document
    #[arg(long, global = true, conflicts_with = "db")]
    log: Option<PathBuf>,

    /// SQLite database written by the logging layer
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// UTC offset in minutes used to bucket database events by hour
    /// [default: offset of --now, else the device's local offset]
    #[arg(long, global = true, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,

    /// Engine configuration JSON (missing fields take defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluate at this instant (RFC 3339) instead of the device clock
    #[arg(long, global = true)]
    now: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Estimate(Estimate),
    /// Diagnose store and configuration
    Doctor,
}

#[derive(Subcommand)]
enum Estimate {
    /// Full risk report
    Report,
    /// 24-hour baseline curve
    Profile,
    /// Peak risk window
    Peak,
    /// Live, frequency and profile-hour risk
    Live,
    /// Next safe hours (profile and frequency based)
    Harbor,
    /// Logistic prediction with explanation
    Predict,
    /// Auto-trigger decision
    Gate {
        /// Risk to evaluate; defaults to the current assessment
        #[arg(long)]
        risk: Option<u8>,
    },
    /// Most effective intervention type
    Recommend,
    /// Retrospective prediction accuracy
    Accuracy,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<(), RiskCliError> {
    let args = cli.source;
    let pretty = args.pretty || atty::is(atty::Stream::Stdout);

    let estimate = match cli.command {
        Commands::Estimate(estimate) => estimate,
        Commands::Doctor => return cmd_doctor(&args, pretty),
    };

    let config = load_config(args.config.as_deref())?;
    let clock = load_clock(args.now.as_deref())?;

    let output = match (&args.log, &args.db) {
        (Some(path), _) => {
            let store = MemoryStore::from_json(&fs::read_to_string(path)?)?;
            execute(&RiskEngine::with_clock(store, config, clock)?, &estimate)?
        }
        (None, Some(path)) => {
            let store = SqliteStore::open(path, store_offset_minutes(&args)?)?;
            execute(&RiskEngine::with_clock(store, config, clock)?, &estimate)?
        }
        (None, None) => return Err(RiskCliError::NoSource),
    };

    print_json(&output, pretty)
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, RiskCliError> {
    match path {
        Some(path) => Ok(EngineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::default()),
    }
}

fn load_clock(now: Option<&str>) -> Result<Box<dyn Clock>, RiskCliError> {
    match now {
        Some(value) => {
            let now = DateTime::<FixedOffset>::parse_from_rfc3339(value)
                .map_err(|e| RiskCliError::BadTime(format!("{value}: {e}")))?;
            Ok(Box::new(ManualClock::new(now)))
        }
        None => Ok(Box::new(SystemClock)),
    }
}

/// Offset the database was bucketed with; falls back to the offset of
/// `--now`, then to the device's local offset
fn store_offset_minutes(args: &SourceArgs) -> Result<i32, RiskCliError> {
    let minutes = match (args.utc_offset_minutes, args.now.as_deref()) {
        (Some(minutes), _) => minutes,
        (None, Some(now)) => DateTime::<FixedOffset>::parse_from_rfc3339(now)
            .map_err(|e| RiskCliError::BadTime(format!("{now}: {e}")))?
            .offset()
            .local_minus_utc()
            / 60,
        (None, None) => Local::now().offset().local_minus_utc() / 60,
    };
    Ok(check_utc_offset(minutes)?)
}

fn execute<S: EventStore>(
    engine: &RiskEngine<S>,
    estimate: &Estimate,
) -> Result<serde_json::Value, RiskCliError> {
    let value = match estimate {
        Estimate::Report => serde_json::to_value(engine.report())?,
        Estimate::Profile => serde_json::to_value(engine.hourly_profile())?,
        Estimate::Peak => serde_json::to_value(engine.peak_window())?,
        Estimate::Live => {
            let live = engine.live_risk();
            json!({
                "live_risk": live,
                "frequency_risk": engine.frequency_risk(),
                "profile_hour_risk": engine.profile_hour_risk(),
                "current_assessment": engine.current_assessment(),
                "spike_risk": engine.spike_risk(live),
            })
        }
        Estimate::Harbor => json!({
            "profile": engine.safe_harbor(),
            "frequency": engine.frequency_safe_harbor(),
        }),
        Estimate::Predict => json!({
            "features": engine.prediction_features(),
            "prediction": *engine.predict(),
        }),
        Estimate::Gate { risk } => {
            let risk = risk.unwrap_or_else(|| engine.current_assessment());
            json!({
                "risk": risk,
                "should_auto_trigger": engine.should_auto_trigger(risk),
            })
        }
        Estimate::Recommend => serde_json::to_value(engine.recommend())?,
        Estimate::Accuracy => json!({ "accuracy": engine.accuracy() }),
    };
    Ok(value)
}

fn print_json(value: &serde_json::Value, pretty: bool) -> Result<(), RiskCliError> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

fn cmd_doctor(args: &SourceArgs, pretty: bool) -> Result<(), RiskCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck::ok("version", format!("relapse-risk {VERSION}")));

    match load_config(args.config.as_deref()) {
        Ok(_) if args.config.is_some() => {
            checks.push(DoctorCheck::ok("config", "Config file valid"))
        }
        Ok(_) => checks.push(DoctorCheck::ok("config", "Using default configuration")),
        Err(e) => checks.push(DoctorCheck::error("config", CliError::from(e).message)),
    }

    if let Some(now) = args.now.as_deref() {
        match load_clock(Some(now)) {
            Ok(_) => checks.push(DoctorCheck::ok("now", format!("Evaluating at {now}"))),
            Err(e) => checks.push(DoctorCheck::error("now", CliError::from(e).message)),
        }
    }

    match (&args.log, &args.db) {
        (Some(path), _) => match fs::read_to_string(path)
            .map_err(RiskCliError::from)
            .and_then(|json| Ok(MemoryStore::from_json(&json)?))
        {
            Ok(store) => {
                checks.push(DoctorCheck::ok("store", "Event log readable"));
                checks.push(profile_check(&store));
            }
            Err(e) => checks.push(DoctorCheck::error("store", CliError::from(e).message)),
        },
        (None, Some(path)) => match store_offset_minutes(args)
            .and_then(|offset| Ok(SqliteStore::open(path, offset)?))
        {
            Ok(store) => {
                checks.push(DoctorCheck::ok("store", "Database reachable"));
                match store.schema_version() {
                    Ok(version) => checks.push(DoctorCheck::ok(
                        "schema_version",
                        format!("Schema version {version}"),
                    )),
                    Err(e) => checks.push(DoctorCheck::error("schema_version", e.to_string())),
                }
                checks.push(profile_check(&store));
            }
            Err(e) => checks.push(DoctorCheck::error("store", CliError::from(e).message)),
        },
        (None, None) => checks.push(DoctorCheck::warning("store", "No --log or --db given")),
    }

    let report = DoctorReport {
        version: VERSION.to_string(),
        checks,
    };
    print_json(&serde_json::to_value(&report)?, pretty)?;

    if report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error)) {
        Err(RiskCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn profile_check<S: EventStore>(store: &S) -> DoctorCheck {
    match store.latest_profile() {
        Ok(Some(_)) => DoctorCheck::ok("profile", "Onboarding profile present"),
        Ok(None) => DoctorCheck::warning("profile", "No onboarding profile; using flat default"),
        Err(e) => DoctorCheck::error("profile", e.to_string()),
    }
}

// Error types

#[derive(Debug)]
enum RiskCliError {
    Io(io::Error),
    Risk(RiskError),
    Json(serde_json::Error),
    BadTime(String),
    NoSource,
    DoctorFailed,
}

impl From<io::Error> for RiskCliError {
    fn from(e: io::Error) -> Self {
        RiskCliError::Io(e)
    }
}

impl From<RiskError> for RiskCliError {
    fn from(e: RiskError) -> Self {
        RiskCliError::Risk(e)
    }
}

impl From<serde_json::Error> for RiskCliError {
    fn from(e: serde_json::Error) -> Self {
        RiskCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RiskCliError> for CliError {
    fn from(e: RiskCliError) -> Self {
        match e {
            RiskCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RiskCliError::Risk(RiskError::InvalidConfig(msg)) => CliError {
                code: "INVALID_CONFIG".to_string(),
                message: msg,
                hint: Some("Check the config file against the documented defaults".to_string()),
            },
            RiskCliError::Risk(RiskError::InvalidInput(msg)) => CliError {
                code: "INVALID_INPUT".to_string(),
                message: msg,
                hint: Some("UTC offsets must lie within -840..=840 minutes".to_string()),
            },
            RiskCliError::Risk(e) => CliError {
                code: "STORE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'risk doctor' for details".to_string()),
            },
            RiskCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RiskCliError::BadTime(msg) => CliError {
                code: "BAD_TIME".to_string(),
                message: msg,
                hint: Some("Use RFC 3339, e.g. 2024-01-15T23:10:00+01:00".to_string()),
            },
            RiskCliError::NoSource => CliError {
                code: "NO_SOURCE".to_string(),
                message: "No event source given".to_string(),
                hint: Some("Pass --log <file.json> or --db <file.sqlite>".to_string()),
            },
            RiskCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Ok, message)
    }

    fn warning(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warning, message)
    }

    fn error(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Error, message)
    }

    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
