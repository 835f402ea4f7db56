//! Flowline CLI Entry Point
//!
//! Drives a built-in document review process one segment per invocation.
//! The ticket (and with it the state the process reached) is stored as JSON
//! under the state directory between runs.
//!
//! # Usage
//!
//! ```bash
//! # Submit ticket 42 for review
//! flowline 42
//!
//! # Run the review checks, then publish
//! flowline 42
//! flowline 42
//!
//! # Fail on the first step error, keep tickets elsewhere
//! flowline 42 --strict --state-dir /tmp/tickets
//!
//! # Load settings from a YAML file
//! flowline 42 --config flowline.yaml
//! ```

use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use flowline::execution::Interval;
use flowline::stateful::{Process, StateRecord, StatefulObject, StatefulWorkflow, WorkflowMediator};
use flowline::workflow::{Operation, StateId, WorkflowId};
use flowline::{load_config, EngineConfig, FlowError, APP_NAME, VERSION};

/// Identity of the built-in review process.
const REVIEW_WORKFLOW: &str = "document-review";

/// Checks run side by side during review.
const REVIEW_CHECKS: [&str; 3] = ["spelling", "links", "formatting"];

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    ticket_id: Option<String>,
    config_path: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    strict: bool,
    verbose: bool,
}

/// One line of a ticket's history.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct HistoryEntry {
    at: DateTime<Utc>,
    event: String,
}

/// Persisted form of a ticket.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct TicketData {
    id: String,
    history: Vec<HistoryEntry>,
    states: StateRecord,
}

/// Shared handle to a ticket; parallel checks write to the same data.
#[derive(Clone, Debug)]
struct Ticket {
    inner: Arc<Mutex<TicketData>>,
}

impl Ticket {
    fn new(id: &str) -> Self {
        Self::from_data(TicketData {
            id: id.to_string(),
            ..TicketData::default()
        })
    }

    fn from_data(data: TicketData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(data)),
        }
    }

    fn data(&self) -> MutexGuard<'_, TicketData> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: impl Into<String>) {
        let event = event.into();
        debug!("Ticket '{}': {}", self.data().id, event);
        self.data().history.push(HistoryEntry {
            at: Utc::now(),
            event,
        });
    }

    fn file_path(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{}.state", id))
    }

    /// Loads a ticket from the state directory, or creates a fresh one.
    fn load_or_new(dir: &Path, id: &str) -> Result<Self, Box<dyn Error>> {
        let path = Self::file_path(dir, id);
        if !path.exists() {
            info!("New ticket: {}", id);
            return Ok(Self::new(id));
        }

        let content = fs::read_to_string(&path)?;
        let data: TicketData = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse ticket file '{}': {}", path.display(), e))?;

        info!("Loaded ticket from {}", path.display());
        Ok(Self::from_data(data))
    }

    fn save(&self, dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
        fs::create_dir_all(dir)?;

        let data = self.data().clone();
        let path = Self::file_path(dir, &data.id);
        fs::write(&path, serde_json::to_string_pretty(&data)?)?;

        info!("Saved ticket to {}", path.display());
        Ok(path)
    }
}

impl StatefulObject for Ticket {
    fn state_id(&self, workflow: &WorkflowId) -> Option<StateId> {
        self.data().states.state_id(workflow)
    }

    fn set_state_id(&mut self, workflow: &WorkflowId, state: StateId) {
        self.data().states.set_state_id(workflow, state);
    }
}

fn note(event: &'static str) -> Operation<Ticket> {
    Operation::function(move |ticket: Ticket| {
        ticket.record(event);
        ticket
    })
}

/// The review process: submit, run the checks in parallel, publish.
struct ReviewProcess {
    strict: bool,
}

impl Process<Ticket> for ReviewProcess {
    fn define(&self) -> Result<StatefulWorkflow<Ticket>, FlowError> {
        let mut workflow = StatefulWorkflow::new(REVIEW_WORKFLOW)
            .step(note("submitted for review"))?
            .yield_at("submitted")?
            .step(note("review started"))?;

        for check in REVIEW_CHECKS {
            workflow = workflow.and(note(check))?;
        }

        let workflow = workflow
            .then()
            .yield_at("reviewed")?
            .step(Operation::command(Interval::millis(10)))?
            .step(note("published"))?;

        Ok(if self.strict { workflow.strict() } else { workflow })
    }

    fn validate(&self, ticket: &Ticket) -> bool {
        !ticket.data().id.trim().is_empty()
    }

    fn on_finished(&self, ticket: &Ticket, from: Option<&StateId>, to: Option<&StateId>) {
        let describe = |s: Option<&StateId>| s.map_or("<none>".to_string(), |s| s.to_string());
        info!(
            "Ticket '{}' moved from {} to {}",
            ticket.data().id,
            describe(from),
            describe(to)
        );
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Workflow Composition Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: flowline [OPTIONS] <TICKET_ID>");
    println!();
    println!("Arguments:");
    println!("  <TICKET_ID>         Ticket to move through the review process");
    println!();
    println!("Options:");
    println!("  --config PATH       Load engine settings from a YAML file");
    println!("  --state-dir PATH    Directory holding ticket files");
    println!("  --strict            Abort on the first failing step");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  flowline 42");
    println!("  flowline 42 --state-dir /tmp/tickets --strict");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--strict" => {
                config.strict = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a path argument".to_string());
                }
                config.config_path = Some(PathBuf::from(&args[i]));
            }
            "--state-dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("--state-dir requires a path argument".to_string());
                }
                config.state_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.ticket_id.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.ticket_id = Some(arg.clone());
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Merges file settings with command-line flags; flags win.
fn resolve_settings(config: &Config) -> Result<EngineConfig, FlowError> {
    let mut settings = match &config.config_path {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    if config.strict {
        settings.strict = true;
    }
    if config.verbose {
        settings.log_level = "debug".to_string();
    }
    if let Some(dir) = &config.state_dir {
        settings.state_dir = dir.clone();
    }

    Ok(settings)
}

/// Runs the next review segment for one ticket and saves it.
fn advance(settings: &EngineConfig, ticket_id: &str) -> Result<Ticket, Box<dyn Error>> {
    let mediator = WorkflowMediator::new(ReviewProcess {
        strict: settings.strict,
    });

    let ticket = Ticket::load_or_new(&settings.state_dir, ticket_id)?;

    if mediator.has_been_in_workflow(&ticket)? == Some(true) && !mediator.is_in_workflow(&ticket)? {
        warn!("Ticket '{}' has already completed the review", ticket_id);
    }

    let ticket = mediator.start(ticket)?;
    ticket.save(&settings.state_dir)?;

    let next = mediator.possible_transitions(&ticket)?;
    if next.is_empty() {
        info!("No further transitions for ticket '{}'", ticket_id);
    }
    for transition in next {
        info!("Next: {}", transition);
    }

    Ok(ticket)
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    let settings = resolve_settings(&config)?;

    setup_logging(&settings.log_level);
    print_banner();

    let Some(ticket_id) = config.ticket_id else {
        print_usage();
        return Err("a ticket id is required".into());
    };

    info!("State directory: {}", settings.state_dir.display());
    if settings.strict {
        info!("Mode: STRICT (any failing step aborts the segment)");
    }

    advance(&settings, &ticket_id)?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
