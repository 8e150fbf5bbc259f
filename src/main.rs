use anyhow::{Context, Result};
use cdpwrap::config::Config;
use cdpwrap::dispatch::ServiceCall;
use cdpwrap::poll::{StatusField, WaitSpec};
use cdpwrap::util::dumps;
use cdpwrap::{registry, CallOutcome, CdpError, CdpWrapper};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Command line client for the CDP control plane
#[derive(Parser, Debug)]
#[command(name = "cdpwrap", version, about, long_about = None)]
struct Args {
    /// Control plane endpoint override
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// CDP region used to derive the endpoint
    #[arg(long, global = true)]
    region: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    no_verify_tls: bool,

    /// Raise every remote error, even those a squelch rule would absorb
    #[arg(long, global = true)]
    strict: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Output format
    #[arg(long, value_enum, default_value = "json", global = true)]
    output: OutputFormat,

    /// Remember endpoint, region and TLS choice for later runs
    #[arg(long, global = true)]
    save: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call any operation directly
    Call {
        #[command(flatten)]
        target: Target,
        /// Child field of the response to return
        #[arg(long)]
        field: Option<String>,
        /// Print unmatched errors as output instead of failing
        #[arg(long)]
        return_error: bool,
    },
    /// Call a registered operation with its squelch rules and checks
    Op {
        #[command(flatten)]
        target: Target,
    },
    /// Poll a registered describe operation until it reaches a state
    Wait {
        #[command(flatten)]
        target: Target,
        /// Accepted state, repeatable; `None` waits for the object to disappear
        #[arg(long = "state", required = true)]
        states: Vec<String>,
        /// Status path in dot notation, defaults to `status`
        #[arg(long, conflicts_with = "heuristic")]
        field: Option<String>,
        /// Probe the usual status locations instead of a fixed path
        #[arg(long)]
        heuristic: bool,
        /// Seconds between polls
        #[arg(long, default_value_t = 15)]
        delay: u64,
        /// Seconds before giving up
        #[arg(long, default_value_t = 3600)]
        timeout: u64,
        /// Warn on failure states instead of stopping
        #[arg(long)]
        ignore_failures: bool,
    },
    /// List registered services, or the operations of one service
    Ops { service: Option<String> },
}

#[derive(ClapArgs, Debug)]
struct Target {
    service: String,
    operation: String,
    /// Parameter as key=value; values are parsed as JSON when possible
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cdpwrap started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cdpwrap").join("cdpwrap.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cdpwrap").join("cdpwrap.log");
    }
    PathBuf::from("cdpwrap.log")
}

/// `key=value` pairs; values that parse as JSON keep their type
fn parse_params(raw: &[String]) -> Result<Map<String, Value>> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("Parameter '{}' is not in key=value form", pair))?;
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
            Ok((key.to_string(), value))
        })
        .collect()
}

fn error_json(error: &CdpError) -> Value {
    json!({
        "kind": error.kind.to_string(),
        "error_code": error.error_code,
        "status_code": error.status_code,
        "service": error.service,
        "operation": error.operation,
        "request_id": error.request_id,
        "violations": error.violations.as_ref().map(|v| v.to_string()),
        "message": error.message,
        "rc": error.rc,
    })
}

fn render(value: &Value, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => dumps(value),
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

fn outcome_json(outcome: CallOutcome) -> Value {
    match outcome {
        CallOutcome::Value(value) | CallOutcome::Suppressed { default: value } => value,
        CallOutcome::Error(error) => error_json(&error),
        CallOutcome::Empty => Value::Null,
    }
}

async fn run(args: &Args, wrapper: &CdpWrapper) -> cdpwrap::Result<Value> {
    let params = |target: &Target| {
        parse_params(&target.params).map_err(|e| CdpError::usage(e.to_string()))
    };

    match &args.command {
        Command::Call {
            target,
            field,
            return_error,
        } => {
            let mut call =
                ServiceCall::new(&target.service, &target.operation).params(params(target)?);
            if let Some(field) = field {
                call = call.field(field.as_str());
            }
            if *return_error {
                call = call.return_error();
            }
            Ok(outcome_json(wrapper.call(call).await?))
        },
        Command::Op { target } => {
            let outcome = wrapper
                .invoke(&target.service, &target.operation, params(target)?)
                .await?;
            Ok(outcome_json(outcome))
        },
        Command::Wait {
            target,
            states,
            field,
            heuristic,
            delay,
            timeout,
            ignore_failures,
        } => {
            let describe = registry::registered_call(&target.service, &target.operation, params(target)?)?;

            let mut spec = WaitSpec::new()
                .delay(Duration::from_secs(*delay))
                .timeout(Duration::from_secs(*timeout));
            for state in states {
                spec = if state == "None" {
                    spec.until_gone()
                } else {
                    spec.until(state.as_str())
                };
            }
            if *heuristic {
                spec = spec.field(StatusField::Heuristic);
            } else if let Some(field) = field {
                spec = spec.field(StatusField::path(field));
            }
            if *ignore_failures {
                spec = spec.ignore_failures();
            }

            Ok(wrapper
                .wait_for_call(describe, &spec)
                .await?
                .unwrap_or(Value::Null))
        },
        Command::Ops { service } => Ok(match service {
            Some(service) => json!(registry::operations_for(service)),
            None => json!(registry::services()),
        }),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let mut config = Config::load();
    let mut wrapper_config = config
        .to_wrapper_config()
        .with_region(config.effective_region(args.region.as_deref()))
        .with_tls_verify(config.effective_tls_verify(args.no_verify_tls))
        .with_strict_errors(args.strict)
        .with_tls_warnings(true)
        .with_debug(matches!(args.log_level, LogLevel::Debug | LogLevel::Trace));
    wrapper_config.endpoint = config.effective_endpoint(args.endpoint.as_deref());

    if args.save {
        config.endpoint = wrapper_config.endpoint.clone();
        config.region = Some(wrapper_config.region.clone());
        config.tls_verify = Some(wrapper_config.tls_verify);
        config.save()?;
    }

    let wrapper = CdpWrapper::new(wrapper_config);
    tracing::info!("Using endpoint: {}", wrapper.endpoint());

    match run(&args, &wrapper).await {
        Ok(value) => {
            println!("{}", render(&value, args.output)?);
            Ok(ExitCode::SUCCESS)
        },
        Err(error) => {
            tracing::error!("{}", error);
            eprintln!("{}", render(&error_json(&error), args.output)?);
            Ok(ExitCode::from(u8::try_from(error.rc).unwrap_or(1)))
        },
    }
}
