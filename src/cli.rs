use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use time::UtcOffset;
use webpush_scheduler::adapters::memory_queue::DEFAULT_RETRY_BACKOFF;
use webpush_scheduler::config::AppConfig;
use webpush_scheduler::push::consumer::DEFAULT_BATCH_SIZE;
use webpush_scheduler::push::{self, VapidConfigStatus};
use webpush_scheduler::types::push::VapidConfig;

pub(crate) enum RunOutcome {
    Serve {
        config: AppConfig,
        vapid: VapidConfig,
    },
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    if let Some(Command::Init(args)) = cli.command {
        let code = run_init(args);
        return RunOutcome::Exit(code);
    }

    let config = match resolve_config(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return RunOutcome::Exit(2);
        }
    };

    let vapid = match push::load_vapid_config(&config) {
        VapidConfigStatus::Ready(vapid) => vapid,
        VapidConfigStatus::Incomplete => {
            eprintln!(
                "error: incomplete VAPID configuration; set the private key, public key and subject"
            );
            return RunOutcome::Exit(2);
        }
        VapidConfigStatus::Missing => {
            eprintln!("error: VAPID credentials are required");
            eprintln!("run `webpush-scheduler init` to generate them");
            return RunOutcome::Exit(2);
        }
    };
    if let Err(err) = push::vapid::check_key_pair(&vapid) {
        eprintln!("error: {err}");
        return RunOutcome::Exit(2);
    }

    RunOutcome::Serve { config, vapid }
}

#[derive(Parser, Debug)]
#[command(
    name = "webpush-scheduler",
    version,
    about = "Schedules encrypted Web Push notifications"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "PUSH_BIND", default_value = "127.0.0.1:8787")]
    bind: SocketAddr,
    #[arg(long, env = "PUSH_VAPID_PRIVATE_KEY")]
    vapid_private_key: Option<String>,
    #[arg(long, env = "PUSH_VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "PUSH_VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "PUSH_DEBUG_TOKEN")]
    debug_token: Option<String>,
    #[arg(long, env = "PUSH_ALLOWED_ORIGIN", default_value = "*")]
    allowed_origin: String,
    #[arg(long, env = "PUSH_UTC_OFFSET", default_value = "+00:00")]
    utc_offset: String,
    #[arg(long, env = "PUSH_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    #[arg(long, env = "PUSH_RETRY_BACKOFF_SECS", default_value_t = DEFAULT_RETRY_BACKOFF.as_secs())]
    retry_backoff_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a fresh VAPID key pair.
    Init(InitArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
}

fn run_init(args: InitArgs) -> i32 {
    let credentials = match push::generate_vapid_credentials() {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("failed to generate VAPID credentials: {err}");
            return 1;
        }
    };
    let (subject, show_subject_note) = match args.subject {
        Some(subject) => (subject, false),
        None => ("mailto:you@example.com".to_string(), true),
    };

    println!("VAPID credentials generated.");
    println!();
    println!("PUSH_VAPID_PRIVATE_KEY=\"{}\"", credentials.private_key);
    println!("PUSH_VAPID_PUBLIC_KEY=\"{}\"", credentials.public_key);
    println!("PUSH_VAPID_SUBJECT=\"{subject}\"");
    if show_subject_note {
        println!();
        println!("Note: replace PUSH_VAPID_SUBJECT with a contact URI you control.");
    }
    println!();
    println!(
        "--vapid-private-key \"{}\" --vapid-public-key \"{}\" --vapid-subject \"{subject}\"",
        credentials.private_key, credentials.public_key
    );
    0
}

fn resolve_config(cli: Cli) -> Result<AppConfig, String> {
    let allowed_origin = cli.allowed_origin.trim().to_string();
    if allowed_origin.is_empty() {
        return Err("allowed origin cannot be empty".to_string());
    }
    if axum::http::HeaderValue::from_str(&allowed_origin).is_err() {
        return Err(format!("allowed origin '{allowed_origin}' is not a valid header value"));
    }
    if cli.batch_size == 0 {
        return Err("batch size must be greater than 0".to_string());
    }
    if cli.retry_backoff_secs == 0 {
        return Err("retry backoff must be greater than 0".to_string());
    }
    let debug_token = cli
        .debug_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    Ok(AppConfig {
        bind: cli.bind,
        vapid_private_key: non_empty(cli.vapid_private_key),
        vapid_public_key: non_empty(cli.vapid_public_key),
        vapid_subject: non_empty(cli.vapid_subject),
        debug_token,
        allowed_origin,
        utc_offset: parse_utc_offset(&cli.utc_offset)?,
        batch_size: cli.batch_size,
        retry_backoff: Duration::from_secs(cli.retry_backoff_secs),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_utc_offset(raw: &str) -> Result<UtcOffset, String> {
    let value = raw.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Ok(UtcOffset::UTC);
    }
    let invalid = || format!("invalid utc offset '{value}'; expected [+|-]HH:MM");

    let (sign, rest) = match value.chars().next() {
        Some('+') => (1, &value[1..]),
        Some('-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i8 = hours.parse().map_err(|_| invalid())?;
    let minutes: i8 = minutes.parse().map_err(|_| invalid())?;
    if hours < 0 || !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    UtcOffset::from_hms(sign * hours, sign * minutes, 0).map_err(|_| invalid())
}
