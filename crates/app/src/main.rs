use std::fmt;

use passmate_core::model::UserId;
use services::{AppServices, Clock, SessionError};
use tracing_subscriber::EnvFilter;

mod terminal;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidUserId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Practice { topic: Option<String> },
    Mock,
    Review,
    Stats,
    Topics,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    command: Command,
    db_url: String,
    user_id: UserId,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  passmate practice [--topic <name>] [options]");
    eprintln!("  passmate mock     [options]   # timed exam with a mandatory topic");
    eprintln!("  passmate review   [options]   # drill outstanding mistakes");
    eprintln!("  passmate stats    [options]");
    eprintln!("  passmate topics   [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://passmate.sqlite3)");
    eprintln!("  --user <id>               Profile id (default: 1)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("During a session: type an option number to answer, press Enter to continue,");
    eprintln!("`q` to quit.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PASSMATE_DB_URL, PASSMATE_USER_ID, RUST_LOG");
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut db_url = std::env::var("PASSMATE_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://passmate.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = std::env::var("PASSMATE_USER_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| UserId::new(1), UserId::new);

        let mut args = argv.into_iter();
        let mut command = match args.next().as_deref() {
            None | Some("--help" | "-h") => return Ok(None),
            Some("practice") => Command::Practice { topic: None },
            Some("mock") => Command::Mock,
            Some("review") => Command::Review,
            Some("stats") => Command::Stats,
            Some("topics") => Command::Topics,
            Some(other) => return Err(ArgsError::UnknownCommand(other.to_owned())),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    user_id = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                }
                "--topic" => {
                    let value = require_value(&mut args, "--topic")?;
                    match &mut command {
                        Command::Practice { topic } => *topic = Some(value),
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                "--help" | "-h" => return Ok(None),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Some(Self {
            command,
            db_url,
            user_id,
        }))
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// `SQLite` refuses to open a missing file without `mode=rwc`; create it up front instead.
fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let Some(args) = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?
    else {
        print_usage();
        return Ok(());
    };

    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(&args.db_url, Clock::default_clock()).await?;
    tracing::debug!(db = %args.db_url, user = %args.user_id, command = ?args.command, "starting");

    let session_loop = services.session_loop();
    let started = match args.command {
        Command::Stats => {
            let snapshot = services.progress().snapshot(args.user_id, 5).await?;
            terminal::print_stats(&snapshot);
            return Ok(());
        }
        Command::Topics => {
            for topic in services.progress().topics().await? {
                println!("{topic}");
            }
            return Ok(());
        }
        Command::Practice { topic } => session_loop.start_practice(args.user_id, topic).await,
        Command::Mock => session_loop.start_mock_exam(args.user_id).await,
        Command::Review => session_loop.start_mistake_review(args.user_id).await,
    };

    let active = match started {
        Ok(active) => active,
        Err(SessionError::Empty) => {
            println!("No questions available. Seed the question bank or pick another topic.");
            return Ok(());
        }
        Err(SessionError::NoHearts { next_heart_at }) => {
            println!(
                "You are out of hearts. The next one is back at {}; review your mistakes meanwhile.",
                next_heart_at.format("%H:%M UTC")
            );
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    terminal::run_session(&session_loop, active).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("passmate=info,services=info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Option<Args>, ArgsError> {
        Args::parse(argv.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn parses_practice_with_topic_and_overrides() {
        let args = parse(&["practice", "--topic", "History", "--user", "7", "--db", "sqlite::memory:"])
            .unwrap()
            .unwrap();
        assert_eq!(
            args.command,
            Command::Practice {
                topic: Some("History".into())
            }
        );
        assert_eq!(args.user_id, UserId::new(7));
        assert_eq!(args.db_url, "sqlite::memory:");
    }

    #[test]
    fn topic_is_only_valid_for_practice() {
        assert!(matches!(
            parse(&["mock", "--topic", "x"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            parse(&["quiz"]),
            Err(ArgsError::UnknownCommand(_))
        ));
        assert!(parse(&[]).unwrap().is_none());
    }

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("sqlite:data/pm.sqlite3".into());
        assert!(url.starts_with("sqlite:///"), "{url}");
        assert!(url.ends_with("data/pm.sqlite3"), "{url}");
    }
}
