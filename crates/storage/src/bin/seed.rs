use std::fmt;
use std::path::PathBuf;

use passmate_core::model::{DEFAULT_MANDATORY_TOPIC, Question, QuestionDraft, QuestionId, UserId};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    file: Option<PathBuf>,
    user_id: UserId,
    hearts: Option<u32>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUserId { raw: String },
    InvalidHearts { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidHearts { raw } => write!(f, "invalid --hearts value: {raw}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PASSMATE_DB_URL")
            .unwrap_or_else(|_| "sqlite://passmate.sqlite3?mode=rwc".into());
        let mut file = std::env::var("PASSMATE_BANK").ok().map(PathBuf::from);
        let mut user_id = std::env::var("PASSMATE_USER_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| UserId::new(1), UserId::new);
        let mut hearts = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--file" => {
                    file = Some(PathBuf::from(require_value(&mut args, "--file")?));
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    user_id = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                }
                "--hearts" => {
                    let value = require_value(&mut args, "--hearts")?;
                    hearts = Some(
                        value
                            .parse::<u32>()
                            .map_err(|_| ArgsError::InvalidHearts { raw: value.clone() })?,
                    );
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            file,
            user_id,
            hearts,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://passmate.sqlite3?mode=rwc)");
    eprintln!("  --file <path>             JSON array of questions (default: built-in sample bank)");
    eprintln!("  --user <id>               Profile to reset hearts for (default: 1)");
    eprintln!("  --hearts <n>              Reset the stored heart balance");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PASSMATE_DB_URL, PASSMATE_BANK, PASSMATE_USER_ID");
}

/// Parse a JSON bank, reporting the first invalid entry.
fn parse_bank(raw: &str) -> Result<Vec<Question>, Box<dyn std::error::Error>> {
    let drafts: Vec<QuestionDraft> = serde_json::from_str(raw)?;
    let mut questions = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.into_iter().enumerate() {
        let id = draft.id;
        let question = draft
            .validate()
            .map_err(passmate_core::Error::from)
            .map_err(|e| format!("question #{index} (id {id}): {e}"))?;
        questions.push(question);
    }
    Ok(questions)
}

fn sample_bank() -> Result<Vec<Question>, passmate_core::Error> {
    let samples: [(&str, [&str; 4], usize, &str, &str); 6] = [
        (
            "What is the supreme law of the land?",
            ["The Constitution", "The Bill of Rights", "A presidential order", "State law"],
            0,
            "Every law and court decision must agree with the Constitution.",
            DEFAULT_MANDATORY_TOPIC,
        ),
        (
            "What are the first ten amendments to the Constitution called?",
            ["The Federalist Papers", "The Bill of Rights", "The Articles", "The Preamble"],
            1,
            "The Bill of Rights was ratified in 1791.",
            DEFAULT_MANDATORY_TOPIC,
        ),
        (
            "Which right is protected by the First Amendment?",
            ["To bear arms", "Freedom of speech", "A jury trial", "To vote at 16"],
            1,
            "Speech, religion, assembly, press, and petition.",
            DEFAULT_MANDATORY_TOPIC,
        ),
        (
            "How many U.S. Senators are there?",
            ["50", "100", "435", "535"],
            1,
            "Two senators for each of the fifty states.",
            "System of government",
        ),
        (
            "Who is in charge of the executive branch?",
            ["The Speaker", "The Chief Justice", "The President", "The Senate"],
            2,
            "The President heads the executive branch.",
            "System of government",
        ),
        (
            "When was the Declaration of Independence adopted?",
            ["1776", "1787", "1791", "1812"],
            0,
            "It was adopted on July 4, 1776.",
            "American history",
        ),
    ];

    samples
        .into_iter()
        .zip(1_u64..)
        .map(|((text, options, correct, explanation, topic), id)| {
            Question::new(
                QuestionId::new(id),
                text,
                options.into_iter().map(str::to_owned).collect(),
                correct,
                explanation,
                topic,
            )
            .map_err(passmate_core::Error::from)
        })
        .collect()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let questions = match &args.file {
        Some(path) => parse_bank(&std::fs::read_to_string(path)?)?,
        None => sample_bank()?,
    };

    let storage = Storage::sqlite(&args.db_url).await?;
    for question in &questions {
        storage.questions.upsert_question(question).await?;
    }
    if let Some(hearts) = args.hearts {
        storage
            .profiles
            .set_hearts(args.user_id, hearts, chrono::Utc::now())
            .await?;
    }

    let topics = storage.questions.list_topics().await?;
    tracing::info!(count = questions.len(), topics = topics.len(), "question bank seeded");
    println!(
        "Seeded {} questions across {} topics into {}",
        questions.len(),
        topics.len(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storage=info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
