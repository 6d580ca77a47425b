//! Line-based session runner for the terminal.

use passmate_core::model::Outcome;
use passmate_core::session::FinishReason;
use services::{
    ActiveSession, AnswerFeedback, Countdown, ProgressSnapshot, SessionError, SessionLoopService,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Choose(usize),
    Continue,
    Quit,
    Unknown,
}

impl Input {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Self::Continue,
            "q" | "quit" => Self::Quit,
            other => match other.parse::<usize>() {
                Ok(n) if n >= 1 => Self::Choose(n - 1),
                _ => Self::Unknown,
            },
        }
    }
}

async fn next_tick(countdown: &mut Option<Countdown>) {
    match countdown {
        Some(countdown) => countdown.tick().await,
        None => std::future::pending().await,
    }
}

/// Drive one session from stdin until it finishes or the user quits.
///
/// Input and the countdown race in one `select!`; whichever finishes the session first wins
/// and later input is rejected by the engine.
pub async fn run_session(
    svc: &SessionLoopService,
    mut active: ActiveSession,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut countdown = active
        .session()
        .settings()
        .has_timer()
        .then(Countdown::per_second);

    print_question(&active);
    while !active.is_finished() {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = next_tick(&mut countdown) => {
                svc.tick(&mut active).await?;
                print_clock(&active);
                continue;
            }
        };

        let Some(line) = line else {
            println!("Input closed; session abandoned. Logged mistakes are kept.");
            return Ok(());
        };

        let step = match Input::parse(&line) {
            Input::Quit => {
                println!("Session abandoned. Logged mistakes are kept.");
                return Ok(());
            }
            Input::Unknown => {
                println!("Type an option number, Enter to continue, or q to quit.");
                continue;
            }
            Input::Choose(option) => answer(svc, &mut active, option).await,
            Input::Continue => svc.advance(&mut active).await.map(|()| {
                if !active.is_finished() {
                    print_question(&active);
                }
            }),
        };

        match step {
            Ok(()) => {}
            Err(SessionError::Rejected(rejection)) => println!("({rejection})"),
            Err(err) => return Err(err.into()),
        }
    }

    if active.session().finish_reason() == Some(FinishReason::TimeExpired) {
        println!("\nTime is up.");
    }
    if active.needs_finalize() {
        match svc.finalize_outcome(&mut active).await {
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "outcome still not saved"),
        }
    }
    if let Some(outcome) = active.outcome() {
        print_outcome(outcome);
    }
    Ok(())
}

async fn answer(
    svc: &SessionLoopService,
    active: &mut ActiveSession,
    option: usize,
) -> Result<(), SessionError> {
    svc.select(active, option).await?;
    let feedback = svc.check(active).await?;
    print_feedback(&feedback);
    if !feedback.finished {
        println!("Press Enter to continue.");
    }
    Ok(())
}

fn print_question(active: &ActiveSession) {
    let session = active.session();
    let Some(question) = session.current_question() else {
        return;
    };
    let progress = session.progress();

    println!();
    print!("[{}/{}]", session.current_index() + 1, progress.total);
    if let Some(lives) = session.lives_remaining() {
        print!("  hearts: {lives}");
    }
    if let Some(secs) = session.remaining_secs() {
        print!("  {}:{:02} left", secs / 60, secs % 60);
    }
    println!();
    println!("{}", question.text());
    for (i, option) in question.options().iter().enumerate() {
        println!("  {}) {option}", i + 1);
    }
}

fn print_clock(active: &ActiveSession) {
    if let Some(secs @ (60 | 10)) = active.session().remaining_secs() {
        println!("  ({secs} seconds left)");
    }
}

fn print_feedback(feedback: &AnswerFeedback) {
    if feedback.correct {
        println!("Correct!");
    } else {
        println!("Not quite. The answer is option {}.", feedback.correct_index + 1);
    }
    if !feedback.explanation.is_empty() {
        println!("{}", feedback.explanation);
    }
    if let Some(lives) = feedback.lives_remaining {
        println!("Hearts left: {lives}");
    }
}

fn print_outcome(outcome: &Outcome) {
    println!();
    println!(
        "Score: {}/{} ({} needed)",
        outcome.correct_count(),
        outcome.total_count(),
        outcome.verdict().required_correct
    );
    if let Some(tally) = outcome.mandatory() {
        println!("Mandatory questions: {}/{}", tally.correct, tally.total);
    }
    if outcome.is_perfect() {
        println!("Perfect score!");
    } else if outcome.passed() {
        println!("Passed.");
    } else {
        println!("Not passed this time.");
    }
    println!("+{} XP", outcome.experience_awarded());
    for achievement in outcome.unlocked_achievements() {
        println!("Achievement unlocked: {}", achievement.title());
    }
    if outcome.is_degraded() {
        println!("(Progress could not be saved; achievements will show next time.)");
    }
}

pub fn print_stats(snapshot: &ProgressSnapshot) {
    println!("Experience: {}", snapshot.total_experience);
    match snapshot.hearts {
        Some(hearts) => match snapshot.next_heart_at {
            Some(at) => println!("Hearts: {hearts} (next at {})", at.format("%H:%M UTC")),
            None => println!("Hearts: {hearts}"),
        },
        None => println!("Hearts: full"),
    }
    println!("Mistakes to review: {}", snapshot.outstanding_mistakes);
    if !snapshot.achievements.is_empty() {
        println!("Achievements:");
        for achievement in &snapshot.achievements {
            println!("  {} - {}", achievement.title(), achievement.description());
        }
    }
    if !snapshot.recent.is_empty() {
        println!("Recent attempts:");
        for item in &snapshot.recent {
            println!(
                "  {}  {:<14} {}/{} {}",
                item.finished_at.format("%Y-%m-%d %H:%M"),
                item.variant.as_str(),
                item.correct,
                item.total,
                if item.passed { "passed" } else { "failed" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_is_one_based_and_forgiving() {
        assert_eq!(Input::parse(" 2 \n"), Input::Choose(1));
        assert_eq!(Input::parse(""), Input::Continue);
        assert_eq!(Input::parse("q"), Input::Quit);
        assert_eq!(Input::parse("0"), Input::Unknown);
        assert_eq!(Input::parse("abc"), Input::Unknown);
    }
}
