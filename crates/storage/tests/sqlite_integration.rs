use chrono::Duration;
use passmate_core::model::{
    AchievementEvent, AchievementKind, HeartBalance, Question, QuestionId, SessionVariant, UserId,
};
use passmate_core::time::fixed_now;
use storage::repository::{
    AchievementRepository, MistakeRepository, OutcomeRecord, OutcomeRepository,
    ProfileRepository, QuestionCriteria, QuestionRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn question(id: u64, topic: &str) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Question {id}?"),
        vec!["yes".into(), "no".into(), "maybe".into()],
        2,
        "Because.",
        topic,
    )
    .unwrap()
}

fn mock_record(user: UserId, correct: u32, passed: bool) -> OutcomeRecord {
    OutcomeRecord {
        user_id: user,
        variant: SessionVariant::MockExam,
        topic: None,
        experience: correct * 20,
        correct_count: correct,
        total_count: 20,
        lives_lost: None,
        hearts_remaining: None,
        passed,
        started_at: fixed_now(),
        finished_at: fixed_now(),
    }
}

#[tokio::test]
async fn sqlite_questions_roundtrip_and_sample() {
    let repo = connect("memdb_questions").await;
    for id in 1..=5 {
        let topic = if id <= 2 { "rights" } else { "history" };
        repo.upsert_question(&question(id, topic)).await.unwrap();
    }
    // Upsert replaces in place.
    repo.upsert_question(&question(5, "rights")).await.unwrap();

    let ids = repo
        .fetch_questions(&QuestionCriteria::Ids(vec![
            QuestionId::new(4),
            QuestionId::new(77),
            QuestionId::new(1),
        ]))
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0].id(), QuestionId::new(4));
    assert_eq!(ids[1], question(1, "rights"));

    let rights = repo
        .fetch_questions(&QuestionCriteria::Topic {
            topic: "rights".into(),
            count: 10,
        })
        .await
        .unwrap();
    assert_eq!(rights.len(), 3);

    let random = repo
        .fetch_questions(&QuestionCriteria::Random { count: 2 })
        .await
        .unwrap();
    assert_eq!(random.len(), 2);

    let empty = repo
        .fetch_questions(&QuestionCriteria::Topic {
            topic: "geography".into(),
            count: 10,
        })
        .await
        .unwrap();
    assert!(empty.is_empty());

    assert_eq!(repo.list_topics().await.unwrap(), vec!["history", "rights"]);
}

#[tokio::test]
async fn sqlite_mistakes_are_idempotent_until_resolved() {
    let repo = connect("memdb_mistakes").await;
    let user = UserId::new(3);
    let q = QuestionId::new(12);

    let first = repo.record_mistake(user, q, fixed_now()).await.unwrap();
    let again = repo.record_mistake(user, q, fixed_now()).await.unwrap();
    assert_eq!(first, again);

    let outstanding = repo.outstanding_mistakes(user).await.unwrap();
    assert_eq!(outstanding.len(), 1);
    assert_eq!(outstanding[0].question_id, q);
    assert!(outstanding[0].is_outstanding());

    repo.resolve_mistake(first, fixed_now()).await.unwrap();
    repo.resolve_mistake(first, fixed_now()).await.unwrap();
    assert!(repo.outstanding_mistakes(user).await.unwrap().is_empty());

    let fresh = repo.record_mistake(user, q, fixed_now()).await.unwrap();
    assert_ne!(fresh, first);

    let err = repo
        .resolve_mistake(passmate_core::model::MistakeId::new(9_999), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_persist_outcome_credits_and_unlocks_once() {
    let repo = connect("memdb_outcomes").await;
    let user = UserId::new(7);

    let first = repo.persist_outcome(&mock_record(user, 20, true)).await.unwrap();
    let kinds: Vec<_> = first.unlocked.iter().map(|a| a.kind).collect();
    assert!(kinds.contains(&AchievementKind::FirstSession));
    assert!(kinds.contains(&AchievementKind::FirstPass));
    assert!(kinds.contains(&AchievementKind::PerfectScore));
    assert!(kinds.contains(&AchievementKind::MockExamPassed));

    let second = repo.persist_outcome(&mock_record(user, 10, false)).await.unwrap();
    assert!(second.unlocked.is_empty());

    assert_eq!(repo.total_experience(user).await.unwrap(), 600);
    assert_eq!(repo.hearts(user).await.unwrap(), None);
    assert_eq!(repo.list_unlocked(user).await.unwrap().len(), kinds.len());

    let stored = repo.get_attempt(first.attempt_id).await.unwrap();
    assert_eq!(stored.outcome, mock_record(user, 20, true));

    let attempts = repo.list_attempts(user, 1).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].id, second.attempt_id);

    let missing = repo
        .get_attempt(passmate_core::model::AttemptId::generate())
        .await
        .unwrap_err();
    assert!(matches!(missing, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_hearts_are_written_back_only_when_present() {
    let repo = connect("memdb_hearts").await;
    let user = UserId::new(1);

    assert_eq!(repo.hearts(user).await.unwrap(), None);
    repo.set_hearts(user, 5, fixed_now()).await.unwrap();
    assert_eq!(
        repo.hearts(user).await.unwrap(),
        Some(HeartBalance::new(5, fixed_now()))
    );

    let later = fixed_now() + Duration::minutes(12);
    let mut practice = mock_record(user, 3, true);
    practice.variant = SessionVariant::Practice;
    practice.lives_lost = Some(2);
    practice.hearts_remaining = Some(3);
    practice.finished_at = later;
    repo.persist_outcome(&practice).await.unwrap();
    assert_eq!(
        repo.hearts(user).await.unwrap(),
        Some(HeartBalance::new(3, later))
    );

    // A session without hearts keeps both the balance and its write time.
    let mut mock = mock_record(user, 0, false);
    mock.finished_at = later + Duration::hours(1);
    repo.persist_outcome(&mock).await.unwrap();
    assert_eq!(
        repo.hearts(user).await.unwrap(),
        Some(HeartBalance::new(3, later))
    );
    assert_eq!(repo.total_experience(user).await.unwrap(), 60);
}

#[tokio::test]
async fn sqlite_evaluate_achievements_reports_only_new_badges() {
    let repo = connect("memdb_achievements").await;
    let user = UserId::new(3);
    let event = AchievementEvent {
        variant: SessionVariant::MistakeReview,
        passed: true,
        correct_count: 4,
        total_count: 4,
        total_experience: 20,
    };

    let first = repo
        .evaluate_achievements(user, &event, fixed_now())
        .await
        .unwrap();
    let kinds: Vec<_> = first.iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![
            AchievementKind::FirstSession,
            AchievementKind::FirstPass,
            AchievementKind::PerfectScore,
            AchievementKind::MistakeCrusher,
        ]
    );

    let milestone = AchievementEvent {
        total_experience: 1_000,
        ..event
    };
    let second = repo
        .evaluate_achievements(user, &milestone, fixed_now())
        .await
        .unwrap();
    let kinds: Vec<_> = second.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AchievementKind::Experience1000]);

    assert_eq!(repo.list_unlocked(user).await.unwrap().len(), 5);
    assert!(
        repo.list_unlocked(UserId::new(4))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    repo.upsert_question(&question(1, "rights")).await.unwrap();
    assert_eq!(repo.list_topics().await.unwrap(), vec!["rights"]);
}
