// Integration tests against a real Postgres. Each test gets its own
// freshly migrated database.
// Run with: DATABASE_URL=postgres://... cargo test -- --ignored

use std::time::Duration;

use poll_store::{db, NewPoll, Pagination, PgPollStore, PollStore, StoreError, User};
use sqlx::PgPool;

async fn user(pool: &PgPool, name: &str) -> User {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id, name, email",
    )
    .bind(name)
    .bind(format!("{name}@example.com"))
    .fetch_one(pool)
    .await
    .expect("user insert failed")
}

async fn coffee_or_tea(store: &PgPollStore) -> (i32, i32, i32) {
    let poll = store
        .create_poll(&NewPoll::new("Coffee or tea?", ["Coffee", "Tea"]))
        .await
        .expect("create failed");
    let edit = store.poll_for_edit(poll.id).await.expect("load failed");
    (poll.id, edit.answers[0].id, edit.answers[1].id)
}

async fn table_exists(pool: &PgPool, table: &str) -> bool {
    let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
        .bind(format!("public.{table}"))
        .fetch_one(pool)
        .await
        .expect("catalog lookup failed");
    found.is_some()
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn create_then_edit_keeps_answer_order(pool: PgPool) {
    let store = PgPollStore::new(pool);
    let (id, _, _) = coffee_or_tea(&store).await;

    let edit = store.poll_for_edit(id).await.unwrap();
    assert_eq!(edit.poll.question, "Coffee or tea?");
    let labels: Vec<_> = edit.answers.iter().map(|a| a.answer.as_str()).collect();
    assert_eq!(labels, ["Coffee", "Tea"]);
    assert!(edit.answers.iter().all(|a| a.result == 0));
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn vote_is_counted_once_per_user(pool: PgPool) {
    let a = user(&pool, "alice").await;
    let b = user(&pool, "bob").await;
    let store = PgPollStore::new(pool);
    let (id, coffee, tea) = coffee_or_tea(&store).await;

    store.record_vote(id, tea, &a).await.unwrap();

    let shown = store.poll_for_display(id, Some(&a)).await.unwrap();
    assert!(shown.has_voted);
    assert_eq!(shown.total_votes, 1);
    assert_eq!(shown.answers.iter().find(|x| x.id == tea).unwrap().result, 1);
    assert_eq!(shown.answers.iter().find(|x| x.id == coffee).unwrap().result, 0);
    assert!(!store.poll_for_display(id, Some(&b)).await.unwrap().has_voted);
    assert!(!store.poll_for_display(id, None).await.unwrap().has_voted);
    assert!(store.has_any_votes(id).await.unwrap());

    let err = store.record_vote(id, coffee, &a).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyVoted { .. }));
    let shown = store.poll_for_display(id, None).await.unwrap();
    assert_eq!(shown.total_votes, 1);
    assert_eq!(shown.answers.iter().find(|x| x.id == coffee).unwrap().result, 0);
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn total_votes_counts_only_this_poll(pool: PgPool) {
    let a = user(&pool, "alice").await;
    let b = user(&pool, "bob").await;
    let store = PgPollStore::new(pool);
    let (first, coffee, _) = coffee_or_tea(&store).await;
    let (second, _, tea) = coffee_or_tea(&store).await;

    store.record_vote(first, coffee, &a).await.unwrap();
    store.record_vote(second, tea, &a).await.unwrap();
    store.record_vote(second, tea, &b).await.unwrap();

    let shown = store.poll_for_display(first, None).await.unwrap();
    assert_eq!(shown.total_votes, 1);
    assert_eq!(shown.percentage(&shown.answers[0]), 100.0);
    assert_eq!(store.poll_for_display(second, None).await.unwrap().total_votes, 2);
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn foreign_answer_is_rejected(pool: PgPool) {
    let a = user(&pool, "carol").await;
    let store = PgPollStore::new(pool);
    let (first, _, _) = coffee_or_tea(&store).await;
    let (second, foreign, _) = coffee_or_tea(&store).await;

    let err = store.record_vote(first, foreign, &a).await.unwrap_err();
    assert!(matches!(err, StoreError::AnswerNotInPoll { .. }));
    assert!(!store.has_voted(first, a.id).await.unwrap());
    let edit = store.poll_for_edit(second).await.unwrap();
    assert!(edit.answers.iter().all(|x| x.result == 0));
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn vote_on_answer_deleted_concurrently_leaves_no_link(pool: PgPool) {
    let a = user(&pool, "erin").await;
    let store = PgPollStore::new(pool.clone());
    let (id, _, tea) = coffee_or_tea(&store).await;

    // Another editor replaces the answers while the vote is in flight.
    let mut editor = pool.begin().await.unwrap();
    sqlx::query("DELETE FROM answers WHERE poll_id = $1")
        .bind(id)
        .execute(&mut *editor)
        .await
        .unwrap();

    let vote = tokio::spawn({
        let store = store.clone();
        let a = a.clone();
        async move { store.record_vote(id, tea, &a).await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    sqlx::query("INSERT INTO answers (poll_id, answer) VALUES ($1, 'Tea')")
        .bind(id)
        .execute(&mut *editor)
        .await
        .unwrap();
    editor.commit().await.unwrap();

    let err = vote.await.expect("vote task panicked").unwrap_err();
    assert!(matches!(err, StoreError::AnswerNotInPoll { .. }));

    let shown = store.poll_for_display(id, Some(&a)).await.unwrap();
    assert!(!shown.has_voted);
    assert_eq!(shown.total_votes, 0);
    assert!(!store.has_any_votes(id).await.unwrap());
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn update_replaces_answers(pool: PgPool) {
    let store = PgPollStore::new(pool);
    let (id, coffee, tea) = coffee_or_tea(&store).await;

    store
        .update_poll(id, &NewPoll::new("Juice or milk?", ["Juice", "Milk"]))
        .await
        .unwrap();

    let edit = store.poll_for_edit(id).await.unwrap();
    assert_eq!(edit.poll.question, "Juice or milk?");
    let labels: Vec<_> = edit.answers.iter().map(|a| a.answer.as_str()).collect();
    assert_eq!(labels, ["Juice", "Milk"]);
    assert!(edit.answers.iter().all(|a| a.id != coffee && a.id != tea && a.result == 0));
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn delete_leaves_no_answers_behind(pool: PgPool) {
    let a = user(&pool, "dave").await;
    let store = PgPollStore::new(pool.clone());
    let (id, coffee, _) = coffee_or_tea(&store).await;
    store.record_vote(id, coffee, &a).await.unwrap();

    store.delete_poll(id).await.unwrap();

    assert!(store.get_by_id(id).await.unwrap().is_none());
    let (left,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM answers WHERE poll_id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(left, 0);
    assert!(!store.has_voted(id, a.id).await.unwrap());
    let (users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE id = $1")
        .bind(a.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(users, 1);
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn missing_poll_is_not_found(pool: PgPool) {
    let a = user(&pool, "frank").await;
    let store = PgPollStore::new(pool);

    assert!(store.get_by_id(42).await.unwrap().is_none());
    assert!(store.poll_for_edit(42).await.unwrap_err().is_not_found());
    assert!(store.poll_for_display(42, None).await.unwrap_err().is_not_found());
    assert!(store.poll_for_display(42, Some(&a)).await.unwrap_err().is_not_found());
    assert!(store.has_any_votes(42).await.unwrap_err().is_not_found());
    assert!(store.delete_poll(42).await.unwrap_err().is_not_found());
    assert!(store.record_vote(42, 1, &a).await.unwrap_err().is_not_found());
    let err = store
        .update_poll(42, &NewPoll::new("q", ["a"]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn listing_pages_in_creation_order_and_lists_voted_questions(pool: PgPool) {
    let a = user(&pool, "grace").await;
    let store = PgPollStore::new(pool);
    let mut ids = Vec::new();
    for i in 0..5 {
        let poll = store
            .create_poll(&NewPoll::new(format!("Question {i}"), ["yes", "no"]))
            .await
            .unwrap();
        ids.push(poll.id);
    }
    let answers = store.poll_for_edit(ids[3]).await.unwrap().answers;
    store.record_vote(ids[3], answers[0].id, &a).await.unwrap();

    let listing = store.list_polls(Pagination::new(2, 2)).await.unwrap();
    let questions: Vec<_> = listing.polls.items.iter().map(|p| p.question.as_str()).collect();
    assert_eq!(questions, ["Question 2", "Question 3"]);
    assert_eq!(listing.polls.total, 5);
    assert_eq!(listing.polls.total_pages(), 3);
    assert_eq!(listing.voted_questions, ["Question 3"]);

    let beyond = store.list_polls(Pagination::new(9, 2)).await.unwrap();
    assert!(beyond.polls.items.is_empty());
    assert_eq!(beyond.polls.total, 5);
}

#[sqlx::test(migrator = "poll_store::db::MIGRATOR")]
#[ignore = "requires database"]
async fn rollback_drops_poll_tables_but_keeps_users(pool: PgPool) {
    db::rollback(&pool).await.unwrap();

    for table in ["polls", "answers", "poll_user"] {
        assert!(!table_exists(&pool, table).await, "{table} still present");
    }
    assert!(table_exists(&pool, "users").await);

    db::migrate(&pool).await.unwrap();
    assert!(table_exists(&pool, "polls").await);
}
