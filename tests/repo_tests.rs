#![cfg(feature = "inmem-store")]

use tally::{
    filter::{TransactionFilter, TransactionQuery},
    models::{Id, NewTransaction, NewUser, TransactionPatch},
    repo::{
        inmem::{InMemRepo, SNAPSHOT_FILE},
        RepoError,
    },
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use tally::repo::{TransactionRepo, UserRepo};

fn new_user(username: &str) -> NewUser {
    NewUser {
        username: username.into(),
        password_hash: "$2b$04$not-a-real-hash".into(),
        firstname: "Ada".into(),
        lastname: "Lovelace".into(),
    }
}

fn tx(amount: f64, kind: &str, date: &str) -> NewTransaction {
    serde_json::from_value(serde_json::json!({ "amount": amount, "type": kind, "date": date })).unwrap()
}

fn filter(kind: &str, date1: &str, date2: &str) -> TransactionFilter {
    TransactionFilter::from_query(&TransactionQuery {
        kind: Some(kind.into()),
        date1: Some(date1.into()),
        date2: Some(date2.into()),
    })
    .unwrap()
}

#[tokio::test]
async fn user_create_lookup_and_conflict() {
    let r = InMemRepo::new();

    let u = r.create_user(new_user("ada")).await.unwrap();
    assert_eq!(u.role, "user");

    // duplicate username → conflict
    let err = r.create_user(new_user("ada")).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    assert_eq!(r.find_user_by_username("ada").await.unwrap().unwrap().id, u.id);
    assert!(r.find_user_by_username("grace").await.unwrap().is_none());
    assert_eq!(r.get_user(u.id).await.unwrap().unwrap().username, "ada");
    assert!(r.get_user(Id::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn transaction_filters_compose() {
    let r = InMemRepo::new();
    r.create_transaction(tx(50.0, "income", "2024-01-01")).await.unwrap();
    r.create_transaction(tx(20.0, "expense", "2024-01-15")).await.unwrap();
    r.create_transaction(tx(35.0, "expense", "2024-03-01")).await.unwrap();

    let all = r.list_transactions(&TransactionFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let january = r.list_transactions(&filter("", "2024-01-01", "2024-02-01")).await.unwrap();
    assert_eq!(january.len(), 2);

    let january_expenses = r.list_transactions(&filter("expense", "2024-01-01", "2024-02-01")).await.unwrap();
    assert_eq!(january_expenses.len(), 1);
    assert_eq!(january_expenses[0].amount, Some(20.0));

    let on_new_year = r.list_transactions(&filter("", "2024-01-01", "2024-01-01")).await.unwrap();
    assert_eq!(on_new_year.len(), 1);
    assert_eq!(on_new_year[0].kind.as_deref(), Some("income"));
}

#[tokio::test]
async fn update_returns_post_image_and_delete_returns_removed() {
    let r = InMemRepo::new();
    let created = r.create_transaction(tx(10.0, "expense", "2024-01-01")).await.unwrap();

    let patch = TransactionPatch { amount: Some(Some(12.5)), remark: Some(Some("coffee".into())), ..Default::default() };
    let updated = r.update_transaction(created.id, patch).await.unwrap().unwrap();
    assert_eq!(updated.amount, Some(12.5));
    assert_eq!(updated.remark, "coffee");
    assert_eq!(updated.kind.as_deref(), Some("expense"));

    assert!(r.update_transaction(Id::new_v4(), TransactionPatch::default()).await.unwrap().is_none());

    let removed = r.delete_transaction(created.id).await.unwrap().unwrap();
    assert_eq!(removed, updated);
    assert!(r.delete_transaction(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let first = InMemRepo::with_snapshot_dir(dir.path()).unwrap();
    let user = first.create_user(new_user("ada")).await.unwrap();
    let created = first.create_transaction(tx(99.0, "income", "2024-05-05")).await.unwrap();
    drop(first);

    let reopened = InMemRepo::with_snapshot_dir(dir.path()).unwrap();
    assert_eq!(reopened.find_user_by_username("ada").await.unwrap().unwrap().id, user.id);
    let all = reopened.list_transactions(&TransactionFilter::default()).await.unwrap();
    assert_eq!(all, vec![created]);
}

#[tokio::test]
async fn missing_snapshot_dir_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let r = InMemRepo::with_snapshot_dir(dir.path().join("not-yet-created")).unwrap();
    assert!(r.list_transactions(&TransactionFilter::default()).await.unwrap().is_empty());
    r.create_transaction(tx(1.0, "income", "2024-01-01")).await.unwrap();
    assert!(dir.path().join("not-yet-created").join(SNAPSHOT_FILE).is_file());
}

#[tokio::test]
async fn corrupt_snapshot_is_refused_and_left_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(SNAPSHOT_FILE);
    std::fs::write(&path, b"{ truncated").unwrap();

    let err = InMemRepo::with_snapshot_dir(dir.path()).err().unwrap();
    assert!(matches!(err, RepoError::Internal(_)));
    assert_eq!(std::fs::read(&path).unwrap(), b"{ truncated");
}

#[tokio::test]
async fn unreadable_snapshot_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    // a directory where the file should be cannot be read as one
    std::fs::create_dir(dir.path().join(SNAPSHOT_FILE)).unwrap();
    assert!(matches!(InMemRepo::with_snapshot_dir(dir.path()), Err(RepoError::Internal(_))));
}

// Replaces the snapshot file with a directory so every later write fails.
fn block_snapshot(dir: &std::path::Path) {
    let path = dir.join(SNAPSHOT_FILE);
    if path.is_file() {
        std::fs::remove_file(&path).unwrap();
    }
    std::fs::create_dir(&path).unwrap();
}

fn unblock_snapshot(dir: &std::path::Path) {
    std::fs::remove_dir(dir.join(SNAPSHOT_FILE)).unwrap();
}

#[tokio::test]
async fn failed_snapshot_write_rolls_back_creates() {
    let dir = tempfile::tempdir().unwrap();
    let r = InMemRepo::with_snapshot_dir(dir.path()).unwrap();
    block_snapshot(dir.path());

    let err = r.create_transaction(tx(5.0, "expense", "2024-01-01")).await.unwrap_err();
    assert!(matches!(err, RepoError::Internal(_)));
    assert!(r.list_transactions(&TransactionFilter::default()).await.unwrap().is_empty());

    // the failed registration left nothing behind, so a retry is not a conflict
    assert!(matches!(r.create_user(new_user("ada")).await, Err(RepoError::Internal(_))));
    assert!(r.find_user_by_username("ada").await.unwrap().is_none());
    assert!(matches!(r.create_user(new_user("ada")).await, Err(RepoError::Internal(_))));

    unblock_snapshot(dir.path());
    r.create_user(new_user("ada")).await.unwrap();
    assert!(!dir.path().join("state.json.tmp").exists());
}

#[tokio::test]
async fn failed_snapshot_write_rolls_back_update_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let r = InMemRepo::with_snapshot_dir(dir.path()).unwrap();
    let created = r.create_transaction(tx(10.0, "expense", "2024-01-01")).await.unwrap();
    block_snapshot(dir.path());

    let patch = TransactionPatch { amount: Some(Some(99.0)), ..Default::default() };
    assert!(r.update_transaction(created.id, patch).await.is_err());
    assert!(r.delete_transaction(created.id).await.is_err());

    let all = r.list_transactions(&TransactionFilter::default()).await.unwrap();
    assert_eq!(all, vec![created.clone()]);

    // unknown ids never touch the snapshot
    assert!(r.delete_transaction(Id::new_v4()).await.unwrap().is_none());

    unblock_snapshot(dir.path());
    assert_eq!(r.delete_transaction(created.id).await.unwrap(), Some(created));
}

#[tokio::test]
async fn patch_null_clears_stored_field() {
    let r = InMemRepo::new();
    let created = r.create_transaction(tx(10.0, "expense", "2024-01-01")).await.unwrap();
    let patch: TransactionPatch = serde_json::from_value(serde_json::json!({ "type": null, "amount": null })).unwrap();
    let updated = r.update_transaction(created.id, patch).await.unwrap().unwrap();
    assert_eq!(updated.kind, None);
    assert_eq!(updated.amount, None);
    assert_eq!(updated.date, created.date);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_all_reach_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let r = InMemRepo::with_snapshot_dir(dir.path()).unwrap();

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let r = r.clone();
            tokio::spawn(async move { r.create_transaction(tx(i as f64, "income", "2024-01-01")).await })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let reopened = InMemRepo::with_snapshot_dir(dir.path()).unwrap();
    let all = reopened.list_transactions(&TransactionFilter::default()).await.unwrap();
    assert_eq!(all.len(), 40);
}
