use async_trait::async_trait;

use crate::filter::TransactionFilter;
use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("conflict")] Conflict,
    #[error("store failure: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn get_user(&self, id: Id) -> RepoResult<Option<User>>;
    /// Fails with [`RepoError::Conflict`] when the username is taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
}

#[async_trait]
pub trait TransactionRepo: Send + Sync {
    async fn list_transactions(&self, filter: &TransactionFilter) -> RepoResult<Vec<Transaction>>;
    async fn create_transaction(&self, new: NewTransaction) -> RepoResult<Transaction>;
    /// Returns the record after the patch is applied, `None` if no such id.
    async fn update_transaction(&self, id: Id, patch: TransactionPatch) -> RepoResult<Option<Transaction>>;
    /// Returns the removed record, `None` if no such id.
    async fn delete_transaction(&self, id: Id) -> RepoResult<Option<Transaction>>;
}

pub trait Repo: UserRepo + TransactionRepo {}

impl<T> Repo for T where T: UserRepo + TransactionRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

    pub const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        transactions: HashMap<Id, Transaction>,
    }

    /// In-process store. With a snapshot path every write is mirrored to a
    /// JSON file, and the file is loaded back on construction.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        /// Load `<dir>/state.json` if present and persist to it after writes.
        /// A snapshot that exists but cannot be read or parsed is an error, so
        /// the next write never overwrites data that failed to load.
        pub fn with_snapshot_dir(dir: impl AsRef<Path>) -> RepoResult<Self> {
            let path = dir.as_ref().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path)?;
            Ok(Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
            })
        }

        fn load_state_from(path: &Path) -> RepoResult<State> {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::info!(path = %path.display(), "no snapshot, starting empty");
                    return Ok(State::default());
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "cannot read snapshot");
                    return Err(RepoError::Internal(format!("read {}: {e}", path.display())));
                }
            };
            let s: State = serde_json::from_slice(&bytes).map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "cannot parse snapshot");
                RepoError::Internal(format!("parse {}: {e}", path.display()))
            })?;
            tracing::info!(path = %path.display(), users = s.users.len(), transactions = s.transactions.len(), "loaded snapshot");
            Ok(s)
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        /// Writes `state` to the snapshot file. Callers hold the write guard,
        /// so snapshots are taken and written one at a time; the file is
        /// replaced by rename and never observed half-written.
        fn persist(&self, state: &State) -> RepoResult<()> {
            let Some(path) = self.snapshot_path.as_deref() else { return Ok(()) };
            let bytes = serde_json::to_vec_pretty(state).map_err(|e| RepoError::Internal(e.to_string()))?;
            let tmp = path.with_extension("json.tmp");
            let result = path
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .and_then(|()| std::fs::write(&tmp, bytes))
                .and_then(|()| std::fs::rename(&tmp, path));
            result.map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "failed to write snapshot");
                let _ = std::fs::remove_file(&tmp);
                RepoError::Internal(e.to_string())
            })
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
            let s = self.read()?;
            Ok(s.users.values().find(|u| u.username == username).cloned())
        }

        async fn get_user(&self, id: Id) -> RepoResult<Option<User>> {
            Ok(self.read()?.users.get(&id).cloned())
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let user = User {
                id: Id::new_v4(),
                username: new.username,
                password: new.password_hash,
                firstname: new.firstname,
                lastname: new.lastname,
                role: DEFAULT_ROLE.to_string(),
            };
            s.users.insert(user.id, user.clone());
            if let Err(e) = self.persist(&s) {
                s.users.remove(&user.id);
                return Err(e);
            }
            Ok(user)
        }
    }

    #[async_trait]
    impl TransactionRepo for InMemRepo {
        async fn list_transactions(&self, filter: &TransactionFilter) -> RepoResult<Vec<Transaction>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.transactions.values().filter(|t| filter.matches(t)).cloned().collect();
            v.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
            Ok(v)
        }

        async fn create_transaction(&self, new: NewTransaction) -> RepoResult<Transaction> {
            let tx = new.into_transaction(Id::new_v4());
            let mut s = self.write()?;
            s.transactions.insert(tx.id, tx.clone());
            if let Err(e) = self.persist(&s) {
                s.transactions.remove(&tx.id);
                return Err(e);
            }
            Ok(tx)
        }

        async fn update_transaction(&self, id: Id, patch: TransactionPatch) -> RepoResult<Option<Transaction>> {
            let mut s = self.write()?;
            let Some(tx) = s.transactions.get_mut(&id) else { return Ok(None) };
            let before = tx.clone();
            patch.apply_to(tx);
            let updated = tx.clone();
            if let Err(e) = self.persist(&s) {
                s.transactions.insert(id, before);
                return Err(e);
            }
            Ok(Some(updated))
        }

        async fn delete_transaction(&self, id: Id) -> RepoResult<Option<Transaction>> {
            let mut s = self.write()?;
            let Some(removed) = s.transactions.remove(&id) else { return Ok(None) };
            if let Err(e) = self.persist(&s) {
                s.transactions.insert(id, removed);
                return Err(e);
            }
            Ok(Some(removed))
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::filter::DateClause;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::{Pool, Postgres, QueryBuilder};

    const TX_COLUMNS: &str = r#"id, user_id, amount, "type", remark, date"#;
    const USER_COLUMNS: &str = "id, username, password, firstname, lastname, role";

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    /// Appends one `AND` clause per filter part; the type and date clauses always combine.
    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
        if let Some(kind) = &filter.kind {
            qb.push(r#" AND "type" = "#).push_bind(kind.clone());
        }
        match filter.date {
            Some(DateClause::Between { from, to }) => {
                qb.push(" AND date >= ").push_bind(from).push(" AND date < ").push_bind(to);
            }
            Some(DateClause::On(at)) => { qb.push(" AND date = ").push_bind(at); }
            Some(DateClause::Since(from)) => { qb.push(" AND date >= ").push_bind(from); }
            Some(DateClause::Before(to)) => { qb.push(" AND date < ").push_bind(to); }
            None => {}
        }
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Open a pool against `url` and bring the schema up to date.
        pub async fn connect(url: &str, max_connections: u32) -> RepoResult<Self> {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
                .map_err(internal)?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| RepoError::Internal(e.to_string()))?;
            Ok(Self::new(pool))
        }

        pub async fn close(&self) {
            self.pool.close().await;
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
                .bind(username)
                .fetch_optional(&self.pool).await.map_err(internal)
        }

        async fn get_user(&self, id: Id) -> RepoResult<Option<User>> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(internal)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!(
                "INSERT INTO users (id, username, password, firstname, lastname, role) \
                 VALUES ($1,$2,$3,$4,$5,$6) RETURNING {USER_COLUMNS}"
            ))
            .bind(Id::new_v4())
            .bind(&new.username)
            .bind(&new.password_hash)
            .bind(&new.firstname)
            .bind(&new.lastname)
            .bind(DEFAULT_ROLE)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
                other => internal(other),
            })
        }
    }

    #[async_trait]
    impl TransactionRepo for PgRepo {
        async fn list_transactions(&self, filter: &TransactionFilter) -> RepoResult<Vec<Transaction>> {
            let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {TX_COLUMNS} FROM transactions WHERE TRUE"));
            push_filter(&mut qb, filter);
            qb.push(" ORDER BY date ASC NULLS FIRST, id ASC");
            qb.build_query_as::<Transaction>()
                .fetch_all(&self.pool).await.map_err(internal)
        }

        async fn create_transaction(&self, new: NewTransaction) -> RepoResult<Transaction> {
            let tx = new.into_transaction(Id::new_v4());
            sqlx::query_as::<_, Transaction>(&format!(
                r#"INSERT INTO transactions (id, user_id, amount, "type", remark, date)
                   VALUES ($1,$2,$3,$4,$5,$6) RETURNING {TX_COLUMNS}"#
            ))
            .bind(tx.id)
            .bind(tx.user)
            .bind(tx.amount)
            .bind(&tx.kind)
            .bind(&tx.remark)
            .bind(tx.date)
            .fetch_one(&self.pool).await.map_err(internal)
        }

        async fn update_transaction(&self, id: Id, patch: TransactionPatch) -> RepoResult<Option<Transaction>> {
            // Each field is paired with a "present" flag so that an explicit
            // null clears the column while an absent field leaves it alone.
            sqlx::query_as::<_, Transaction>(&format!(
                r#"UPDATE transactions SET
                       user_id = CASE WHEN $2  THEN $3  ELSE user_id END,
                       amount  = CASE WHEN $4  THEN $5  ELSE amount  END,
                       "type"  = CASE WHEN $6  THEN $7  ELSE "type"  END,
                       remark  = CASE WHEN $8  THEN $9  ELSE remark  END,
                       date    = CASE WHEN $10 THEN $11 ELSE date    END
                   WHERE id = $1 RETURNING {TX_COLUMNS}"#
            ))
            .bind(id)
            .bind(patch.user.is_some())
            .bind(patch.user.flatten())
            .bind(patch.amount.is_some())
            .bind(patch.amount.flatten())
            .bind(patch.kind.is_some())
            .bind(patch.kind.flatten())
            .bind(patch.remark.is_some())
            .bind(patch.remark.map(|r| r.unwrap_or_else(|| DEFAULT_REMARK.to_string())))
            .bind(patch.date.is_some())
            .bind(patch.date.flatten())
            .fetch_optional(&self.pool).await.map_err(internal)
        }

        async fn delete_transaction(&self, id: Id) -> RepoResult<Option<Transaction>> {
            sqlx::query_as::<_, Transaction>(&format!("DELETE FROM transactions WHERE id = $1 RETURNING {TX_COLUMNS}"))
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(internal)
        }
    }

}
