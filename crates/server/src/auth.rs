use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use common::now_secs;
use rand::Rng;
use rand_core::OsRng;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

const USERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub user_id: String,
    pub expires_at: u64,
}

#[derive(Debug)]
pub enum AuthError {
    UserExists,
    InvalidUsername,
    InvalidPassword,
    HashError(String),
    DbError(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::UserExists => write!(f, "username already taken"),
            AuthError::InvalidUsername => write!(f, "username is required"),
            AuthError::InvalidPassword => write!(
                f,
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            ),
            AuthError::HashError(err) => write!(f, "password hash error: {}", err),
            AuthError::DbError(err) => write!(f, "auth db error: {}", err),
        }
    }
}

impl std::error::Error for AuthError {}

/// Accounts and bearer sessions, stored next to the catalog.
#[derive(Clone)]
pub struct AuthStore {
    db: Arc<Database>,
    session_ttl: Duration,
}

impl AuthStore {
    pub fn new(db: Arc<Database>, session_ttl: Duration) -> Self {
        Self { db, session_ttl }
    }

    pub fn init_tables(&self) -> Result<(), AuthError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let _users = write_txn.open_table(USERS_TABLE).map_err(db_err)?;
            let _sessions = write_txn.open_table(SESSIONS_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    pub fn register(&self, username: &str, password: &str) -> Result<AuthUser, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::InvalidUsername);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidPassword);
        }

        let user = AuthUser {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash_password(password)?,
            created_at: now_secs(),
        };
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(USERS_TABLE).map_err(db_err)?;

            for item in table.iter().map_err(db_err)? {
                let item = item.map_err(db_err)?;
                let existing: AuthUser = bincode::deserialize(item.1.value()).map_err(db_err)?;
                if existing.username.eq_ignore_ascii_case(username) {
                    return Err(AuthError::UserExists);
                }
            }

            let bytes = bincode::serialize(&user).map_err(db_err)?;
            table
                .insert(user.id.as_str(), bytes.as_slice())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(user)
    }

    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<AuthUser>, AuthError> {
        let user = match self.get_user_by_username(username.trim())? {
            Some(u) => u,
            None => return Ok(None),
        };

        if verify_password(password, &user.password_hash) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub fn create_session(&self, user_id: &str) -> Result<SessionToken, AuthError> {
        let token_str = generate_token();
        let expires_at = now_secs() + self.session_ttl.as_secs();

        let session = SessionToken {
            token: token_str.clone(),
            user_id: user_id.to_string(),
            expires_at,
        };

        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(SESSIONS_TABLE).map_err(db_err)?;
            let bytes = bincode::serialize(&session).map_err(db_err)?;
            table
                .insert(token_str.as_str(), bytes.as_slice())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;

        Ok(session)
    }

    pub fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(SESSIONS_TABLE).map_err(db_err)?;
            table.remove(token).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    pub fn user_from_token(&self, token: &str) -> Result<Option<AuthUser>, AuthError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let sessions = read_txn.open_table(SESSIONS_TABLE).map_err(db_err)?;

        let session: SessionToken = match sessions.get(token).map_err(db_err)? {
            Some(v) => bincode::deserialize(v.value()).map_err(db_err)?,
            None => return Ok(None),
        };

        if session.expires_at < now_secs() {
            return Ok(None);
        }

        let users = read_txn.open_table(USERS_TABLE).map_err(db_err)?;
        let user_result = users.get(session.user_id.as_str()).map_err(db_err)?;
        match user_result {
            Some(v) => {
                let user: AuthUser = bincode::deserialize(v.value()).map_err(db_err)?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<AuthUser>, AuthError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(USERS_TABLE).map_err(db_err)?;
        for item in table.iter().map_err(db_err)? {
            let item = item.map_err(db_err)?;
            let user: AuthUser = bincode::deserialize(item.1.value()).map_err(db_err)?;
            if user.username.eq_ignore_ascii_case(username) {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }
}

fn db_err(err: impl std::fmt::Display) -> AuthError {
    AuthError::DbError(err.to_string())
}

/// Salted argon2id hash in PHC string form.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::HashError(err.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn generate_token() -> String {
    let mut rng = rand::rng();
    let chars = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    (0..32)
        .map(|_| chars[rng.random_range(0..chars.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use library::open_or_create_db;

    use super::{AuthError, AuthStore};

    fn store(ttl: Duration) -> (tempfile::TempDir, AuthStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = open_or_create_db(&dir.path().join("auth.redb")).unwrap();
        let store = AuthStore::new(Arc::new(db), ttl);
        store.init_tables().unwrap();
        (dir, store)
    }

    #[test]
    fn register_login_and_resolve_token() {
        let (_dir, auth) = store(Duration::from_secs(60));
        let user = auth.register("digger", "secret-pass").unwrap();
        assert!(auth.authenticate("DIGGER", "wrong-pass").unwrap().is_none());
        let found = auth.authenticate("digger", "secret-pass").unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let session = auth.create_session(&user.id).unwrap();
        assert_eq!(session.token.len(), 32);
        let resolved = auth.user_from_token(&session.token).unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        auth.revoke_session(&session.token).unwrap();
        assert!(auth.user_from_token(&session.token).unwrap().is_none());
    }

    #[test]
    fn usernames_are_unique_ignoring_case() {
        let (_dir, auth) = store(Duration::from_secs(60));
        auth.register("digger", "secret-pass").unwrap();
        assert!(matches!(
            auth.register("Digger", "other-pass"),
            Err(AuthError::UserExists)
        ));
    }

    #[test]
    fn rejects_blank_username_and_short_password() {
        let (_dir, auth) = store(Duration::from_secs(60));
        assert!(matches!(auth.register("  ", "secret-pass"), Err(AuthError::InvalidUsername)));
        assert!(matches!(auth.register("digger", "abc"), Err(AuthError::InvalidPassword)));
    }

    #[test]
    fn passwords_are_stored_salted() {
        let (_dir, auth) = store(Duration::from_secs(60));
        let first = auth.register("alice", "secret-pass").unwrap();
        let second = auth.register("bob", "secret-pass").unwrap();
        assert!(first.password_hash.starts_with("$argon2"));
        assert!(!first.password_hash.contains("secret-pass"));
        assert_ne!(first.password_hash, second.password_hash);
        assert!(auth.authenticate("bob", "secret-pass").unwrap().is_some());
    }

    #[test]
    fn unknown_token_has_no_user() {
        let (_dir, auth) = store(Duration::from_secs(60));
        assert!(auth.user_from_token("nope").unwrap().is_none());
    }
}
