//! In-memory auth store
//!
//! Used for tests and for running the API without a database
//! (`STORE_BACKEND=memory`). Users and tokens share one lock so that
//! multi-record operations are atomic, matching the transactional
//! behaviour of the PostgreSQL store.

use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};
use crate::store::{
    check_storable, AuthStore, DuplicateField, StoreError, StoreResult, TokenStore, UserDirectory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    /// Keyed by token string
    tokens: HashMap<String, RefreshToken>,
}

impl Tables {
    fn check_user_insertable(&self, user: &NewUser) -> StoreResult<()> {
        check_storable(user)?;
        if self.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate(DuplicateField::Email));
        }
        if self.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate(DuplicateField::Username));
        }
        Ok(())
    }

    fn check_token_insertable(&self, token: &NewRefreshToken) -> StoreResult<()> {
        if self.tokens.contains_key(&token.token) {
            return Err(StoreError::Duplicate(DuplicateField::Token));
        }
        if !self.users.contains_key(&token.user_id) {
            return Err(StoreError::Database(format!(
                "refresh token references unknown user {}",
                token.user_id
            )));
        }
        Ok(())
    }

    fn insert_user(&mut self, user: NewUser) -> User {
        let now = Utc::now();
        let record = User {
            id: user.id,
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(record.id, record.clone());
        record
    }

    fn insert_token(&mut self, token: NewRefreshToken) -> RefreshToken {
        let record = RefreshToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token: token.token,
            expires_at: token.expires_at,
            created_at: Utc::now(),
            revoked: false,
        };
        self.tokens.insert(record.token.clone(), record.clone());
        record
    }
}

/// Auth store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryAuthStore {
    tables: RwLock<Tables>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a user and, like the foreign-key cascade, all of its tokens
    pub async fn delete_user(&self, id: Uuid) -> bool {
        let mut tables = self.tables.write().await;
        tables.tokens.retain(|_, t| t.user_id != id);
        tables.users.remove(&id).is_some()
    }

    /// Overwrite the stored expiry of a token
    pub async fn set_token_expiry(&self, token: &str, expires_at: DateTime<Utc>) -> bool {
        let mut tables = self.tables.write().await;
        match tables.tokens.get_mut(token) {
            Some(record) => {
                record.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    /// Fetch a token record regardless of revocation
    pub async fn token_record(&self, token: &str) -> Option<RefreshToken> {
        self.tables.read().await.tokens.get(token).cloned()
    }

    pub async fn token_count(&self) -> usize {
        self.tables.read().await.tokens.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryAuthStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        tables.check_user_insertable(&user)?;
        Ok(tables.insert_user(user))
    }
}

#[async_trait]
impl TokenStore for MemoryAuthStore {
    async fn create(&self, token: NewRefreshToken) -> StoreResult<RefreshToken> {
        let mut tables = self.tables.write().await;
        tables.check_token_insertable(&token)?;
        Ok(tables.insert_token(token))
    }

    async fn find_active(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        let tables = self.tables.read().await;
        Ok(tables.tokens.get(token).filter(|t| !t.revoked).cloned())
    }

    async fn revoke(&self, token: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.tokens.get_mut(token) {
            Some(record) => {
                record.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut count = 0;
        for record in tables.tokens.values_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, t| t.expires_at >= now);
        Ok((before - tables.tokens.len()) as u64)
    }

    async fn rotate(
        &self,
        old: &str,
        replacement: NewRefreshToken,
    ) -> StoreResult<Option<RefreshToken>> {
        let mut tables = self.tables.write().await;

        let active = tables.tokens.get(old).is_some_and(|t| !t.revoked);
        if !active {
            return Ok(None);
        }
        tables.check_token_insertable(&replacement)?;

        if let Some(record) = tables.tokens.get_mut(old) {
            record.revoked = true;
        }
        Ok(Some(tables.insert_token(replacement)))
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn create_account(&self, user: NewUser, token: NewRefreshToken) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        tables.check_user_insertable(&user)?;
        if token.user_id != user.id {
            return Err(StoreError::Database(format!(
                "refresh token references unknown user {}",
                token.user_id
            )));
        }
        if tables.tokens.contains_key(&token.token) {
            return Err(StoreError::Duplicate(DuplicateField::Token));
        }

        let created = tables.insert_user(user);
        tables.insert_token(token);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use chrono::Duration;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser::new(
            email.to_string(),
            username.to_string(),
            "hash".to_string(),
            UserRole::Reader,
        )
    }

    fn new_token(user_id: Uuid, value: &str) -> NewRefreshToken {
        NewRefreshToken {
            user_id,
            token: value.to_string(),
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = MemoryAuthStore::new();
        let user = UserDirectory::create(&store, new_user("a@x.com", "alice"))
            .await
            .unwrap();

        assert_eq!(store.find_by_email("a@x.com").await.unwrap().unwrap().id, user.id);
        assert_eq!(store.find_by_username("alice").await.unwrap().unwrap().id, user.id);
        assert!(store.find_by_id(user.id).await.unwrap().is_some());
        assert!(store.exists_by_email("a@x.com").await.unwrap());
        assert!(!store.exists_by_username("bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_guest_role_is_not_stored() {
        let store = MemoryAuthStore::new();
        let guest = NewUser::new(
            "g@x.com".to_string(),
            "guest".to_string(),
            "hash".to_string(),
            UserRole::Guest,
        );

        let err = assert_err!(UserDirectory::create(&store, guest.clone()).await);
        assert!(matches!(err, StoreError::UnstorableRole(UserRole::Guest)));

        let token = new_token(guest.id, "guest-token");
        let err = assert_err!(store.create_account(guest, token).await);
        assert!(matches!(err, StoreError::UnstorableRole(UserRole::Guest)));

        assert!(!assert_ok!(store.exists_by_email("g@x.com").await));
        assert_eq!(store.token_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_email_and_username() {
        let store = MemoryAuthStore::new();
        UserDirectory::create(&store, new_user("a@x.com", "alice"))
            .await
            .unwrap();

        let err = UserDirectory::create(&store, new_user("a@x.com", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(DuplicateField::Email)));

        let err = UserDirectory::create(&store, new_user("b@x.com", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(DuplicateField::Username)));
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let store = MemoryAuthStore::new();
        let user = UserDirectory::create(&store, new_user("a@x.com", "alice"))
            .await
            .unwrap();

        assert_ok!(TokenStore::create(&store, new_token(user.id, "t1")).await);
        assert!(store.find_active("t1").await.unwrap().is_some());

        assert!(assert_ok!(store.revoke("t1").await));
        assert!(store.find_active("t1").await.unwrap().is_none());
        assert!(store.token_record("t1").await.unwrap().revoked);

        assert!(!store.revoke("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_token_requires_existing_user() {
        let store = MemoryAuthStore::new();
        let err = assert_err!(TokenStore::create(&store, new_token(Uuid::new_v4(), "t1")).await);
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn test_revoke_all_counts_only_active() {
        let store = MemoryAuthStore::new();
        let user = UserDirectory::create(&store, new_user("a@x.com", "alice"))
            .await
            .unwrap();
        for value in ["t1", "t2", "t3"] {
            TokenStore::create(&store, new_token(user.id, value)).await.unwrap();
        }
        store.revoke("t1").await.unwrap();

        assert_eq!(store.revoke_all(user.id).await.unwrap(), 2);
        assert_eq!(store.revoke_all(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired_removes_only_past_tokens() {
        let store = MemoryAuthStore::new();
        let user = UserDirectory::create(&store, new_user("a@x.com", "alice"))
            .await
            .unwrap();
        TokenStore::create(&store, new_token(user.id, "old")).await.unwrap();
        TokenStore::create(&store, new_token(user.id, "fresh")).await.unwrap();
        store
            .set_token_expiry("old", Utc::now() - Duration::hours(1))
            .await;

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.token_record("old").await.is_none());
        assert!(store.token_record("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_rotate_is_single_use() {
        let store = MemoryAuthStore::new();
        let user = UserDirectory::create(&store, new_user("a@x.com", "alice"))
            .await
            .unwrap();
        TokenStore::create(&store, new_token(user.id, "t1")).await.unwrap();

        let rotated = store.rotate("t1", new_token(user.id, "t2")).await.unwrap();
        assert_eq!(rotated.unwrap().token, "t2");
        assert!(store.find_active("t1").await.unwrap().is_none());
        assert!(store.find_active("t2").await.unwrap().is_some());

        let again = store.rotate("t1", new_token(user.id, "t3")).await.unwrap();
        assert!(again.is_none());
        assert!(store.token_record("t3").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let store = Arc::new(MemoryAuthStore::new());
        let user = UserDirectory::create(store.as_ref(), new_user("a@x.com", "alice"))
            .await
            .unwrap();
        TokenStore::create(store.as_ref(), new_token(user.id, "t1"))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let replacement = new_token(user.id, &format!("next-{i}"));
                tokio::spawn(async move { store.rotate("t1", replacement).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_create_account_is_atomic() {
        let store = MemoryAuthStore::new();
        let first = new_user("a@x.com", "alice");
        let first_id = first.id;
        store
            .create_account(first, new_token(first_id, "t1"))
            .await
            .unwrap();

        // Token collision must leave no user behind
        let second = new_user("b@x.com", "bob");
        let second_id = second.id;
        let err = store
            .create_account(second, new_token(second_id, "t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(DuplicateField::Token)));
        assert!(store.find_by_email("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_user_cascades_tokens() {
        let store = MemoryAuthStore::new();
        let user = new_user("a@x.com", "alice");
        let id = user.id;
        store.create_account(user, new_token(id, "t1")).await.unwrap();

        assert!(store.delete_user(id).await);
        assert_eq!(store.token_count().await, 0);
    }
}
