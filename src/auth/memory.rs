//! In-process stores used by the test suite in place of PostgreSQL.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{
    repo::{digest_token, generate_refresh_token, RefreshTokenStore, StoreError, UserStore},
    repo_types::{RefreshToken, User},
};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == email && u.id != id) {
            return Err(StoreError::Conflict);
        }
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        user.email = email.to_string();
        user.password_hash = password_hash.to_string();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }
}

impl MemoryUserStore {
    pub fn remove(&self, id: Uuid) {
        self.users.lock().unwrap().remove(&id);
    }
}

struct StoredToken {
    user_id: Uuid,
    expires_at: OffsetDateTime,
    revoked: bool,
}

pub struct MemoryRefreshTokenStore {
    users: Arc<MemoryUserStore>,
    ttl: Duration,
    tokens: Mutex<HashMap<String, StoredToken>>,
}

impl MemoryRefreshTokenStore {
    pub fn new(users: Arc<MemoryUserStore>, ttl: Duration) -> Self {
        Self {
            users,
            ttl,
            tokens: Mutex::default(),
        }
    }

    /// Number of tokens that are still usable.
    pub fn active_count(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        self.tokens
            .lock()
            .unwrap()
            .values()
            .filter(|t| !t.revoked && t.expires_at > now)
            .count()
    }

    /// Number of rows held, usable or not.
    pub fn stored_count(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn save(&self, user_id: Uuid) -> Result<RefreshToken, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut tokens = self.tokens.lock().unwrap();
        tokens.retain(|_, t| t.user_id != user_id || (!t.revoked && t.expires_at > now));

        let token = generate_refresh_token();
        let expires_at = now + self.ttl;
        tokens.insert(
            digest_token(&token),
            StoredToken {
                user_id,
                expires_at,
                revoked: false,
            },
        );
        Ok(RefreshToken {
            token,
            user_id,
            expires_at,
        })
    }

    async fn find_active_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let owner = {
            let tokens = self.tokens.lock().unwrap();
            match tokens.get(&digest_token(token)) {
                Some(t) if !t.revoked && t.expires_at > OffsetDateTime::now_utc() => t.user_id,
                _ => return Ok(None),
            }
        };
        self.users.find_by_id(owner).await
    }

    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        if let Some(t) = self.tokens.lock().unwrap().get_mut(&digest_token(token)) {
            t.revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for t in self.tokens.lock().unwrap().values_mut() {
            if t.user_id == user_id && !t.revoked {
                t.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores(ttl: Duration) -> (Arc<MemoryUserStore>, MemoryRefreshTokenStore) {
        let users = Arc::new(MemoryUserStore::default());
        let tokens = MemoryRefreshTokenStore::new(users.clone(), ttl);
        (users, tokens)
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (users, _) = stores(Duration::days(7));
        users.create("a@example.com", "h").await.unwrap();
        let err = users.create("a@example.com", "h").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn saved_token_resolves_to_owner_until_revoked() {
        let (users, tokens) = stores(Duration::days(7));
        let user = users.create("a@example.com", "h").await.unwrap();
        let issued = tokens.save(user.id).await.unwrap();
        assert_eq!(issued.user_id, user.id);

        let owner = tokens.find_active_by_token(&issued.token).await.unwrap();
        assert_eq!(owner.map(|u| u.id), Some(user.id));

        tokens.revoke(&issued.token).await.unwrap();
        tokens.revoke(&issued.token).await.unwrap();
        assert!(tokens.find_active_by_token(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_token_is_not_active() {
        let (users, tokens) = stores(Duration::seconds(-1));
        let user = users.create("a@example.com", "h").await.unwrap();
        let issued = tokens.save(user.id).await.unwrap();
        assert!(tokens.find_active_by_token(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_sweeps_only_the_owners_inactive_tokens() {
        let (users, tokens) = stores(Duration::days(7));
        let a = users.create("a@example.com", "h").await.unwrap();
        let b = users.create("b@example.com", "h").await.unwrap();
        let old = tokens.save(a.id).await.unwrap();
        let live = tokens.save(a.id).await.unwrap();
        let other = tokens.save(b.id).await.unwrap();
        tokens.revoke(&old.token).await.unwrap();
        tokens.revoke(&other.token).await.unwrap();
        assert_eq!(tokens.stored_count(), 3);

        tokens.save(a.id).await.unwrap();
        // a's revoked row is gone, b's stays until b saves again
        assert_eq!(tokens.stored_count(), 3);
        assert_eq!(tokens.active_count(), 2);
        assert!(tokens.find_active_by_token(&live.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_token_is_not_active_and_revoke_is_noop() {
        let (_, tokens) = stores(Duration::days(7));
        assert!(tokens.find_active_by_token("nope").await.unwrap().is_none());
        tokens.revoke("nope").await.unwrap();
    }

    #[tokio::test]
    async fn revoke_all_only_touches_one_user() {
        let (users, tokens) = stores(Duration::days(7));
        let a = users.create("a@example.com", "h").await.unwrap();
        let b = users.create("b@example.com", "h").await.unwrap();
        tokens.save(a.id).await.unwrap();
        tokens.save(a.id).await.unwrap();
        let kept = tokens.save(b.id).await.unwrap();

        assert_eq!(tokens.revoke_all_for_user(a.id).await.unwrap(), 2);
        assert_eq!(tokens.active_count(), 1);
        assert!(tokens.find_active_by_token(&kept.token).await.unwrap().is_some());
    }
}
