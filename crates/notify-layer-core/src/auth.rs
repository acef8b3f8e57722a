use crate::error::AuthError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Attribute name to value, as exposed by the user pool
pub type UserAttributes = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub user_id: String,
    /// Token sent as `Authorization` for user pool authorized requests
    pub id_token: Option<String>,
}

/// Identity source consumed by the layer.
///
/// Implementations wrap whatever user directory the backend trusts; the layer
/// only needs these four calls.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<User, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn current_user(&self) -> Result<User, AuthError>;

    async fn fetch_user_attributes(&self, user: &User) -> Result<UserAttributes, AuthError>;
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user_id: String,
    attributes: UserAttributes,
}

/// Auth provider backed by a fixed set of accounts
#[derive(Debug, Default)]
pub struct InMemoryAuthProvider {
    accounts: HashMap<String, Account>,
    current: RwLock<Option<User>>,
}

impl InMemoryAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account<I, K, V>(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        attributes: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let username = username.into();
        let account = Account {
            password: password.into(),
            user_id: format!("{username}-id"),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };
        self.accounts.insert(username, account);
        self
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn sign_in(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let account = self
            .accounts
            .get(&credentials.username)
            .ok_or_else(|| AuthError::UserNotFound(credentials.username.clone()))?;
        if account.password != credentials.password {
            return Err(AuthError::InvalidCredentials);
        }

        let user = User {
            username: credentials.username.clone(),
            user_id: account.user_id.clone(),
            id_token: Some(format!("id-token-{}", account.user_id)),
        };
        *self.current.write().await = Some(user.clone());
        info!(username = %user.username, "User signed in");
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(user) = self.current.write().await.take() {
            info!(username = %user.username, "User signed out");
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<User, AuthError> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(AuthError::NotSignedIn)
    }

    async fn fetch_user_attributes(&self, user: &User) -> Result<UserAttributes, AuthError> {
        let account = self
            .accounts
            .get(&user.username)
            .ok_or_else(|| AuthError::UserNotFound(user.username.clone()))?;
        debug!(username = %user.username, count = account.attributes.len(), "Fetched user attributes");
        Ok(account.attributes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> InMemoryAuthProvider {
        InMemoryAuthProvider::new().with_account(
            "alice",
            "secret",
            [("custom:usage_plan", "gold")],
        )
    }

    #[tokio::test]
    async fn test_sign_in_and_current_user() {
        let auth = provider();
        assert_eq!(auth.current_user().await, Err(AuthError::NotSignedIn));

        let user = auth
            .sign_in(&Credentials::new("alice", "secret"))
            .await
            .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(auth.current_user().await.unwrap(), user);

        let attributes = auth.fetch_user_attributes(&user).await.unwrap();
        assert_eq!(attributes["custom:usage_plan"], "gold");
    }

    #[tokio::test]
    async fn test_sign_in_failures() {
        let auth = provider();
        assert_eq!(
            auth.sign_in(&Credentials::new("alice", "wrong")).await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            auth.sign_in(&Credentials::new("bob", "secret")).await,
            Err(AuthError::UserNotFound("bob".to_string()))
        );
        assert_eq!(auth.current_user().await, Err(AuthError::NotSignedIn));
    }

    #[tokio::test]
    async fn test_sign_out_clears_user() {
        let auth = provider();
        auth.sign_in(&Credentials::new("alice", "secret"))
            .await
            .unwrap();
        auth.sign_out().await.unwrap();
        assert_eq!(auth.current_user().await, Err(AuthError::NotSignedIn));
        // signing out twice is harmless
        auth.sign_out().await.unwrap();
    }
}
