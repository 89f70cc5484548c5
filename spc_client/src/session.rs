//! Session context
//!
//! A [`Session`] holds the bearer token and the signed-in user. It is passed
//! explicitly into every registry call; nothing is kept in globals, so any
//! number of independent sessions can exist side by side.

use spc_model::{Credentials, CurrentUser, Permission, Registered};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::{ClientError, Result};

#[derive(Clone, Default)]
pub struct Session {
    token: Option<String>,
    user: Option<CurrentUser>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.token.is_some())
            .field("user", &self.user)
            .finish()
    }
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A session for a token obtained earlier, e.g. read back from disk. The
    /// user is unknown until [`Session::refresh`].
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            user: None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&CurrentUser> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Whether the known user's role grants `permission`. Unknown users get
    /// nothing.
    pub fn can(&self, permission: Permission) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| user.role.allows(permission))
    }

    pub(crate) fn bearer(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| ClientError::Unauthorized("Not signed in.".to_string()))
    }

    pub fn clear(&mut self) {
        self.token = None;
        self.user = None;
    }

    pub async fn register<B: Backend>(
        backend: &B,
        email: &str,
        password: &str,
    ) -> Result<Registered> {
        let registered = backend
            .register(&Credentials::new(email, password))
            .await?;
        info!(user_id = registered.id, "Registered");
        Ok(registered)
    }

    /// Exchanges credentials for a token and loads the user behind it. If the
    /// user cannot be loaded the fresh token is revoked before returning.
    pub async fn login<B: Backend>(backend: &B, email: &str, password: &str) -> Result<Session> {
        let response = backend.login(&Credentials::new(email, password)).await?;
        let mut session = Session::with_token(response.token);
        if let Err(err) = session.refresh(backend).await {
            if let Err(revoke) = backend.logout(&session).await {
                warn!(error = %revoke, "Could not revoke token after failed login");
            }
            return Err(err);
        }
        Ok(session)
    }

    pub async fn refresh<B: Backend>(&mut self, backend: &B) -> Result<&CurrentUser> {
        let user = backend.me(self).await?;
        debug!(user_id = user.id, role = %user.role, "Session user loaded");
        Ok(&*self.user.insert(user))
    }

    /// Revokes the token and forgets it locally, even when the server
    /// already considered it invalid.
    pub async fn logout<B: Backend>(&mut self, backend: &B) -> Result<()> {
        let result = match backend.logout(self).await {
            Err(ClientError::Unauthorized(_)) => Ok(()),
            other => other,
        };
        self.clear();
        result
    }
}
