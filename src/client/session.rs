//! App-side flow around the guardian session: start-up auto-resume,
//! login from a scanned or typed token, revalidation and logout.

use std::fmt;
use std::sync::Arc;

use crate::access::ContactDirectory;
use crate::client::api::GuardianApi;
use crate::client::cache::{CachedCredentials, CredentialCache};
use crate::err::{Error, LOGIN_FAILED};
use crate::models::{DeviceClaim, Guardian, GuardianSession, LoginRequest, ProfileFields};
use crate::token;

/// Where the token came from. Both end up as the same login call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenInput {
    /// Payload read from the pickup QR code.
    Scanned(String),
    /// Token or pickup link typed or pasted by the guardian.
    Manual(String),
}

impl TokenInput {
    pub fn token(&self) -> String {
        match self {
            TokenInput::Scanned(payload) | TokenInput::Manual(payload) => token::extract(payload),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Startup {
    Resume(CachedCredentials),
    Login,
}

/// What the login screen shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginFailure {
    /// Unknown, rotated or deactivated credential; never told apart.
    Rejected,
    /// The service did not answer in time; offer a retry or manual entry.
    TimedOut,
    Unavailable(Error),
}

impl LoginFailure {
    pub fn can_retry(&self) -> bool {
        !matches!(self, LoginFailure::Rejected)
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginFailure::Rejected => f.write_str(LOGIN_FAILED),
            LoginFailure::TimedOut => f.write_str("The school did not respond in time, try again"),
            LoginFailure::Unavailable(_) => f.write_str("Pickup service unavailable, try again"),
        }
    }
}

impl From<Error> for LoginFailure {
    fn from(err: Error) -> Self {
        if err.is_login_failure() {
            LoginFailure::Rejected
        } else if matches!(err, Error::Timeout { .. }) {
            LoginFailure::TimedOut
        } else {
            LoginFailure::Unavailable(err)
        }
    }
}

pub struct GuardianSessionManager {
    api: Arc<dyn GuardianApi>,
    cache: Arc<dyn CredentialCache>,
}

impl GuardianSessionManager {
    pub fn new(api: Arc<dyn GuardianApi>, cache: Arc<dyn CredentialCache>) -> Self {
        Self { api, cache }
    }

    /// Decides between the dashboard and the login screen.
    pub async fn start(&self) -> Startup {
        match self.cache.load().await {
            Some(cached) => Startup::Resume(cached),
            None => Startup::Login,
        }
    }

    pub async fn login(
        &self,
        input: TokenInput,
        device: DeviceClaim,
    ) -> Result<GuardianSession, LoginFailure> {
        let request = LoginRequest {
            token: input.token(),
            device,
        };
        let session = self.api.login(&request).await.map_err(|err| {
            log::info!("Guardian login failed: {}", err);
            LoginFailure::from(err)
        })?;

        if !self
            .cache
            .store(&session.guardian, &session.auth_code, &session.student)
            .await
        {
            log::warn!("Guardian session not cached, auto-resume disabled until next login");
        }
        Ok(session)
    }

    /// Re-reads the session from the service. When the service no longer
    /// accepts the cached auth code the cache is cleared.
    pub async fn refresh(&self, cached: &CachedCredentials) -> Result<CachedCredentials, Error> {
        match self.api.session(&cached.auth_code).await {
            Ok(view) => {
                self.cache
                    .store(&view.guardian, &cached.auth_code, &view.student)
                    .await;
                Ok(CachedCredentials {
                    auth_code: cached.auth_code.clone(),
                    guardian: view.guardian,
                    student: view.student,
                })
            }
            Err(err) => Err(self.evict_if_revoked(err).await),
        }
    }

    pub async fn complete_profile(
        &self,
        cached: &CachedCredentials,
        fields: &ProfileFields,
    ) -> Result<Guardian, Error> {
        match self.api.complete_profile(&cached.auth_code, fields).await {
            Ok(guardian) => Ok(self.remember(cached, guardian).await),
            Err(err) => Err(self.evict_if_revoked(err).await),
        }
    }

    pub async fn update_profile(
        &self,
        cached: &CachedCredentials,
        fields: &ProfileFields,
    ) -> Result<Guardian, Error> {
        match self.api.update_profile(&cached.auth_code, fields).await {
            Ok(guardian) => Ok(self.remember(cached, guardian).await),
            Err(err) => Err(self.evict_if_revoked(err).await),
        }
    }

    pub async fn contacts(&self, cached: &CachedCredentials) -> Result<ContactDirectory, Error> {
        match self.api.contacts(&cached.auth_code).await {
            Ok(directory) => Ok(directory),
            Err(err) => Err(self.evict_if_revoked(err).await),
        }
    }

    /// Always clears the local slot, even when the service cannot be told.
    pub async fn logout(&self, cached: &CachedCredentials) {
        if let Err(err) = self.api.logout(&cached.auth_code).await {
            log::warn!("Server-side logout failed: {}", err);
        }
        self.cache.clear().await;
    }

    async fn remember(&self, cached: &CachedCredentials, guardian: Guardian) -> Guardian {
        self.cache
            .store(&guardian, &cached.auth_code, &cached.student)
            .await;
        guardian
    }

    async fn evict_if_revoked(&self, err: Error) -> Error {
        if err.revokes_session() {
            log::info!("Cached guardian session rejected by the service, clearing it");
            self.cache.clear().await;
        }
        err
    }
}
