use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::device;
use crate::err::Error;
use crate::models::{Guardian, GuardianSession, LoginRequest, SessionRecord};
use crate::store::CredentialStore;
use crate::token;

/// Where a login attempt stopped.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LoginStage {
    Received,
    TokenLookup,
    GuardianStatusCheck,
    SessionIssuance,
    Issued,
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Exchanges pickup tokens for guardian sessions and resolves the auth
/// codes it has issued. Each login is one attempt; retrying is up to the
/// caller.
#[derive(Clone)]
pub struct GuardianAuthValidator {
    store: Arc<dyn CredentialStore>,
}

impl GuardianAuthValidator {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<GuardianSession, Error> {
        let mut stage = LoginStage::Received;
        let outcome = self.attempt(request, &mut stage).await;
        match &outcome {
            Ok(session) => log::info!(
                "Guardian {} logged in for student {}",
                session.guardian.id,
                session.student.id
            ),
            Err(err) => log::debug!("Guardian login stopped at {}: {}", stage, err),
        }
        outcome
    }

    async fn attempt(
        &self,
        request: &LoginRequest,
        stage: &mut LoginStage,
    ) -> Result<GuardianSession, Error> {
        *stage = LoginStage::TokenLookup;
        let presented = request.token.trim();
        // malformed and unknown tokens fail identically
        if !token::is_well_formed(presented) {
            return Err(Error::invalid_token());
        }
        let guardian = self
            .store
            .guardian_by_token(&token::digest(presented))
            .await?
            .ok_or_else(Error::invalid_token)?;

        *stage = LoginStage::GuardianStatusCheck;
        if !guardian.is_active {
            return Err(Error::inactive_guardian());
        }

        *stage = LoginStage::SessionIssuance;
        let student = self.store.student(guardian.student_id).await?.ok_or_else(|| {
            Error::internal(
                "DataError",
                format!("Guardian {} is bound to a missing student", guardian.id),
            )
        })?;
        let now = Utc::now();
        let record = SessionRecord {
            auth_code: token::generate_auth_code(),
            guardian_id: guardian.id,
            student: student.clone(),
            device: device::register(guardian.id, &request.device, now),
            created_at: now,
        };
        self.store.insert_session(&record).await?;

        *stage = LoginStage::Issued;
        let first_time_login = !guardian.profile_completed;
        Ok(GuardianSession {
            auth_code: record.auth_code,
            guardian,
            student,
            first_time_login,
            requires_profile_completion: first_time_login,
        })
    }

    /// Looks up the guardian behind an auth code. Sessions of a guardian
    /// that has since been deactivated no longer resolve.
    pub async fn resolve(&self, auth_code: &str) -> Result<(SessionRecord, Guardian), Error> {
        let auth_code = auth_code.trim();
        if auth_code.is_empty() {
            return Err(Error::auth("`auth_code` parameter was empty"));
        }
        let session = self
            .store
            .session(auth_code)
            .await?
            .ok_or_else(|| Error::auth("Session does not exist"))?;
        let guardian = self
            .store
            .guardian(session.guardian_id)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| Error::auth("Guardian is no longer active"))?;
        Ok((session, guardian))
    }
}
