use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{self, ContactDirectory};
use crate::auth::GuardianAuthValidator;
use crate::config::Config;
use crate::err::{Error, FieldError};
use crate::models::{
    AccessScope, Account, Guardian, GuardianId, GuardianSession, IssuedToken, LoginRequest,
    PickupCard, ProfileFields, RegisteredDevice, SessionView, StudentId, TokenRecord,
    TokenWrite,
};
use crate::store::CredentialStore;
use crate::{token, validation};

/// Attempts at finding an unused token before giving up.
const TOKEN_ATTEMPTS: usize = 2;

pub type SharedService = Arc<CredentialService>;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub pickup_base_url: String,
    pub max_active_guardians: usize,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            pickup_base_url: config.pickup_base_url.clone(),
            max_active_guardians: config.max_active_guardians,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateGuardian {
    #[serde(default)]
    pub student_id: Option<StudentId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub relation: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianList {
    pub guardians: Vec<Guardian>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceList {
    pub devices: Vec<RegisteredDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedOut {
    pub session_removed: bool,
}

pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    validator: GuardianAuthValidator,
    settings: ServiceSettings,
}

impl CredentialService {
    pub fn new(store: Arc<dyn CredentialStore>, settings: ServiceSettings) -> Self {
        Self {
            validator: GuardianAuthValidator::new(store.clone()),
            store,
            settings,
        }
    }

    fn pickup_url(&self, token: &str) -> String {
        token::pickup_url(&self.settings.pickup_base_url, token)
    }

    async fn account(&self, auth_code: &str) -> Result<Account, Error> {
        let auth_code = auth_code.trim();
        if auth_code.is_empty() {
            return Err(Error::auth("`auth_code` parameter was empty"));
        }
        self.store
            .account(auth_code)
            .await?
            .ok_or_else(|| Error::auth("Auth code is not valid"))
    }

    /// The guardian must exist and belong to a student the account manages.
    async fn managed_guardian(
        &self,
        auth_code: &str,
        guardian_id: GuardianId,
    ) -> Result<Guardian, Error> {
        let account = self.account(auth_code).await?;
        let guardian = self
            .store
            .guardian(guardian_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Guardian {} does not exist", guardian_id)))?;
        let student = self.store.student(guardian.student_id).await?.ok_or_else(|| {
            Error::not_found(format!("Student {} does not exist", guardian.student_id))
        })?;
        if !AccessScope::of(&account).covers(&student) {
            log::warn!(
                "Account with role {} tried to manage guardian {} outside its scope",
                account.role.as_str(),
                guardian_id
            );
            return Err(Error::auth("Not allowed to manage this guardian"));
        }
        Ok(guardian)
    }

    pub async fn create_guardian(&self, request: CreateGuardian) -> Result<PickupCard, Error> {
        let new = validation::new_guardian(
            request.student_id,
            &request.name,
            &request.relation,
            request.phone.as_deref(),
        )?;
        if self.store.student(new.student_id).await?.is_none() {
            return Err(Error::invalid(vec![FieldError::new(
                "student_id",
                "does not exist",
            )]));
        }

        let now = Utc::now();
        let guardian = Guardian {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            name: new.name,
            relation: new.relation,
            phone: new.phone,
            email: None,
            national_id: None,
            address: None,
            emergency_contact: None,
            photo_url: None,
            is_active: true,
            profile_completed: false,
            created_at: now,
            updated_at: now,
        };

        for _ in 0..TOKEN_ATTEMPTS {
            let token = token::generate();
            let record = TokenRecord {
                guardian_id: guardian.id,
                digest: token::digest(&token),
                issued_at: now,
            };
            match self
                .store
                .insert_guardian(&guardian, &record, self.settings.max_active_guardians)
                .await?
            {
                TokenWrite::Written => {
                    log::info!(
                        "Created guardian {} ({}) for student {}",
                        guardian.id,
                        guardian.relation,
                        guardian.student_id
                    );
                    return Ok(PickupCard {
                        pickup_url: self.pickup_url(&token),
                        guardian,
                        token,
                        issued_at: now,
                    });
                }
                TokenWrite::Duplicate | TokenWrite::Stale => {
                    log::warn!("Pickup token collision for new guardian, regenerating");
                }
            }
        }
        Err(Error::internal(
            "TokenError",
            "Could not issue a unique pickup token!",
        ))
    }

    pub async fn list_guardians(
        &self,
        auth_code: &str,
        student_id: Option<StudentId>,
    ) -> Result<Vec<Guardian>, Error> {
        let account = self.account(auth_code).await?;
        let scope = AccessScope::of(&account);
        self.store.guardians_in_scope(&scope, student_id).await
    }

    /// Issues a new token and retires the current one in the same store
    /// write. A rotation that loses a race against another one for the same
    /// guardian fails with `Conflict` and changes nothing.
    pub async fn rotate_token(
        &self,
        auth_code: &str,
        guardian_id: GuardianId,
    ) -> Result<IssuedToken, Error> {
        let guardian = self.managed_guardian(auth_code, guardian_id).await?;
        let current = self.store.token_for(guardian.id).await?.ok_or_else(|| {
            Error::not_found(format!("Guardian {} has no pickup token", guardian.id))
        })?;

        for _ in 0..TOKEN_ATTEMPTS {
            let token = token::generate();
            let next = TokenRecord {
                guardian_id: guardian.id,
                digest: token::digest(&token),
                issued_at: Utc::now(),
            };
            match self.store.swap_token(&current.digest, &next).await? {
                TokenWrite::Written => {
                    log::info!("Rotated pickup token of guardian {}", guardian.id);
                    return Ok(IssuedToken {
                        guardian_id: guardian.id,
                        pickup_url: self.pickup_url(&token),
                        token,
                        issued_at: next.issued_at,
                    });
                }
                TokenWrite::Stale => {
                    log::warn!(
                        "Concurrent rotation detected for guardian {}, keeping the winner",
                        guardian.id
                    );
                    return Err(Error::Conflict {
                        message: "The pickup token was rotated concurrently".to_string(),
                    });
                }
                TokenWrite::Duplicate => {
                    log::warn!("Pickup token collision on rotation, regenerating");
                }
            }
        }
        Err(Error::internal(
            "TokenError",
            "Could not issue a unique pickup token!",
        ))
    }

    /// Status flip only; the record and its history stay.
    pub async fn deactivate_guardian(
        &self,
        auth_code: &str,
        guardian_id: GuardianId,
    ) -> Result<Guardian, Error> {
        let guardian = self.managed_guardian(auth_code, guardian_id).await?;
        let was_active = guardian.is_active;
        let guardian = self
            .store
            .deactivate_guardian(guardian.id, Utc::now())
            .await?
            .ok_or_else(|| Error::not_found(format!("Guardian {} does not exist", guardian_id)))?;
        if was_active {
            log::info!("Deactivated guardian {}", guardian.id);
        }
        Ok(guardian)
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<GuardianSession, Error> {
        self.validator.login(request).await
    }

    pub async fn session(&self, auth_code: &str) -> Result<SessionView, Error> {
        let (session, guardian) = self.validator.resolve(auth_code).await?;
        let student = self
            .store
            .student(session.student.id)
            .await?
            .unwrap_or(session.student);
        Ok(SessionView { guardian, student })
    }

    pub async fn complete_profile(
        &self,
        auth_code: &str,
        fields: ProfileFields,
    ) -> Result<Guardian, Error> {
        let fields = validation::profile(fields)?;
        if fields.is_empty() {
            return Err(Error::invalid(vec![FieldError::new(
                "profile",
                "at least one field is required",
            )]));
        }
        self.apply_profile(auth_code, fields, true).await
    }

    pub async fn update_profile(
        &self,
        auth_code: &str,
        fields: ProfileFields,
    ) -> Result<Guardian, Error> {
        let fields = validation::profile(fields)?;
        self.apply_profile(auth_code, fields, false).await
    }

    async fn apply_profile(
        &self,
        auth_code: &str,
        fields: ProfileFields,
        completes: bool,
    ) -> Result<Guardian, Error> {
        let (_, current) = self.validator.resolve(auth_code).await.map_err(|err| match err {
            Error::AuthError { message } => Error::NotFound { message },
            other => other,
        })?;

        let guardian = self
            .store
            .apply_profile(current.id, &fields, completes, Utc::now())
            .await?
            .ok_or_else(|| Error::not_found("Guardian is no longer active"))?;
        if completes && !current.profile_completed {
            log::info!("Guardian {} completed their profile", guardian.id);
        }
        Ok(guardian)
    }

    pub async fn logout(&self, auth_code: &str) -> Result<LoggedOut, Error> {
        let session_removed = self.store.delete_session(auth_code.trim()).await?;
        Ok(LoggedOut { session_removed })
    }

    pub async fn contacts(&self, auth_code: &str) -> Result<ContactDirectory, Error> {
        let (session, _) = self.validator.resolve(auth_code).await?;
        let staff = self.store.staff_directory().await?;
        Ok(access::scoped_contacts(&session, &staff))
    }

    /// Staff view of the devices registered for a managed guardian.
    pub async fn list_devices(
        &self,
        auth_code: &str,
        guardian_id: GuardianId,
    ) -> Result<DeviceList, Error> {
        let guardian = self.managed_guardian(auth_code, guardian_id).await?;
        let devices = self.guardian_devices(guardian.id).await?;
        Ok(DeviceList { devices })
    }

    /// Devices the messaging side can notify for a guardian.
    pub async fn guardian_devices(
        &self,
        guardian_id: GuardianId,
    ) -> Result<Vec<RegisteredDevice>, Error> {
        self.store.devices_for_guardian(guardian_id).await
    }
}
