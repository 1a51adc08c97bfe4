//! How the guardian app reaches the credential service.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::access::ContactDirectory;
use crate::config::ClientConfig;
use crate::err::{Error, Maybe};
use crate::models::{Guardian, GuardianSession, LoginRequest, ProfileFields, SessionView};
use crate::routes::{AuthCodeOnly, ProfileRequest};
use crate::service::{LoggedOut, SharedService};

#[async_trait]
pub trait GuardianApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<GuardianSession, Error>;

    async fn session(&self, auth_code: &str) -> Result<SessionView, Error>;

    async fn complete_profile(
        &self,
        auth_code: &str,
        fields: &ProfileFields,
    ) -> Result<Guardian, Error>;

    async fn update_profile(&self, auth_code: &str, fields: &ProfileFields)
        -> Result<Guardian, Error>;

    async fn contacts(&self, auth_code: &str) -> Result<ContactDirectory, Error>;

    async fn logout(&self, auth_code: &str) -> Result<LoggedOut, Error>;
}

/// JSON over HTTP with a hard per-request timeout. A timeout surfaces as
/// `Error::Timeout`.
pub struct HttpGuardianApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGuardianApi {
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        match serde_json::from_slice::<Maybe<T>>(&bytes) {
            Ok(envelope) => envelope.into_result(),
            Err(err) => {
                log::warn!("Unreadable response from {} ({}): {}", url, status, err);
                Err(Error::internal(
                    "TransportError",
                    format!("unexpected response with status {}", status),
                ))
            }
        }
    }
}

fn auth_only(auth_code: &str) -> AuthCodeOnly {
    AuthCodeOnly {
        auth_code: auth_code.to_string(),
    }
}

fn profile_request(auth_code: &str, fields: &ProfileFields) -> ProfileRequest {
    ProfileRequest {
        auth_code: auth_code.to_string(),
        value: fields.clone(),
    }
}

#[async_trait]
impl GuardianApi for HttpGuardianApi {
    async fn login(&self, request: &LoginRequest) -> Result<GuardianSession, Error> {
        self.call("/guardian/login", request).await
    }

    async fn session(&self, auth_code: &str) -> Result<SessionView, Error> {
        self.call("/guardian/session", &auth_only(auth_code)).await
    }

    async fn complete_profile(
        &self,
        auth_code: &str,
        fields: &ProfileFields,
    ) -> Result<Guardian, Error> {
        self.call(
            "/guardian/profile/complete",
            &profile_request(auth_code, fields),
        )
        .await
    }

    async fn update_profile(
        &self,
        auth_code: &str,
        fields: &ProfileFields,
    ) -> Result<Guardian, Error> {
        self.call(
            "/guardian/profile/update",
            &profile_request(auth_code, fields),
        )
        .await
    }

    async fn contacts(&self, auth_code: &str) -> Result<ContactDirectory, Error> {
        self.call("/guardian/contacts", &auth_only(auth_code)).await
    }

    async fn logout(&self, auth_code: &str) -> Result<LoggedOut, Error> {
        self.call("/guardian/logout", &auth_only(auth_code)).await
    }
}

/// Calls a service living in the same process.
#[derive(Clone)]
pub struct LocalGuardianApi {
    service: SharedService,
}

impl LocalGuardianApi {
    pub fn new(service: SharedService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl GuardianApi for LocalGuardianApi {
    async fn login(&self, request: &LoginRequest) -> Result<GuardianSession, Error> {
        self.service.login(request).await
    }

    async fn session(&self, auth_code: &str) -> Result<SessionView, Error> {
        self.service.session(auth_code).await
    }

    async fn complete_profile(
        &self,
        auth_code: &str,
        fields: &ProfileFields,
    ) -> Result<Guardian, Error> {
        self.service
            .complete_profile(auth_code, fields.clone())
            .await
    }

    async fn update_profile(
        &self,
        auth_code: &str,
        fields: &ProfileFields,
    ) -> Result<Guardian, Error> {
        self.service.update_profile(auth_code, fields.clone()).await
    }

    async fn contacts(&self, auth_code: &str) -> Result<ContactDirectory, Error> {
        self.service.contacts(auth_code).await
    }

    async fn logout(&self, auth_code: &str) -> Result<LoggedOut, Error> {
        self.service.logout(auth_code).await
    }
}
