use axum::extract::rejection::JsonRejection;
use axum::handler::Handler;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::access::ContactDirectory;
use crate::err::{self, Error, FieldError};
use crate::models::{
    Guardian, GuardianId, GuardianSession, IssuedToken, LoginRequest, PickupCard, ProfileFields,
    SessionView, StudentId,
};
use crate::service::{CreateGuardian, DeviceList, GuardianList, LoggedOut, SharedService};
use crate::{settle, Payload};

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/guardian/create", post(create_guardian))
        .route("/guardian/list", post(list_guardians))
        .route("/guardian/rotate", post(rotate_token))
        .route("/guardian/deactivate", post(deactivate_guardian))
        .route("/guardian/devices", post(list_devices))
        .route("/guardian/login", post(login_guardian))
        .route("/guardian/session", post(read_session))
        .route("/guardian/profile/complete", post(complete_profile))
        .route("/guardian/profile/update", post(update_profile))
        .route("/guardian/contacts", post(list_contacts))
        .route("/guardian/logout", post(logout_guardian))
        .fallback(err::handler404.into_service())
        .layer(Extension(service))
}

/// A request made on behalf of an auth code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureSession<V> {
    pub auth_code: String,
    #[serde(flatten)]
    pub value: V,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeOnly {
    pub auth_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentFilter {
    #[serde(default)]
    pub student_id: Option<StudentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianRef {
    pub guardian_id: GuardianId,
}

pub type ProfileRequest = EnsureSession<ProfileFields>;

type Body<T> = Result<Json<T>, JsonRejection>;

/// Unreadable bodies are answered inside the envelope like any other input
/// error.
fn body<T>(payload: Body<T>) -> Result<T, Error> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        log::debug!("Rejected request body: {}", rejection);
        Error::invalid(vec![FieldError::new("body", rejection.to_string())])
    })
}

async fn create_guardian(
    Extension(service): Extension<SharedService>,
    payload: Body<CreateGuardian>,
) -> Payload<PickupCard> {
    settle(match body(payload) {
        Ok(request) => service.create_guardian(request).await,
        Err(err) => Err(err),
    })
}

async fn list_guardians(
    Extension(service): Extension<SharedService>,
    payload: Body<EnsureSession<StudentFilter>>,
) -> Payload<GuardianList> {
    settle(match body(payload) {
        Ok(EnsureSession { auth_code, value }) => service
            .list_guardians(&auth_code, value.student_id)
            .await
            .map(|guardians| GuardianList { guardians }),
        Err(err) => Err(err),
    })
}

async fn rotate_token(
    Extension(service): Extension<SharedService>,
    payload: Body<EnsureSession<GuardianRef>>,
) -> Payload<IssuedToken> {
    settle(match body(payload) {
        Ok(EnsureSession { auth_code, value }) => {
            service.rotate_token(&auth_code, value.guardian_id).await
        }
        Err(err) => Err(err),
    })
}

async fn deactivate_guardian(
    Extension(service): Extension<SharedService>,
    payload: Body<EnsureSession<GuardianRef>>,
) -> Payload<Guardian> {
    settle(match body(payload) {
        Ok(EnsureSession { auth_code, value }) => {
            service
                .deactivate_guardian(&auth_code, value.guardian_id)
                .await
        }
        Err(err) => Err(err),
    })
}

async fn list_devices(
    Extension(service): Extension<SharedService>,
    payload: Body<EnsureSession<GuardianRef>>,
) -> Payload<DeviceList> {
    settle(match body(payload) {
        Ok(EnsureSession { auth_code, value }) => {
            service.list_devices(&auth_code, value.guardian_id).await
        }
        Err(err) => Err(err),
    })
}

async fn login_guardian(
    Extension(service): Extension<SharedService>,
    payload: Body<LoginRequest>,
) -> Payload<GuardianSession> {
    settle(match body(payload) {
        Ok(login) => service.login(&login).await,
        Err(err) => Err(err),
    })
}

async fn read_session(
    Extension(service): Extension<SharedService>,
    payload: Body<AuthCodeOnly>,
) -> Payload<SessionView> {
    settle(match body(payload) {
        Ok(AuthCodeOnly { auth_code }) => service.session(&auth_code).await,
        Err(err) => Err(err),
    })
}

async fn complete_profile(
    Extension(service): Extension<SharedService>,
    payload: Body<ProfileRequest>,
) -> Payload<Guardian> {
    settle(match body(payload) {
        Ok(EnsureSession { auth_code, value }) => {
            service.complete_profile(&auth_code, value).await
        }
        Err(err) => Err(err),
    })
}

async fn update_profile(
    Extension(service): Extension<SharedService>,
    payload: Body<ProfileRequest>,
) -> Payload<Guardian> {
    settle(match body(payload) {
        Ok(EnsureSession { auth_code, value }) => service.update_profile(&auth_code, value).await,
        Err(err) => Err(err),
    })
}

async fn list_contacts(
    Extension(service): Extension<SharedService>,
    payload: Body<AuthCodeOnly>,
) -> Payload<ContactDirectory> {
    settle(match body(payload) {
        Ok(AuthCodeOnly { auth_code }) => service.contacts(&auth_code).await,
        Err(err) => Err(err),
    })
}

async fn logout_guardian(
    Extension(service): Extension<SharedService>,
    payload: Body<AuthCodeOnly>,
) -> Payload<LoggedOut> {
    settle(match body(payload) {
        Ok(AuthCodeOnly { auth_code }) => service.logout(&auth_code).await,
        Err(err) => Err(err),
    })
}
