//! Guardian pickup credentials: QR pickup tokens for people collecting a
//! student, the sessions exchanged for them, and the app-side cache that
//! keeps a guardian signed in.

pub mod access;
pub mod auth;
pub mod client;
pub mod config;
pub mod device;
pub mod err;
pub mod models;
pub mod routes;
pub mod service;
pub mod store;
pub mod token;
pub mod validation;

use axum::Json;
use serde::Serialize;

use crate::err::{Error, Fine, Maybe, Nothing};

pub use config::{ClientConfig, Config};
pub use service::{CredentialService, ServiceSettings, SharedService};
pub use store::{CredentialStore, InMemoryStore, PostgresStore};

pub type Payload<T> = axum::response::Result<Json<Maybe<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Fine(value)))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Nothing(err)))
}

/// Folds a service result into the response envelope.
pub fn settle<V>(result: Result<V, Error>) -> Payload<V>
where
    V: Serialize,
{
    match result {
        Ok(value) => proceeds(value),
        Err(err) => breaks(err),
    }
}
