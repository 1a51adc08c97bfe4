//! Guardian app side of the pickup credential flow.

pub mod api;
pub mod cache;
pub mod session;

pub use api::{GuardianApi, HttpGuardianApi, LocalGuardianApi};
pub use cache::{CachedCredentials, CredentialCache, FileCredentialCache, MemoryCredentialCache};
pub use session::{GuardianSessionManager, LoginFailure, Startup, TokenInput};
