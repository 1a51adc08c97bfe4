//! Storage contract for guardians, their pickup tokens and sessions.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::err::Error;
use crate::models::{
    AccessScope, Account, Guardian, GuardianId, ProfileFields, RegisteredDevice, SessionRecord,
    StaffMember, Student, StudentId, TokenRecord, TokenWrite,
};

pub type StoreResult<T> = Result<T, Error>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn student(&self, id: StudentId) -> StoreResult<Option<Student>>;

    /// Resolve a staff or parent account by its auth code.
    async fn account(&self, auth_code: &str) -> StoreResult<Option<Account>>;

    /// Insert a guardian together with its first token. Fails with
    /// `LimitExceeded` when the student already has `cap` active guardians;
    /// the count and the insert happen as one step.
    async fn insert_guardian(
        &self,
        guardian: &Guardian,
        token: &TokenRecord,
        cap: usize,
    ) -> StoreResult<TokenWrite>;

    async fn guardian(&self, id: GuardianId) -> StoreResult<Option<Guardian>>;

    async fn guardians_in_scope(
        &self,
        scope: &AccessScope,
        student: Option<StudentId>,
    ) -> StoreResult<Vec<Guardian>>;

    /// Clears `is_active` and leaves every other column alone. `updated_at`
    /// only moves when the guardian was active. `None` if it does not exist.
    async fn deactivate_guardian(
        &self,
        id: GuardianId,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Guardian>>;

    /// Merges the supplied profile fields into an active guardian; only the
    /// profile columns, `profile_completed` and `updated_at` are written.
    /// `None` if the guardian does not exist or is no longer active.
    async fn apply_profile(
        &self,
        id: GuardianId,
        fields: &ProfileFields,
        completes: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Guardian>>;

    async fn token_for(&self, guardian: GuardianId) -> StoreResult<Option<TokenRecord>>;

    /// Replace the guardian's token only if its current digest still equals
    /// `expected_digest`. The old digest stops resolving in the same step.
    async fn swap_token(
        &self,
        expected_digest: &str,
        next: &TokenRecord,
    ) -> StoreResult<TokenWrite>;

    async fn guardian_by_token(&self, digest: &str) -> StoreResult<Option<Guardian>>;

    async fn insert_session(&self, session: &SessionRecord) -> StoreResult<()>;

    async fn session(&self, auth_code: &str) -> StoreResult<Option<SessionRecord>>;

    /// Returns whether a session was removed.
    async fn delete_session(&self, auth_code: &str) -> StoreResult<bool>;

    async fn devices_for_guardian(&self, guardian: GuardianId)
        -> StoreResult<Vec<RegisteredDevice>>;

    async fn staff_directory(&self) -> StoreResult<Vec<StaffMember>>;
}
