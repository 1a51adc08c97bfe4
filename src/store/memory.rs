//! In-memory credential store. Every operation runs under one lock, so a
//! token swap and a lookup never interleave.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CredentialStore, StoreResult};
use crate::err::Error;
use crate::models::{
    AccessScope, Account, Guardian, GuardianId, ProfileFields, RegisteredDevice, SessionRecord,
    StaffMember, Student, StudentId, TokenRecord, TokenWrite,
};

#[derive(Default)]
struct State {
    students: HashMap<StudentId, Student>,
    accounts: HashMap<String, Account>,
    staff: Vec<StaffMember>,
    guardians: HashMap<GuardianId, Guardian>,
    tokens: HashMap<GuardianId, TokenRecord>,
    by_digest: HashMap<String, GuardianId>,
    sessions: HashMap<String, SessionRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::internal("StoreError", "credential store lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::internal("StoreError", "credential store lock poisoned"))
    }

    pub fn add_student(&self, student: Student) -> StoreResult<()> {
        self.write()?.students.insert(student.id, student);
        Ok(())
    }

    pub fn add_account(&self, account: Account) -> StoreResult<()> {
        self.write()?
            .accounts
            .insert(account.auth_code.clone(), account);
        Ok(())
    }

    pub fn add_staff(&self, member: StaffMember) -> StoreResult<()> {
        self.write()?.staff.push(member);
        Ok(())
    }
}

impl State {
    fn in_scope(&self, scope: &AccessScope, guardian: &Guardian) -> bool {
        self.students
            .get(&guardian.student_id)
            .map(|student| scope.covers(student))
            .unwrap_or(false)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn student(&self, id: StudentId) -> StoreResult<Option<Student>> {
        Ok(self.read()?.students.get(&id).cloned())
    }

    async fn account(&self, auth_code: &str) -> StoreResult<Option<Account>> {
        Ok(self.read()?.accounts.get(auth_code).cloned())
    }

    async fn insert_guardian(
        &self,
        guardian: &Guardian,
        token: &TokenRecord,
        cap: usize,
    ) -> StoreResult<TokenWrite> {
        let mut state = self.write()?;
        let active = state
            .guardians
            .values()
            .filter(|g| g.student_id == guardian.student_id && g.is_active)
            .count();
        if active >= cap {
            return Err(Error::LimitExceeded {
                limit: cap,
                message: format!(
                    "Student {} already has {} active guardians",
                    guardian.student_id, active
                ),
            });
        }
        if state.by_digest.contains_key(&token.digest) {
            return Ok(TokenWrite::Duplicate);
        }
        state.by_digest.insert(token.digest.clone(), guardian.id);
        state.tokens.insert(guardian.id, token.clone());
        state.guardians.insert(guardian.id, guardian.clone());
        Ok(TokenWrite::Written)
    }

    async fn guardian(&self, id: GuardianId) -> StoreResult<Option<Guardian>> {
        Ok(self.read()?.guardians.get(&id).cloned())
    }

    async fn guardians_in_scope(
        &self,
        scope: &AccessScope,
        student: Option<StudentId>,
    ) -> StoreResult<Vec<Guardian>> {
        let state = self.read()?;
        let mut guardians: Vec<Guardian> = state
            .guardians
            .values()
            .filter(|g| student.map_or(true, |id| g.student_id == id))
            .filter(|g| state.in_scope(scope, g))
            .cloned()
            .collect();
        guardians.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(guardians)
    }

    async fn deactivate_guardian(
        &self,
        id: GuardianId,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Guardian>> {
        let mut state = self.write()?;
        Ok(state.guardians.get_mut(&id).map(|guardian| {
            if guardian.is_active {
                guardian.is_active = false;
                guardian.updated_at = at;
            }
            guardian.clone()
        }))
    }

    async fn apply_profile(
        &self,
        id: GuardianId,
        fields: &ProfileFields,
        completes: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Guardian>> {
        let mut state = self.write()?;
        let guardian = match state.guardians.get_mut(&id) {
            Some(guardian) if guardian.is_active => guardian,
            _ => return Ok(None),
        };
        fields.clone().merge_into(guardian);
        guardian.profile_completed |= completes;
        guardian.updated_at = at;
        Ok(Some(guardian.clone()))
    }

    async fn token_for(&self, guardian: GuardianId) -> StoreResult<Option<TokenRecord>> {
        Ok(self.read()?.tokens.get(&guardian).cloned())
    }

    async fn swap_token(
        &self,
        expected_digest: &str,
        next: &TokenRecord,
    ) -> StoreResult<TokenWrite> {
        let mut state = self.write()?;
        let current = match state.tokens.get(&next.guardian_id) {
            Some(current) => current.digest.clone(),
            None => return Ok(TokenWrite::Stale),
        };
        if current != expected_digest {
            return Ok(TokenWrite::Stale);
        }
        if state.by_digest.contains_key(&next.digest) {
            return Ok(TokenWrite::Duplicate);
        }
        state.by_digest.remove(&current);
        state.by_digest.insert(next.digest.clone(), next.guardian_id);
        state.tokens.insert(next.guardian_id, next.clone());
        Ok(TokenWrite::Written)
    }

    async fn guardian_by_token(&self, digest: &str) -> StoreResult<Option<Guardian>> {
        let state = self.read()?;
        Ok(state
            .by_digest
            .get(digest)
            .and_then(|id| state.guardians.get(id))
            .cloned())
    }

    async fn insert_session(&self, session: &SessionRecord) -> StoreResult<()> {
        self.write()?
            .sessions
            .insert(session.auth_code.clone(), session.clone());
        Ok(())
    }

    async fn session(&self, auth_code: &str) -> StoreResult<Option<SessionRecord>> {
        Ok(self.read()?.sessions.get(auth_code).cloned())
    }

    async fn delete_session(&self, auth_code: &str) -> StoreResult<bool> {
        Ok(self.write()?.sessions.remove(auth_code).is_some())
    }

    async fn devices_for_guardian(
        &self,
        guardian: GuardianId,
    ) -> StoreResult<Vec<RegisteredDevice>> {
        let state = self.read()?;
        let mut devices: Vec<RegisteredDevice> = state
            .sessions
            .values()
            .filter(|s| s.guardian_id == guardian)
            .filter_map(|s| s.device.clone())
            .collect();
        devices.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        Ok(devices)
    }

    async fn staff_directory(&self) -> StoreResult<Vec<StaffMember>> {
        Ok(self.read()?.staff.clone())
    }
}
