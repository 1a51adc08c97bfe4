use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgQueryResult;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, StoreResult};
use crate::err::Error;
use crate::models::{
    AccessScope, Account, AccountRole, DevicePlatform, Guardian, GuardianId, ProfileFields,
    RegisteredDevice, Relation, SessionRecord, StaffMember, StaffRole, Student, StudentId,
    TokenRecord, TokenWrite,
};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GuardianRow {
    id: Uuid,
    student_id: i64,
    name: String,
    relation: String,
    phone: Option<String>,
    email: Option<String>,
    national_id: Option<String>,
    address: Option<String>,
    emergency_contact: Option<String>,
    photo_url: Option<String>,
    is_active: bool,
    profile_completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GuardianRow> for Guardian {
    type Error = Error;

    fn try_from(row: GuardianRow) -> Result<Self, Self::Error> {
        let relation = row
            .relation
            .parse::<Relation>()
            .map_err(|message| Error::internal("DataError", message))?;
        Ok(Guardian {
            id: row.id,
            student_id: row.student_id,
            name: row.name,
            relation,
            phone: row.phone,
            email: row.email,
            national_id: row.national_id,
            address: row.address,
            emergency_contact: row.emergency_contact,
            photo_url: row.photo_url,
            is_active: row.is_active,
            profile_completed: row.profile_completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn guardians(rows: Vec<GuardianRow>) -> StoreResult<Vec<Guardian>> {
    rows.into_iter().map(Guardian::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    guardian_id: Uuid,
    digest: String,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    auth_code: String,
    role: String,
    branch_id: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    auth_code: String,
    guardian_id: Uuid,
    student_id: i64,
    student_name: String,
    branch_id: i64,
    device_token: Option<String>,
    device_type: Option<String>,
    device_name: Option<String>,
    registered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl SessionRow {
    fn device(&self) -> Option<RegisteredDevice> {
        match (&self.device_token, self.registered_at) {
            (Some(token), Some(registered_at)) => Some(RegisteredDevice {
                guardian_id: self.guardian_id,
                device_token: token.clone(),
                device_type: DevicePlatform::parse(self.device_type.as_deref().unwrap_or("")),
                device_name: self.device_name.clone(),
                registered_at,
            }),
            _ => None,
        }
    }
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        let device = row.device();
        SessionRecord {
            auth_code: row.auth_code,
            guardian_id: row.guardian_id,
            student: Student {
                id: row.student_id,
                name: row.student_name,
                branch_id: row.branch_id,
            },
            device,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StaffRow {
    id: i64,
    name: String,
    email: Option<String>,
    title: Option<String>,
    role: String,
    branch_id: Option<i64>,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

fn written(res: Result<PgQueryResult, sqlx::Error>) -> StoreResult<TokenWrite> {
    match res {
        Ok(done) if done.rows_affected() >= 1 => Ok(TokenWrite::Written),
        Ok(_) => Ok(TokenWrite::Stale),
        Err(err) if is_unique_violation(&err) => Ok(TokenWrite::Duplicate),
        Err(err) => Err(Error::from(err)),
    }
}

#[async_trait]
impl CredentialStore for PostgresStore {
    async fn student(&self, id: StudentId) -> StoreResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(
            "SELECT id, name, branch_id FROM students WHERE id = $1 LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }

    async fn account(&self, auth_code: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT auth_code, role, branch_id FROM accounts WHERE auth_code = $1 LIMIT 1",
        )
        .bind(auth_code)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let role = AccountRole::parse(&row.role).ok_or_else(|| {
            Error::internal("DataError", format!("unknown account role `{}`", row.role))
        })?;
        let student_ids = sqlx::query_scalar::<_, i64>(
            "SELECT student_id FROM account_students WHERE auth_code = $1 ORDER BY student_id",
        )
        .bind(&row.auth_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Account {
            auth_code: row.auth_code,
            role,
            branch_id: row.branch_id,
            student_ids,
        }))
    }

    async fn insert_guardian(
        &self,
        guardian: &Guardian,
        token: &TokenRecord,
        cap: usize,
    ) -> StoreResult<TokenWrite> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the student serializes concurrent creations for it.
        sqlx::query("SELECT id FROM students WHERE id = $1 FOR UPDATE")
            .bind(guardian.student_id)
            .fetch_optional(&mut tx)
            .await?;

        let active = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM guardians WHERE student_id = $1 AND is_active",
        )
        .bind(guardian.student_id)
        .fetch_one(&mut tx)
        .await?;

        if active >= cap as i64 {
            return Err(Error::LimitExceeded {
                limit: cap,
                message: format!(
                    "Student {} already has {} active guardians",
                    guardian.student_id, active
                ),
            });
        }

        sqlx::query(
            "INSERT INTO guardians (id, student_id, name, relation, phone, email, national_id, \
             address, emergency_contact, photo_url, is_active, profile_completed, created_at, \
             updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(guardian.id)
        .bind(guardian.student_id)
        .bind(&guardian.name)
        .bind(guardian.relation.as_str())
        .bind(&guardian.phone)
        .bind(&guardian.email)
        .bind(&guardian.national_id)
        .bind(&guardian.address)
        .bind(&guardian.emergency_contact)
        .bind(&guardian.photo_url)
        .bind(guardian.is_active)
        .bind(guardian.profile_completed)
        .bind(guardian.created_at)
        .bind(guardian.updated_at)
        .execute(&mut tx)
        .await?;

        let res = sqlx::query(
            "INSERT INTO pickup_tokens (guardian_id, digest, issued_at) VALUES ($1, $2, $3)",
        )
        .bind(token.guardian_id)
        .bind(&token.digest)
        .bind(token.issued_at)
        .execute(&mut tx)
        .await;

        match written(res)? {
            TokenWrite::Written => {
                tx.commit().await?;
                Ok(TokenWrite::Written)
            }
            // dropping the transaction rolls the guardian insert back
            other => Ok(other),
        }
    }

    async fn guardian(&self, id: GuardianId) -> StoreResult<Option<Guardian>> {
        let row = sqlx::query_as::<_, GuardianRow>("SELECT * FROM guardians WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Guardian::try_from).transpose()
    }

    async fn guardians_in_scope(
        &self,
        scope: &AccessScope,
        student: Option<StudentId>,
    ) -> StoreResult<Vec<Guardian>> {
        const BASE: &str = "SELECT g.* FROM guardians g JOIN students s ON s.id = g.student_id \
                            WHERE ($1::BIGINT IS NULL OR g.student_id = $1)";
        const ORDER: &str = "ORDER BY g.created_at, g.id";

        let rows = match scope {
            AccessScope::All => {
                let sql = format!("{} {}", BASE, ORDER);
                sqlx::query_as::<_, GuardianRow>(&sql)
                    .bind(student)
                    .fetch_all(&self.pool)
                    .await?
            }
            AccessScope::Branch(branch) => {
                let sql = format!("{} AND s.branch_id = $2 {}", BASE, ORDER);
                sqlx::query_as::<_, GuardianRow>(&sql)
                    .bind(student)
                    .bind(*branch)
                    .fetch_all(&self.pool)
                    .await?
            }
            AccessScope::Students(ids) => {
                let sql = format!("{} AND g.student_id = ANY($2) {}", BASE, ORDER);
                sqlx::query_as::<_, GuardianRow>(&sql)
                    .bind(student)
                    .bind(ids.as_slice())
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        guardians(rows)
    }

    async fn deactivate_guardian(
        &self,
        id: GuardianId,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Guardian>> {
        let row = sqlx::query_as::<_, GuardianRow>(
            "UPDATE guardians SET is_active = FALSE, \
             updated_at = CASE WHEN is_active THEN $2 ELSE updated_at END \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Guardian::try_from).transpose()
    }

    async fn apply_profile(
        &self,
        id: GuardianId,
        fields: &ProfileFields,
        completes: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Guardian>> {
        let row = sqlx::query_as::<_, GuardianRow>(
            "UPDATE guardians SET email = COALESCE($2, email), \
             national_id = COALESCE($3, national_id), \
             emergency_contact = COALESCE($4, emergency_contact), \
             address = COALESCE($5, address), photo_url = COALESCE($6, photo_url), \
             profile_completed = profile_completed OR $7, updated_at = $8 \
             WHERE id = $1 AND is_active RETURNING *",
        )
        .bind(id)
        .bind(&fields.email)
        .bind(&fields.national_id)
        .bind(&fields.emergency_contact)
        .bind(&fields.address)
        .bind(&fields.photo_url)
        .bind(completes)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Guardian::try_from).transpose()
    }

    async fn token_for(&self, guardian: GuardianId) -> StoreResult<Option<TokenRecord>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT guardian_id, digest, issued_at FROM pickup_tokens WHERE guardian_id = $1",
        )
        .bind(guardian)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| TokenRecord {
            guardian_id: row.guardian_id,
            digest: row.digest,
            issued_at: row.issued_at,
        }))
    }

    async fn swap_token(
        &self,
        expected_digest: &str,
        next: &TokenRecord,
    ) -> StoreResult<TokenWrite> {
        // single-row compare-and-swap; readers see either the old or new digest
        let res = sqlx::query(
            "UPDATE pickup_tokens SET digest = $1, issued_at = $2 \
             WHERE guardian_id = $3 AND digest = $4",
        )
        .bind(&next.digest)
        .bind(next.issued_at)
        .bind(next.guardian_id)
        .bind(expected_digest)
        .execute(&self.pool)
        .await;
        written(res)
    }

    async fn guardian_by_token(&self, digest: &str) -> StoreResult<Option<Guardian>> {
        let row = sqlx::query_as::<_, GuardianRow>(
            "SELECT g.* FROM guardians g JOIN pickup_tokens t ON t.guardian_id = g.id \
             WHERE t.digest = $1 LIMIT 1",
        )
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Guardian::try_from).transpose()
    }

    async fn insert_session(&self, session: &SessionRecord) -> StoreResult<()> {
        let device = session.device.as_ref();
        let res = sqlx::query(
            "INSERT INTO guardian_sessions (auth_code, guardian_id, student_id, student_name, \
             branch_id, device_token, device_type, device_name, registered_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&session.auth_code)
        .bind(session.guardian_id)
        .bind(session.student.id)
        .bind(&session.student.name)
        .bind(session.student.branch_id)
        .bind(device.map(|d| d.device_token.clone()))
        .bind(device.map(|d| d.device_type.as_str()))
        .bind(device.and_then(|d| d.device_name.clone()))
        .bind(device.map(|d| d.registered_at))
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() < 1 {
            return Err(Error::internal(
                "DatabaseError",
                "Could not save guardian session!",
            ));
        }
        Ok(())
    }

    async fn session(&self, auth_code: &str) -> StoreResult<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM guardian_sessions WHERE auth_code = $1 LIMIT 1",
        )
        .bind(auth_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRecord::from))
    }

    async fn delete_session(&self, auth_code: &str) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM guardian_sessions WHERE auth_code = $1")
            .bind(auth_code)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() >= 1)
    }

    async fn devices_for_guardian(
        &self,
        guardian: GuardianId,
    ) -> StoreResult<Vec<RegisteredDevice>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM guardian_sessions WHERE guardian_id = $1 \
             AND device_token IS NOT NULL ORDER BY registered_at",
        )
        .bind(guardian)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().filter_map(SessionRow::device).collect())
    }

    async fn staff_directory(&self) -> StoreResult<Vec<StaffMember>> {
        let rows = sqlx::query_as::<_, StaffRow>(
            "SELECT id, name, email, title, role, branch_id FROM staff ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let role = StaffRole::parse(&row.role).ok_or_else(|| {
                    Error::internal("DataError", format!("unknown staff role `{}`", row.role))
                })?;
                Ok(StaffMember {
                    id: row.id,
                    name: row.name,
                    email: row.email,
                    title: row.title,
                    role,
                    branch_id: row.branch_id,
                })
            })
            .collect()
    }
}
