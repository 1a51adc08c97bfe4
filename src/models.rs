use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StudentId = i64;
pub type BranchId = i64;
pub type StaffId = i64;
pub type GuardianId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Driver,
    Grandparent,
    Uncle,
    Aunt,
    Sibling,
    FamilyFriend,
    Caregiver,
    Relative,
    Other,
}

impl Relation {
    pub const ALL: [Relation; 9] = [
        Relation::Driver,
        Relation::Grandparent,
        Relation::Uncle,
        Relation::Aunt,
        Relation::Sibling,
        Relation::FamilyFriend,
        Relation::Caregiver,
        Relation::Relative,
        Relation::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Driver => "driver",
            Relation::Grandparent => "grandparent",
            Relation::Uncle => "uncle",
            Relation::Aunt => "aunt",
            Relation::Sibling => "sibling",
            Relation::FamilyFriend => "family_friend",
            Relation::Caregiver => "caregiver",
            Relation::Relative => "relative",
            Relation::Other => "other",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace([' ', '-'], "_");
        Relation::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| format!("unknown relation `{}`", s.trim()))
    }
}

/// A person allowed to collect one student. Not a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub id: GuardianId,
    pub student_id: StudentId,
    pub name: String,
    pub relation: Relation,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub photo_url: Option<String>,
    pub is_active: bool,
    pub profile_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub branch_id: BranchId,
}

/// The stored half of a pickup token. The raw token is handed out once and
/// only its digest is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub guardian_id: GuardianId,
    pub digest: String,
    pub issued_at: DateTime<Utc>,
}

/// Result of writing a token digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenWrite {
    Written,
    /// The expected digest was no longer current.
    Stale,
    /// Another guardian already holds this digest.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupCard {
    pub guardian: Guardian,
    pub token: String,
    pub pickup_url: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub guardian_id: GuardianId,
    pub token: String,
    pub pickup_url: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePlatform {
    Android,
    Ios,
    Web,
    #[serde(other)]
    Unknown,
}

impl DevicePlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePlatform::Android => "android",
            DevicePlatform::Ios => "ios",
            DevicePlatform::Web => "web",
            DevicePlatform::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "android" => DevicePlatform::Android,
            "ios" => DevicePlatform::Ios,
            "web" => DevicePlatform::Web,
            _ => DevicePlatform::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClaim {
    #[serde(default)]
    pub device_token: String,
    pub device_type: DevicePlatform,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub guardian_id: GuardianId,
    pub device_token: String,
    pub device_type: DevicePlatform,
    pub device_name: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Server-side record of an issued auth code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub auth_code: String,
    pub guardian_id: GuardianId,
    pub student: Student,
    pub device: Option<RegisteredDevice>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub token: String,
    #[serde(flatten)]
    pub device: DeviceClaim,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSession {
    pub auth_code: String,
    pub guardian: Guardian,
    pub student: Student,
    pub first_time_login: bool,
    pub requires_profile_completion: bool,
}

/// Current view of a guardian's session, re-read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub guardian: Guardian,
    pub student: Student,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl ProfileFields {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.national_id.is_none()
            && self.emergency_contact.is_none()
            && self.address.is_none()
            && self.photo_url.is_none()
    }

    /// Overwrites only the fields that were supplied.
    pub fn merge_into(self, guardian: &mut Guardian) {
        if let Some(email) = self.email {
            guardian.email = Some(email);
        }
        if let Some(national_id) = self.national_id {
            guardian.national_id = Some(national_id);
        }
        if let Some(emergency_contact) = self.emergency_contact {
            guardian.emergency_contact = Some(emergency_contact);
        }
        if let Some(address) = self.address {
            guardian.address = Some(address);
        }
        if let Some(photo_url) = self.photo_url {
            guardian.photo_url = Some(photo_url);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Parent,
    Staff,
    Administrator,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Parent => "parent",
            AccountRole::Staff => "staff",
            AccountRole::Administrator => "administrator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parent" => Some(AccountRole::Parent),
            "staff" => Some(AccountRole::Staff),
            "administrator" => Some(AccountRole::Administrator),
            _ => None,
        }
    }
}

/// A staff or parent account, issued outside this subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub auth_code: String,
    pub role: AccountRole,
    pub branch_id: Option<BranchId>,
    pub student_ids: Vec<StudentId>,
}

/// Which students an account may manage guardians for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    All,
    Branch(BranchId),
    Students(Vec<StudentId>),
}

impl AccessScope {
    pub fn of(account: &Account) -> Self {
        match (account.role, account.branch_id) {
            (AccountRole::Administrator, _) => AccessScope::All,
            (AccountRole::Staff, Some(branch)) => AccessScope::Branch(branch),
            (AccountRole::Staff, None) | (AccountRole::Parent, _) => {
                AccessScope::Students(account.student_ids.clone())
            }
        }
    }

    pub fn covers(&self, student: &Student) -> bool {
        match self {
            AccessScope::All => true,
            AccessScope::Branch(branch) => student.branch_id == *branch,
            AccessScope::Students(ids) => ids.contains(&student.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Teacher,
    HeadOfSection,
    HeadOfSchool,
    Administrator,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Teacher => "teacher",
            StaffRole::HeadOfSection => "head_of_section",
            StaffRole::HeadOfSchool => "head_of_school",
            StaffRole::Administrator => "administrator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "teacher" => Some(StaffRole::Teacher),
            "head_of_section" => Some(StaffRole::HeadOfSection),
            "head_of_school" => Some(StaffRole::HeadOfSchool),
            "administrator" => Some(StaffRole::Administrator),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
    pub email: Option<String>,
    pub title: Option<String>,
    pub role: StaffRole,
    pub branch_id: Option<BranchId>,
}
