//! Which staff a guardian may contact: only those of the bound student's
//! branch, grouped by role.

use serde::{Deserialize, Serialize};

use crate::models::{GuardianSession, SessionRecord, StaffMember, StaffRole, Student};

/// Anything that knows which student a guardian is bound to.
pub trait BoundStudent {
    fn bound_student(&self) -> &Student;
}

impl BoundStudent for SessionRecord {
    fn bound_student(&self) -> &Student {
        &self.student
    }
}

impl BoundStudent for GuardianSession {
    fn bound_student(&self) -> &Student {
        &self.student
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDirectory {
    pub heads_of_school: Vec<StaffMember>,
    pub heads_of_section: Vec<StaffMember>,
    pub teachers: Vec<StaffMember>,
}

impl ContactDirectory {
    pub fn len(&self) -> usize {
        self.heads_of_school.len() + self.heads_of_section.len() + self.teachers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn scoped_contacts<S: BoundStudent + ?Sized>(
    session: &S,
    staff: &[StaffMember],
) -> ContactDirectory {
    let branch = session.bound_student().branch_id;
    let mut directory = ContactDirectory::default();

    for member in staff.iter().filter(|m| m.branch_id == Some(branch)) {
        let bucket = match member.role {
            StaffRole::HeadOfSchool => &mut directory.heads_of_school,
            StaffRole::HeadOfSection => &mut directory.heads_of_section,
            StaffRole::Teacher => &mut directory.teachers,
            // back-office staff are not reachable from the guardian app
            StaffRole::Administrator => {
                log::debug!(
                    "Hiding staff {} ({}) from guardian contacts",
                    member.id,
                    member.role.as_str()
                );
                continue;
            }
        };
        bucket.push(member.clone());
    }

    log::debug!(
        "Branch {} contacts: {} of {} staff visible",
        branch,
        directory.len(),
        staff.len()
    );
    directory
}
