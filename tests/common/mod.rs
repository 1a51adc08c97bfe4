//! Shared fixtures for the guardian pickup integration tests

#![allow(dead_code)]

use std::sync::Arc;

use guardian_pickup::models::{
    Account, AccountRole, DeviceClaim, DevicePlatform, LoginRequest, PickupCard, StaffMember,
    StaffRole, Student,
};
use guardian_pickup::service::CreateGuardian;
use guardian_pickup::{CredentialService, InMemoryStore, ServiceSettings, SharedService};

pub const BASE_URL: &str = "https://school.example/pickup";
pub const STAFF_BRANCH_1: &str = "staff-branch-1";
pub const STAFF_BRANCH_2: &str = "staff-branch-2";
pub const PARENT_OF_123: &str = "parent-of-123";
pub const ADMIN: &str = "admin";

pub fn seeded_store() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    for (id, name, branch_id) in [(123, "Mia", 1), (124, "Leo", 1), (200, "Zoe", 2)] {
        store
            .add_student(Student {
                id,
                name: name.to_string(),
                branch_id,
            })
            .unwrap();
    }

    let accounts = [
        (STAFF_BRANCH_1, AccountRole::Staff, Some(1), vec![]),
        (STAFF_BRANCH_2, AccountRole::Staff, Some(2), vec![]),
        (PARENT_OF_123, AccountRole::Parent, None, vec![123]),
        (ADMIN, AccountRole::Administrator, None, vec![]),
    ];
    for (code, role, branch_id, student_ids) in accounts {
        store
            .add_account(Account {
                auth_code: code.to_string(),
                role,
                branch_id,
                student_ids,
            })
            .unwrap();
    }

    let staff = [
        (1, "Ms Head", StaffRole::HeadOfSchool, Some(1)),
        (2, "Mr Section", StaffRole::HeadOfSection, Some(1)),
        (3, "Ms Teacher", StaffRole::Teacher, Some(1)),
        (4, "Mr Elsewhere", StaffRole::Teacher, Some(2)),
        (5, "Back Office", StaffRole::Administrator, Some(1)),
    ];
    for (id, name, role, branch_id) in staff {
        store
            .add_staff(StaffMember {
                id,
                name: name.to_string(),
                email: Some(format!("staff{}@school.example", id)),
                title: Some(role.as_str().replace('_', " ")),
                role,
                branch_id,
            })
            .unwrap();
    }

    Arc::new(store)
}

pub fn create_service() -> SharedService {
    create_service_with_limit(5)
}

pub fn create_service_with_limit(max_active_guardians: usize) -> SharedService {
    Arc::new(CredentialService::new(
        seeded_store(),
        ServiceSettings {
            pickup_base_url: BASE_URL.to_string(),
            max_active_guardians,
        },
    ))
}

pub fn new_guardian(student_id: i64, name: &str, relation: &str) -> CreateGuardian {
    CreateGuardian {
        student_id: Some(student_id),
        name: name.to_string(),
        relation: relation.to_string(),
        phone: None,
    }
}

pub async fn create_john_driver(service: &SharedService) -> PickupCard {
    service
        .create_guardian(new_guardian(123, "John Driver", "driver"))
        .await
        .expect("guardian should be created")
}

pub fn claim(device_token: &str) -> DeviceClaim {
    DeviceClaim {
        device_token: device_token.to_string(),
        device_type: DevicePlatform::Android,
        device_name: Some("Pixel 8".to_string()),
    }
}

pub fn login_with(token: &str) -> LoginRequest {
    LoginRequest {
        token: token.to_string(),
        device: claim("fcm-device-token"),
    }
}
