//! Field checks for guardian input. Every failing field is reported, not
//! only the first one.

use crate::err::{Error, FieldError};
use crate::models::{ProfileFields, Relation, StudentId};

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_RELATION_CHARS: usize = 50;
const MAX_EMAIL_CHARS: usize = 254;
const MAX_NATIONAL_ID_CHARS: usize = 32;
const MAX_ADDRESS_CHARS: usize = 255;
const MAX_CONTACT_CHARS: usize = 100;
const MAX_PHOTO_URL_CHARS: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGuardian {
    pub student_id: StudentId,
    pub name: String,
    pub relation: Relation,
    pub phone: Option<String>,
}

pub fn new_guardian(
    student_id: Option<StudentId>,
    name: &str,
    relation: &str,
    phone: Option<&str>,
) -> Result<NewGuardian, Error> {
    let mut fields = Vec::new();

    if student_id.is_none() {
        fields.push(FieldError::new("student_id", "is required"));
    }

    let name = name.trim();
    if name.is_empty() {
        fields.push(FieldError::new("name", "must not be empty"));
    } else if name.chars().count() > MAX_NAME_CHARS {
        fields.push(FieldError::new(
            "name",
            format!("must be at most {} characters", MAX_NAME_CHARS),
        ));
    }

    let relation_text = relation.trim();
    let mut parsed_relation = None;
    if relation_text.is_empty() {
        fields.push(FieldError::new("relation", "must not be empty"));
    } else if relation_text.chars().count() > MAX_RELATION_CHARS {
        fields.push(FieldError::new(
            "relation",
            format!("must be at most {} characters", MAX_RELATION_CHARS),
        ));
    } else {
        match relation_text.parse::<Relation>() {
            Ok(r) => parsed_relation = Some(r),
            Err(message) => fields.push(FieldError::new("relation", message)),
        }
    }

    let phone = match phone.map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => match normalize_phone(raw) {
            Some(normalized) => Some(normalized),
            None => {
                fields.push(FieldError::new("phone", "is not a valid phone number"));
                None
            }
        },
        None => None,
    };

    match (student_id, parsed_relation) {
        (Some(student_id), Some(relation)) if fields.is_empty() => Ok(NewGuardian {
            student_id,
            name: name.to_string(),
            relation,
            phone,
        }),
        _ => Err(Error::invalid(fields)),
    }
}

/// Accepts E.164-like numbers: optional `+`, a non-zero leading digit,
/// 7 to 15 digits in total. Spaces, dashes, dots and parentheses are
/// dropped before checking.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.trim().chars().enumerate() {
        match c {
            '+' if i == 0 => out.push(c),
            '0'..='9' => out.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }
    let digits = out.trim_start_matches('+');
    let valid = (7..=15).contains(&digits.len()) && !digits.starts_with('0');
    valid.then_some(out)
}

pub fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_CHARS || email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

/// Trims the supplied profile fields and drops the ones left empty.
pub fn profile(fields: ProfileFields) -> Result<ProfileFields, Error> {
    let mut errors = Vec::new();

    let email = clean(fields.email);
    if let Some(email) = &email {
        if !is_valid_email(email) {
            errors.push(FieldError::new("email", "is not a valid email address"));
        }
    }

    let national_id = clean(fields.national_id);
    if let Some(id) = &national_id {
        if id.chars().count() > MAX_NATIONAL_ID_CHARS
            || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            errors.push(FieldError::new(
                "national_id",
                "must be letters, digits or dashes",
            ));
        }
    }

    let emergency_contact = clean(fields.emergency_contact);
    if let Some(contact) = &emergency_contact {
        if contact.chars().count() > MAX_CONTACT_CHARS {
            errors.push(FieldError::new(
                "emergency_contact",
                format!("must be at most {} characters", MAX_CONTACT_CHARS),
            ));
        }
    }

    let address = clean(fields.address);
    if let Some(address) = &address {
        if address.chars().count() > MAX_ADDRESS_CHARS {
            errors.push(FieldError::new(
                "address",
                format!("must be at most {} characters", MAX_ADDRESS_CHARS),
            ));
        }
    }

    let photo_url = clean(fields.photo_url);
    if let Some(url) = &photo_url {
        let scheme_ok = url.starts_with("https://") || url.starts_with("http://");
        if !scheme_ok || url.len() > MAX_PHOTO_URL_CHARS {
            errors.push(FieldError::new("photo_url", "must be an http(s) URL"));
        }
    }

    if !errors.is_empty() {
        return Err(Error::invalid(errors));
    }

    Ok(ProfileFields {
        email,
        national_id,
        emergency_contact,
        address,
        photo_url,
    })
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
