//! Employee notification to asset attribute mapping.

use serde_json::Value;
use thiserror::Error;

use crate::client::AssetAttribute;

/// Status values that mark an employee as no longer active.
const INACTIVE_STATUSES: [&str; 3] = ["terminated", "inactive", "deceased"];

/// Object-type attribute ids of the employee object in the asset schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeIds {
    pub name: u32,
    pub job_role: u32,
    pub department: u32,
    pub email: u32,
    pub start_date: u32,
    pub status: u32,
}

impl Default for AttributeIds {
    fn default() -> Self {
        Self {
            name: 82,
            job_role: 87,
            department: 88,
            email: 89,
            start_date: 91,
            status: 92,
        }
    }
}

/// Errors raised when a notification cannot be mapped to an employee object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("notification has no employee body")]
    MissingBody,

    #[error("employee has no work or personal email")]
    MissingEmail,
}

/// An employee ready to be upserted: the lookup key plus every attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedEmployee {
    pub email: String,
    pub attributes: Vec<AssetAttribute>,
}

fn text<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// The employee's job title, which names the role object to reference.
#[must_use]
pub fn job_title(payload: &Value) -> Option<&str> {
    text(payload, "/body/positionData/jobTitle")
}

/// Map an HR notification payload onto employee object attributes.
///
/// Attributes whose source field is absent are left out so an update never
/// blanks a value the HR system did not send. Name, Email and Status are
/// always present. Job Role carries `role_key`, the object key of the
/// employee's role object, when one was resolved.
///
/// # Errors
///
/// Returns `MappingError::MissingBody` when the payload has no `body` object
/// and `MappingError::MissingEmail` when neither `workEmail` nor
/// `personalEmail` is set.
pub fn map_employee(
    payload: &Value,
    ids: &AttributeIds,
    role_key: Option<&str>,
) -> Result<MappedEmployee, MappingError> {
    let body = payload
        .get("body")
        .filter(|b| b.is_object())
        .ok_or(MappingError::MissingBody)?;

    let email = text(body, "/workEmail")
        .or_else(|| text(body, "/personalEmail"))
        .ok_or(MappingError::MissingEmail)?
        .to_owned();

    let name = [text(body, "/firstName"), text(body, "/lastName")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let name = if name.is_empty() { email.clone() } else { name };

    let status = match text(body, "/statusData/status") {
        Some(s) if INACTIVE_STATUSES.contains(&s.to_ascii_lowercase().as_str()) => "Inactive",
        _ => "Active",
    };

    let mut attributes = vec![
        AssetAttribute::single(ids.name, name),
        AssetAttribute::single(ids.email, email.as_str()),
        AssetAttribute::single(ids.status, status),
    ];

    if let Some(role_key) = role_key {
        attributes.push(AssetAttribute::single(ids.job_role, role_key));
    }
    if let Some(department) = text(body, "/department") {
        attributes.push(AssetAttribute::single(ids.department, department));
    }
    if let Some(hire_date) = text(body, "/employmentDateData/hireDate") {
        // Timestamps are cut to their date part.
        let date = hire_date.split('T').next().unwrap_or(hire_date);
        attributes.push(AssetAttribute::single(ids.start_date, date));
    }

    Ok(MappedEmployee { email, attributes })
}
