use serde::{Deserialize, Serialize};

/// A row in the patient directory. The natural key is
/// (first_name, last_name, dob) with case-insensitive names and an
/// ISO-normalized date of birth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub email: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub is_returning: bool,
    pub insurance_carrier: Option<String>,
    pub insurance_member_id: Option<String>,
    pub insurance_group_number: Option<String>,
}
