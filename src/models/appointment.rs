use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A ledger entry for one booked (or later cancelled) appointment.
///
/// Patient identity and contact details are denormalized into the record so
/// the ledger keeps its history even when the slot is freed or the patient
/// record is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: String,
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub patient_dob: String,
    pub patient_email: String,
    pub patient_location: String,
    pub patient_phone: Option<String>,
    pub doctor: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: i32,
    pub was_returning_patient: bool,
    pub insurance_carrier: String,
    pub insurance_member_id: String,
    pub insurance_group_number: String,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<NaiveDateTime>,
}

impl AppointmentRecord {
    /// Short opaque confirmation token handed to the patient.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_shape() {
        let id = AppointmentRecord::generate_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(AppointmentStatus::parse("confirmed"), AppointmentStatus::Confirmed);
        assert_eq!(AppointmentStatus::parse("cancelled"), AppointmentStatus::Cancelled);
        assert_eq!(AppointmentStatus::Cancelled.as_str(), "cancelled");
    }
}
