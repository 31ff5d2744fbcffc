use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SlotRecord;
use crate::services::ai::extraction::InsuranceFields;

/// The state-machine node governing which question or action comes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Greeting,
    PatientLookup,
    SmartScheduling,
    CalendarIntegration,
    InsuranceCollection,
    AppointmentConfirmation,
    FormDistribution,
    Cancellation,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Greeting => "greeting",
            Stage::PatientLookup => "patient_lookup",
            Stage::SmartScheduling => "smart_scheduling",
            Stage::CalendarIntegration => "calendar_integration",
            Stage::InsuranceCollection => "insurance_collection",
            Stage::AppointmentConfirmation => "appointment_confirmation",
            Stage::FormDistribution => "form_distribution",
            Stage::Cancellation => "cancellation",
            Stage::Completed => "completed",
        }
    }
}

/// Top-level branch of the conversation, set once from the greeting stage
/// and sticky thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Unset,
    Schedule,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

/// The ordered required-field checklist used by the booking flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientField {
    FirstName,
    LastName,
    Dob,
    Location,
    Email,
}

impl PatientField {
    pub fn label(&self) -> &'static str {
        match self {
            PatientField::FirstName => "first name",
            PatientField::LastName => "last name",
            PatientField::Dob => "date of birth",
            PatientField::Location => "address",
            PatientField::Email => "email",
        }
    }

    pub fn question(&self) -> &'static str {
        match self {
            PatientField::FirstName => "What is your first name?",
            PatientField::LastName => "What is your last name?",
            PatientField::Dob => {
                "What is your date of birth? Please use MM/DD/YYYY format."
            }
            PatientField::Location => "What is your home address?",
            PatientField::Email => "What is your email address?",
        }
    }
}

/// Patient details accumulated over the conversation; each field stays
/// absent until a turn fills it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientInfo {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub is_returning: Option<bool>,
}

impl PatientInfo {
    pub const REQUIRED: &'static [PatientField] = &[
        PatientField::FirstName,
        PatientField::LastName,
        PatientField::Dob,
        PatientField::Location,
        PatientField::Email,
    ];

    pub fn get(&self, field: PatientField) -> Option<&str> {
        match field {
            PatientField::FirstName => self.first_name.as_deref(),
            PatientField::LastName => self.last_name.as_deref(),
            PatientField::Dob => self.dob.as_deref(),
            PatientField::Location => self.location.as_deref(),
            PatientField::Email => self.email.as_deref(),
        }
    }

    /// The next field to ask for, in checklist order.
    pub fn first_missing(&self) -> Option<PatientField> {
        Self::REQUIRED
            .iter()
            .copied()
            .find(|f| self.get(*f).is_none())
    }

    pub fn filled_labels(&self) -> Vec<&'static str> {
        Self::REQUIRED
            .iter()
            .filter(|f| self.get(**f).is_some())
            .map(|f| f.label())
            .collect()
    }

    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentInfo {
    pub doctor: Option<String>,
    pub date: Option<chrono::NaiveDate>,
    pub time: Option<chrono::NaiveTime>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsuranceInfo {
    pub carrier: Option<String>,
    pub member_id: Option<String>,
    pub group_number: Option<String>,
}

impl InsuranceInfo {
    /// Sentinel values for patients paying out of pocket.
    pub fn self_pay() -> Self {
        Self {
            carrier: Some("Self-Pay".to_string()),
            member_id: Some("N/A".to_string()),
            group_number: Some("N/A".to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.carrier.is_none() && self.member_id.is_none() && self.group_number.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.carrier.is_some() && self.member_id.is_some() && self.group_number.is_some()
    }

    pub fn first_missing_label(&self) -> Option<&'static str> {
        if self.carrier.is_none() {
            Some("insurance carrier")
        } else if self.member_id.is_none() {
            Some("member ID")
        } else if self.group_number.is_none() {
            Some("group number")
        } else {
            None
        }
    }

    /// Merge an extraction result; empty extracted fields never blank out a
    /// value that was already collected.
    pub fn merge(&mut self, fields: &InsuranceFields) {
        let pairs = [
            (&mut self.carrier, fields.carrier.trim()),
            (&mut self.member_id, fields.member_id.trim()),
            (&mut self.group_number, fields.group_number.trim()),
        ];
        for (slot, value) in pairs {
            if !value.is_empty() {
                *slot = Some(value.to_string());
            }
        }
    }
}

/// Per-session accumulator driven by the dialogue router. Lives for one
/// conversation thread and is cleared by an explicit reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
    pub intent: Intent,
    pub stage: Stage,
    pub patient: PatientInfo,
    pub appointment: AppointmentInfo,
    pub insurance: InsuranceInfo,
    pub offered_slots: Vec<SlotRecord>,
    pub appointment_id: Option<String>,
    pub started_at: NaiveDateTime,
    pub last_activity: NaiveDateTime,
}

impl ConversationState {
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            session_id: session_id.to_string(),
            messages: Vec::new(),
            intent: Intent::Unset,
            stage: Stage::Greeting,
            patient: PatientInfo::default(),
            appointment: AppointmentInfo::default(),
            insurance: InsuranceInfo::default(),
            offered_slots: Vec::new(),
            appointment_id: None,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn push_user(&mut self, content: &str) {
        self.messages.push(ConversationMessage {
            role: "user".to_string(),
            content: content.to_string(),
        });
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.messages.push(ConversationMessage {
            role: "assistant".to_string(),
            content: content.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checklist_order() {
        let mut info = PatientInfo::default();
        assert_eq!(info.first_missing(), Some(PatientField::FirstName));

        info.first_name = Some("John".to_string());
        info.last_name = Some("Doe".to_string());
        assert_eq!(info.first_missing(), Some(PatientField::Dob));

        info.dob = Some("1985-03-15".to_string());
        info.location = Some("123 Main St".to_string());
        info.email = Some("john@example.com".to_string());
        assert_eq!(info.first_missing(), None);
        assert_eq!(info.filled_labels().len(), 5);
    }

    #[test]
    fn test_insurance_merge_keeps_filled_fields() {
        let mut info = InsuranceInfo {
            carrier: Some("Aetna".to_string()),
            member_id: None,
            group_number: None,
        };
        info.merge(&InsuranceFields {
            carrier: "".to_string(),
            member_id: "123456789".to_string(),
            group_number: " ".to_string(),
        });
        assert_eq!(info.carrier.as_deref(), Some("Aetna"));
        assert_eq!(info.member_id.as_deref(), Some("123456789"));
        assert!(info.group_number.is_none());
        assert_eq!(info.first_missing_label(), Some("group number"));
    }

    #[test]
    fn test_self_pay_is_complete() {
        let info = InsuranceInfo::self_pay();
        assert!(info.is_complete());
        assert_eq!(info.carrier.as_deref(), Some("Self-Pay"));
        assert_eq!(info.member_id.as_deref(), Some("N/A"));
    }

    #[test]
    fn test_new_state_is_fresh() {
        let state = ConversationState::new("abc");
        assert_eq!(state.stage, Stage::Greeting);
        assert_eq!(state.intent, Intent::Unset);
        assert!(state.messages.is_empty());
        assert!(state.appointment_id.is_none());
    }
}
