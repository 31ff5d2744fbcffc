pub mod appointment;
pub mod conversation;
pub mod patient;
pub mod slot;

pub use appointment::{AppointmentRecord, AppointmentStatus};
pub use conversation::{
    AppointmentInfo, ConversationMessage, ConversationState, InsuranceInfo, Intent, PatientField,
    PatientInfo, Stage,
};
pub use patient::PatientRecord;
pub use slot::SlotRecord;
