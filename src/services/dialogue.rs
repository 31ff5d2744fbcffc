//! The dialogue state machine. One call to [`step`] consumes one user
//! message, dispatches the routed stage handler, and returns the reply
//! text. A handler that advances into a stage which does not need further
//! user input (listing slots after a doctor choice, committing the booking
//! after insurance, mailing forms after the commit) runs that stage within
//! the same turn and the replies are concatenated.

use std::sync::Arc;

use chrono::Utc;

use crate::db::queries;
use crate::models::{ConversationState, InsuranceInfo, Intent, PatientField, PatientInfo, Stage};
use crate::services::ai::extraction;
use crate::services::{extract, scheduling};
use crate::state::AppState;

const CANCEL_KEYWORDS: &[&str] = &["cancel", "cancellation", "remove", "delete", "reschedule"];
const SCHEDULE_KEYWORDS: &[&str] = &[
    "schedule",
    "book",
    "appointment",
    "new",
    "visit",
    "see doctor",
    "make",
    "like",
];
const SELF_PAY_KEYWORDS: &[&str] = &[
    "no insurance",
    "self pay",
    "self-pay",
    "i don't have",
    "paying myself",
    "cash",
    "no",
];

/// Longest possible same-turn chain:
/// insurance -> confirmation -> form distribution, plus the entry hop.
const MAX_CHAINED_STAGES: usize = 4;

struct StepOutcome {
    reply: String,
    run_next: bool,
}

impl StepOutcome {
    fn stay(reply: String) -> Self {
        Self {
            reply,
            run_next: false,
        }
    }

    fn advance(reply: String) -> Self {
        Self {
            reply,
            run_next: true,
        }
    }
}

/// Advance the conversation by one user message.
pub async fn step(
    state: &Arc<AppState>,
    conv: &mut ConversationState,
    message: &str,
) -> anyhow::Result<String> {
    conv.push_user(message);

    let mut stage = route(conv);
    tracing::info!(
        session = %conv.session_id,
        stage = stage.as_str(),
        intent = ?conv.intent,
        "processing message"
    );

    let mut input = Some(message);
    let mut parts: Vec<String> = Vec::new();

    for _ in 0..=MAX_CHAINED_STAGES {
        let outcome = match stage {
            Stage::Greeting => greeting(state, conv, input.take()),
            Stage::PatientLookup => patient_lookup(state, conv, input.take()).await?,
            Stage::SmartScheduling => smart_scheduling(conv, input.take()),
            Stage::CalendarIntegration => calendar_integration(state, conv, input.take())?,
            Stage::InsuranceCollection => insurance_collection(state, conv, input.take()).await,
            Stage::AppointmentConfirmation => appointment_confirmation(state, conv)?,
            Stage::FormDistribution => form_distribution(state, conv).await,
            Stage::Cancellation => cancellation(state, conv, input.take())?,
            Stage::Completed => completed(),
        };

        if !outcome.reply.is_empty() {
            parts.push(outcome.reply);
        }
        if !outcome.run_next {
            break;
        }
        stage = conv.stage;
    }

    let reply = parts.join("\n\n");
    conv.push_assistant(&reply);
    conv.last_activity = Utc::now().naive_utc();
    Ok(reply)
}

/// Pick the stage that handles the incoming message. The intent branch is
/// sticky: once set from the greeting, cancel always routes to the
/// cancellation flow and schedule resumes wherever the booking left off.
fn route(conv: &ConversationState) -> Stage {
    if conv.messages.len() <= 1 {
        return Stage::Greeting;
    }
    match conv.intent {
        Intent::Cancel => Stage::Cancellation,
        Intent::Schedule => match conv.stage {
            Stage::Greeting => Stage::PatientLookup,
            stage => stage,
        },
        Intent::Unset => conv.stage,
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

// ── Stage handlers ──

fn greeting(state: &Arc<AppState>, conv: &mut ConversationState, input: Option<&str>) -> StepOutcome {
    if conv.messages.len() <= 1 {
        return StepOutcome::stay(format!(
            "Hello! Welcome to {}.\n\n\
             I'm the scheduling assistant. I can help you with:\n\
             - Scheduling a new appointment\n\
             - Cancelling an existing appointment\n\n\
             How can I assist you today?",
            state.config.clinic_name
        ));
    }

    let text = input.unwrap_or_default().to_lowercase();

    if contains_any(&text, CANCEL_KEYWORDS) {
        conv.intent = Intent::Cancel;
        conv.stage = Stage::Cancellation;
        return StepOutcome::stay(
            "I'll help you cancel your appointment. To verify your identity, what is your \
             first name?"
                .to_string(),
        );
    }

    if contains_any(&text, SCHEDULE_KEYWORDS) {
        conv.intent = Intent::Schedule;
        conv.stage = Stage::PatientLookup;
        return StepOutcome::stay(
            "Great, I'll help you schedule an appointment. What is your first name?".to_string(),
        );
    }

    StepOutcome::stay(
        "I can help with either of these:\n\n\
         1. Schedule a new appointment\n\
         2. Cancel an existing appointment\n\n\
         Please let me know which one you need."
            .to_string(),
    )
}

async fn patient_lookup(
    state: &Arc<AppState>,
    conv: &mut ConversationState,
    input: Option<&str>,
) -> anyhow::Result<StepOutcome> {
    if let Some(text) = input.map(str::trim).filter(|t| !t.is_empty()) {
        if let Some(field) = conv.patient.first_missing() {
            fill_patient_field(state, &mut conv.patient, field, text).await;
            tracing::debug!(
                session = %conv.session_id,
                field = field.label(),
                "patient field collection"
            );
        }
    }

    if let Some(next) = conv.patient.first_missing() {
        let filled = conv.patient.filled_labels();
        let prefix = if filled.is_empty() {
            String::new()
        } else {
            format!("Got it: {}.\n\n", filled.join(", "))
        };
        return Ok(StepOutcome::stay(format!("{prefix}{}", next.question())));
    }

    // All five fields collected: classify the patient against the directory.
    let first = conv.patient.first_name.clone().unwrap_or_default();
    let last = conv.patient.last_name.clone().unwrap_or_default();
    let dob = conv.patient.dob.clone().unwrap_or_default();
    let email = conv.patient.email.clone().unwrap_or_default();

    let record = {
        let db = state.db.lock().unwrap();
        queries::find_patient(&db, &first, &last, &dob)?
    };
    let is_returning = record.map(|p| p.is_returning).unwrap_or(false);
    conv.patient.is_returning = Some(is_returning);

    let greeting_line = if is_returning {
        format!("Welcome back, {first}! You're in our system as a returning patient.")
    } else {
        format!("Thanks, {first}. I have you down as a new patient.")
    };
    let reply = format!(
        "{greeting_line}\n\n\
         Your information:\n\
         - Name: {first} {last}\n\
         - Date of birth: {dob}\n\
         - Email: {email}"
    );

    conv.stage = Stage::SmartScheduling;
    Ok(StepOutcome::advance(reply))
}

/// Fill one checklist field from the message. Only the name step may fill
/// two fields at once (first + last from one introduction). The name chain
/// is deterministic parse -> heuristic -> model fallback -> raw accept, so
/// it always terminates with a value unless the message was a bare
/// acknowledgement.
async fn fill_patient_field(
    state: &Arc<AppState>,
    patient: &mut PatientInfo,
    field: PatientField,
    text: &str,
) {
    match field {
        PatientField::FirstName => {
            if let Some((first, last)) = extract::extract_name(text) {
                patient.first_name = Some(first);
                if last.is_some() {
                    patient.last_name = last;
                }
            } else if !extract::is_acknowledgement(text) {
                match extraction::extract_names(state.llm.as_ref(), text).await {
                    Ok(Some((first, last))) => {
                        patient.first_name = Some(first);
                        if last.is_some() {
                            patient.last_name = last;
                        }
                    }
                    Ok(None) => {
                        // Last resort: accept the raw input as a first name
                        // rather than looping forever on an odd spelling.
                        patient.first_name = Some(text.to_string());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "name extraction unavailable, accepting raw input");
                        patient.first_name = Some(text.to_string());
                    }
                }
            }
        }
        PatientField::LastName => patient.last_name = Some(text.to_string()),
        PatientField::Dob => {
            // An unparseable date is kept verbatim; the directory lookup
            // will simply not match it.
            patient.dob =
                Some(extract::normalize_date(text).unwrap_or_else(|| text.to_string()));
        }
        PatientField::Location => patient.location = Some(text.to_string()),
        PatientField::Email => {
            patient.email = Some(extract::extract_email(text).unwrap_or_else(|| text.to_string()));
        }
    }
}

fn smart_scheduling(conv: &mut ConversationState, input: Option<&str>) -> StepOutcome {
    // Duration follows solely from the returning/new classification, fixed
    // the moment this stage runs.
    let returning = conv.patient.is_returning.unwrap_or(false);
    let duration = if returning { 30 } else { 60 };
    conv.appointment.duration_minutes = Some(duration);

    match input.and_then(scheduling::match_doctor) {
        Some(doctor) => {
            conv.appointment.doctor = Some(doctor.name.to_string());
            conv.offered_slots.clear();
            conv.stage = Stage::CalendarIntegration;
            StepOutcome::advance(format!(
                "Excellent choice! Scheduling a {duration}-minute appointment with {}.",
                doctor.name
            ))
        }
        None => {
            let prompt = if input.is_some() {
                "Please select one of the available doctors to continue:"
            } else {
                "Which doctor would you prefer for your appointment?"
            };
            StepOutcome::stay(format!("{prompt}\n\n{}", scheduling::doctor_menu()))
        }
    }
}

fn calendar_integration(
    state: &Arc<AppState>,
    conv: &mut ConversationState,
    input: Option<&str>,
) -> anyhow::Result<StepOutcome> {
    // A numeric choice against a list that was already offered.
    if let Some(text) = input {
        if !conv.offered_slots.is_empty() {
            if let Ok(choice) = text.trim().parse::<usize>() {
                if (1..=conv.offered_slots.len()).contains(&choice) {
                    let slot = conv.offered_slots[choice - 1].clone();
                    conv.appointment.doctor = Some(slot.doctor.clone());
                    conv.appointment.date = Some(slot.date);
                    conv.appointment.time = Some(slot.time);
                    conv.stage = Stage::InsuranceCollection;
                    return Ok(StepOutcome::advance(format!(
                        "You've selected:\n\n\
                         - Doctor: {}\n\
                         - Date: {}\n\
                         - Time: {}",
                        slot.doctor,
                        slot.date.format("%Y-%m-%d"),
                        slot.time.format("%H:%M")
                    )));
                }
                return Ok(StepOutcome::stay(format!(
                    "Please choose a slot number between 1 and {}.",
                    conv.offered_slots.len()
                )));
            }
        }
    }

    // First entry to this stage, or input that wasn't a slot number:
    // (re)query and render the availability list.
    let doctor = conv
        .appointment
        .doctor
        .clone()
        .ok_or_else(|| anyhow::anyhow!("calendar stage reached without a doctor selection"))?;
    let now = Utc::now().naive_utc();
    let slots = {
        let db = state.db.lock().unwrap();
        scheduling::available_slots(&db, &doctor, &now)?
    };

    if slots.is_empty() {
        conv.appointment.doctor = None;
        conv.offered_slots.clear();
        conv.stage = Stage::SmartScheduling;
        return Ok(StepOutcome::stay(format!(
            "I'm sorry, {doctor} has no open slots right now. Would you like to try another \
             doctor?\n\n{}",
            scheduling::doctor_menu()
        )));
    }

    let listing = slots
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s.label()))
        .collect::<Vec<_>>()
        .join("\n");
    let count = slots.len();
    conv.offered_slots = slots;

    Ok(StepOutcome::stay(format!(
        "Here are the next available slots:\n\n{listing}\n\n\
         Please pick a slot by entering its number (1-{count})."
    )))
}

async fn insurance_collection(
    state: &Arc<AppState>,
    conv: &mut ConversationState,
    input: Option<&str>,
) -> StepOutcome {
    if let Some(text) = input {
        let lowered = text.to_lowercase();
        if contains_any(&lowered, SELF_PAY_KEYWORDS) {
            conv.insurance = InsuranceInfo::self_pay();
            conv.stage = Stage::AppointmentConfirmation;
            return StepOutcome::advance(
                "Understood. I've marked you as a self-pay patient.".to_string(),
            );
        }

        match extraction::extract_insurance(state.llm.as_ref(), text).await {
            Ok(fields) => conv.insurance.merge(&fields),
            Err(e) => tracing::warn!(error = %e, "insurance extraction unavailable"),
        }
    }

    if conv.insurance.is_complete() {
        conv.stage = Stage::AppointmentConfirmation;
        return StepOutcome::advance(
            "Thank you, I have all your insurance information.".to_string(),
        );
    }

    let reply = if conv.insurance.is_empty() {
        "To complete the booking I need your insurance information, or type \"self-pay\" if \
         you're paying out of pocket:\n\n\
         - Insurance carrier (e.g. Blue Cross Blue Shield, Aetna)\n\
         - Member ID\n\
         - Group number\n\n\
         You can provide everything in one message."
            .to_string()
    } else {
        format!(
            "Please provide your {}.",
            conv.insurance
                .first_missing_label()
                .unwrap_or("insurance details")
        )
    };
    StepOutcome::stay(reply)
}

fn appointment_confirmation(
    state: &Arc<AppState>,
    conv: &mut ConversationState,
) -> anyhow::Result<StepOutcome> {
    let now = Utc::now().naive_utc();
    let record = {
        let mut db = state.db.lock().unwrap();
        scheduling::book_appointment(&mut db, &conv.patient, &conv.appointment, &conv.insurance, now)?
    };

    tracing::info!(
        session = %conv.session_id,
        appointment = %record.id,
        doctor = %record.doctor,
        "appointment booked"
    );

    let reply = format!(
        "APPOINTMENT CONFIRMED\n\n\
         - Patient: {} {}\n\
         - Doctor: {}\n\
         - Date & time: {} at {}\n\
         - Duration: {} minutes\n\
         - Insurance: {}\n\
         - Appointment ID: {}\n\n\
         Your appointment has been booked.",
        record.patient_first_name,
        record.patient_last_name,
        record.doctor,
        record.date.format("%Y-%m-%d"),
        record.time.format("%H:%M"),
        record.duration_minutes,
        record.insurance_carrier,
        record.id
    );

    conv.appointment_id = Some(record.id);
    conv.stage = Stage::FormDistribution;
    Ok(StepOutcome::advance(reply))
}

async fn form_distribution(state: &Arc<AppState>, conv: &mut ConversationState) -> StepOutcome {
    let body = if conv.patient.is_returning == Some(false) {
        let email = conv.patient.email.clone().unwrap_or_default();
        let name = conv.patient.full_name();
        match state.mailer.send_intake_form(&email, &name).await {
            Ok(()) => format!(
                "As a new patient, I've sent the intake form to {email}. Please complete it \
                 before your visit and arrive 15 minutes early for check-in."
            ),
            Err(e) => {
                tracing::error!(session = %conv.session_id, error = %e, "intake form delivery failed");
                format!(
                    "I couldn't deliver your intake form by email. Please contact our office \
                     at {} to receive it, or arrive 15 minutes early to complete it at the \
                     clinic.",
                    state.config.clinic_phone
                )
            }
        }
    } else {
        "As a returning patient, no additional forms are needed. Just arrive on time for \
         your appointment."
            .to_string()
    };

    conv.stage = Stage::Completed;
    StepOutcome::stay(format!(
        "{body}\n\nIs there anything else I can help you with today?"
    ))
}

fn cancellation(
    state: &Arc<AppState>,
    conv: &mut ConversationState,
    input: Option<&str>,
) -> anyhow::Result<StepOutcome> {
    if let Some(text) = input.map(str::trim).filter(|t| !t.is_empty()) {
        // Identity fields are taken by naive whitespace split here, unlike
        // the richer extractor on the booking side: first token is the
        // first name, last token the last name.
        if conv.patient.first_name.is_none() {
            let tokens: Vec<&str> = text.split_whitespace().collect();
            if let Some(first) = tokens.first() {
                conv.patient.first_name = Some((*first).to_string());
            }
            if tokens.len() > 1 {
                if let Some(last) = tokens.last() {
                    conv.patient.last_name = Some((*last).to_string());
                }
            }
        } else if conv.patient.last_name.is_none() {
            if let Some(last) = text.split_whitespace().last() {
                conv.patient.last_name = Some(last.to_string());
            }
        } else if conv.patient.dob.is_none() {
            conv.patient.dob =
                Some(extract::normalize_date(text).unwrap_or_else(|| text.to_string()));
        }
    }

    if conv.patient.first_name.is_none() {
        return Ok(StepOutcome::stay(
            "To cancel your appointment, I need to verify your identity. What is your first \
             name?"
                .to_string(),
        ));
    }
    if conv.patient.last_name.is_none() {
        return Ok(StepOutcome::stay("What is your last name?".to_string()));
    }
    if conv.patient.dob.is_none() {
        return Ok(StepOutcome::stay(
            "What is your date of birth? Please use MM/DD/YYYY format.".to_string(),
        ));
    }

    let first = conv.patient.first_name.clone().unwrap_or_default();
    let last = conv.patient.last_name.clone().unwrap_or_default();
    let dob = conv.patient.dob.clone().unwrap_or_default();

    let appointment = {
        let db = state.db.lock().unwrap();
        queries::find_latest_confirmed_for_patient(&db, &first, &last, &dob)?
    };

    conv.stage = Stage::Completed;

    let Some(appointment) = appointment else {
        return Ok(StepOutcome::stay(format!(
            "I couldn't find an active appointment for {first} {last}.\n\n\
             This could be because:\n\
             - The appointment was already cancelled\n\
             - The name or date of birth doesn't match our records\n\n\
             You're welcome to try again with different information, or call our office at \
             {} for assistance.",
            state.config.clinic_phone
        )));
    };

    let now = Utc::now().naive_utc();
    {
        let mut db = state.db.lock().unwrap();
        scheduling::cancel_appointment(
            &mut db,
            &appointment,
            "Patient requested cancellation via scheduling assistant",
            now,
        )?;
    }

    tracing::info!(
        session = %conv.session_id,
        appointment = %appointment.id,
        "appointment cancelled"
    );

    Ok(StepOutcome::stay(format!(
        "Your appointment has been cancelled.\n\n\
         - Patient: {} {}\n\
         - Doctor: {}\n\
         - Date & time: {} at {}\n\
         - Appointment ID: {}\n\n\
         The slot has been freed for other patients. If you'd like to rebook, just let me \
         know any time.",
        appointment.patient_first_name,
        appointment.patient_last_name,
        appointment.doctor,
        appointment.date.format("%Y-%m-%d"),
        appointment.time.format("%H:%M"),
        appointment.id
    )))
}

fn completed() -> StepOutcome {
    StepOutcome::stay(
        "I'm here to help. Start a new conversation any time to schedule or cancel an \
         appointment."
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConversationState;

    fn conv_with_messages(count: usize) -> ConversationState {
        let mut conv = ConversationState::new("test");
        for i in 0..count {
            if i % 2 == 0 {
                conv.push_user("hello");
            } else {
                conv.push_assistant("hi");
            }
        }
        conv
    }

    #[test]
    fn test_route_forces_greeting_on_first_message() {
        let mut conv = conv_with_messages(1);
        conv.stage = Stage::Cancellation;
        conv.intent = Intent::Cancel;
        assert_eq!(route(&conv), Stage::Greeting);
    }

    #[test]
    fn test_route_cancel_intent_is_sticky() {
        let mut conv = conv_with_messages(4);
        conv.intent = Intent::Cancel;
        conv.stage = Stage::Completed;
        assert_eq!(route(&conv), Stage::Cancellation);
    }

    #[test]
    fn test_route_schedule_intent_resumes_stored_stage() {
        let mut conv = conv_with_messages(4);
        conv.intent = Intent::Schedule;
        conv.stage = Stage::CalendarIntegration;
        assert_eq!(route(&conv), Stage::CalendarIntegration);

        conv.stage = Stage::Greeting;
        assert_eq!(route(&conv), Stage::PatientLookup);
    }

    #[test]
    fn test_route_unset_intent_falls_back_to_stage() {
        let mut conv = conv_with_messages(4);
        conv.intent = Intent::Unset;
        conv.stage = Stage::Greeting;
        assert_eq!(route(&conv), Stage::Greeting);
    }

    #[test]
    fn test_keyword_sets() {
        assert!(contains_any("i need to cancel my visit", CANCEL_KEYWORDS));
        assert!(contains_any("book an appointment", SCHEDULE_KEYWORDS));
        assert!(!contains_any("hello there", CANCEL_KEYWORDS));
    }
}
