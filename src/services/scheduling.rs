//! Multi-table scheduling operations: the rolling availability horizon, the
//! doctor roster, and the booking/cancellation commits that must keep the
//! slot table, patient directory and appointment ledger consistent. Both
//! commits run inside one SQLite transaction so a failure can never flip a
//! slot without its ledger record or vice versa.

use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{
    AppointmentInfo, AppointmentRecord, AppointmentStatus, InsuranceInfo, PatientInfo,
    PatientRecord, SlotRecord,
};

pub struct Doctor {
    pub name: &'static str,
    pub specialty: &'static str,
    pub keywords: &'static [&'static str],
}

pub const DOCTORS: &[Doctor] = &[
    Doctor {
        name: "Dr. Emily Chen",
        specialty: "Internal Medicine",
        keywords: &["emily", "chen"],
    },
    Doctor {
        name: "Dr. David Rodriguez",
        specialty: "Family Practice",
        keywords: &["david", "rodriguez"],
    },
];

pub const SLOT_OFFER_LIMIT: i64 = 8;
const HORIZON_DAYS: i64 = 14;

pub fn match_doctor(text: &str) -> Option<&'static Doctor> {
    let lowered = text.to_lowercase();
    DOCTORS
        .iter()
        .find(|d| d.keywords.iter().any(|k| lowered.contains(k)))
}

pub fn doctor_menu() -> String {
    DOCTORS
        .iter()
        .map(|d| format!("- {} ({})", d.name, d.specialty))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Seed half-hour slots, 9:00-17:00 Monday-Friday, for each doctor over the
/// next two weeks starting tomorrow. Existing rows (including booked ones)
/// are left untouched, so the call is safe to repeat as the horizon rolls.
pub fn ensure_schedule_horizon(conn: &Connection, from: NaiveDate) -> anyhow::Result<usize> {
    let mut inserted = 0;
    for offset in 1..=HORIZON_DAYS {
        let date = from + Duration::days(offset);
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        for doctor in DOCTORS {
            for hour in 9..17 {
                for minute in [0u32, 30] {
                    let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                        continue;
                    };
                    inserted += queries::insert_slot_ignore(conn, doctor.name, date, time)?;
                }
            }
        }
    }
    Ok(inserted)
}

/// Up to eight future open slots for one doctor, earliest first.
pub fn available_slots(
    conn: &Connection,
    doctor: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<SlotRecord>> {
    queries::list_available_slots(conn, Some(doctor), now, SLOT_OFFER_LIMIT)
}

/// Commit a booking: ledger record, slot consumption and (for a first-time
/// patient) the new directory entry, atomically. Fails without side effects
/// when the slot has already been consumed.
pub fn book_appointment(
    conn: &mut Connection,
    patient: &PatientInfo,
    appointment: &AppointmentInfo,
    insurance: &InsuranceInfo,
    now: NaiveDateTime,
) -> anyhow::Result<AppointmentRecord> {
    let first_name = patient.first_name.clone().context("first name not collected")?;
    let last_name = patient.last_name.clone().context("last name not collected")?;
    let dob = patient.dob.clone().context("date of birth not collected")?;
    let email = patient.email.clone().context("email not collected")?;
    let location = patient.location.clone().context("address not collected")?;
    let doctor = appointment.doctor.clone().context("doctor not selected")?;
    let date = appointment.date.context("slot date not selected")?;
    let time = appointment.time.context("slot time not selected")?;
    let duration_minutes = appointment
        .duration_minutes
        .context("appointment duration not set")?;
    let was_returning = patient.is_returning.unwrap_or(false);

    let record = AppointmentRecord {
        id: AppointmentRecord::generate_id(),
        patient_first_name: first_name.clone(),
        patient_last_name: last_name.clone(),
        patient_dob: dob.clone(),
        patient_email: email.clone(),
        patient_location: location.clone(),
        patient_phone: None,
        doctor: doctor.clone(),
        date,
        time,
        duration_minutes,
        was_returning_patient: was_returning,
        insurance_carrier: insurance.carrier.clone().context("insurance carrier not collected")?,
        insurance_member_id: insurance.member_id.clone().context("member ID not collected")?,
        insurance_group_number: insurance
            .group_number
            .clone()
            .context("group number not collected")?,
        status: AppointmentStatus::Confirmed,
        created_at: now,
        cancellation_reason: None,
        cancelled_at: None,
    };

    let tx = conn.transaction()?;
    queries::insert_appointment(&tx, &record)?;
    if !queries::claim_slot(&tx, &doctor, date, time)? {
        anyhow::bail!("slot {} {} {} is no longer available", doctor, date, time);
    }
    if !was_returning {
        // First completed booking creates the directory entry; the patient
        // counts as returning on any later visit.
        queries::upsert_patient(
            &tx,
            &PatientRecord {
                id: 0,
                first_name,
                last_name,
                dob,
                email: Some(email),
                location: Some(location),
                phone: None,
                is_returning: true,
                insurance_carrier: insurance.carrier.clone(),
                insurance_member_id: insurance.member_id.clone(),
                insurance_group_number: insurance.group_number.clone(),
            },
        )?;
    }
    tx.commit()?;

    Ok(record)
}

/// Commit a cancellation: terminal status transition, slot release and,
/// when the appointment was a new patient's first, removal of the
/// directory entry, atomically.
pub fn cancel_appointment(
    conn: &mut Connection,
    appointment: &AppointmentRecord,
    reason: &str,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let tx = conn.transaction()?;
    if !queries::mark_cancelled(&tx, &appointment.id, reason, now)? {
        anyhow::bail!("appointment {} is not in a cancellable state", appointment.id);
    }
    queries::release_slot(&tx, &appointment.doctor, appointment.date, appointment.time)?;
    if !appointment.was_returning_patient {
        queries::delete_patient(
            &tx,
            &appointment.patient_first_name,
            &appointment.patient_last_name,
            &appointment.patient_dob,
        )?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn collected_patient(returning: bool) -> PatientInfo {
        PatientInfo {
            first_name: Some("Jane".to_string()),
            last_name: Some("Smith".to_string()),
            dob: Some("1990-07-22".to_string()),
            location: Some("456 Oak Ave".to_string()),
            email: Some("jane.smith@example.com".to_string()),
            is_returning: Some(returning),
        }
    }

    fn collected_appointment(date: NaiveDate, time: NaiveTime) -> AppointmentInfo {
        AppointmentInfo {
            doctor: Some("Dr. Emily Chen".to_string()),
            date: Some(date),
            time: Some(time),
            duration_minutes: Some(60),
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_match_doctor_by_keyword() {
        assert_eq!(match_doctor("Dr. Emily Chen please").unwrap().name, "Dr. Emily Chen");
        assert_eq!(match_doctor("rodriguez").unwrap().name, "Dr. David Rodriguez");
        assert!(match_doctor("whoever is free").is_none());
    }

    #[test]
    fn test_horizon_seeds_weekdays_only() {
        let conn = setup_db();
        // 2026-09-07 is a Monday; the horizon covers the next 14 calendar
        // days, 10 of which are weekdays.
        let from = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap();
        let inserted = ensure_schedule_horizon(&conn, from).unwrap();
        assert_eq!(inserted, 10 * 16 * DOCTORS.len());

        // Re-seeding inserts nothing new.
        assert_eq!(ensure_schedule_horizon(&conn, from).unwrap(), 0);

        let saturday = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();
        let after = saturday.and_hms_opt(0, 0, 0).unwrap() - Duration::days(1);
        let slots = queries::list_available_slots(&conn, Some("Dr. Emily Chen"), &after, 100)
            .unwrap();
        assert!(slots.iter().all(|s| s.date != saturday));
    }

    #[test]
    fn test_book_consumes_slot_and_creates_patient() {
        let mut conn = setup_db();
        let date = NaiveDate::from_ymd_opt(2026, 9, 8).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        queries::insert_slot_ignore(&conn, "Dr. Emily Chen", date, time).unwrap();

        let record = book_appointment(
            &mut conn,
            &collected_patient(false),
            &collected_appointment(date, time),
            &InsuranceInfo::self_pay(),
            dt("2026-09-01 10:00"),
        )
        .unwrap();

        assert_eq!(record.status, AppointmentStatus::Confirmed);
        assert_eq!(record.insurance_carrier, "Self-Pay");

        // Slot consumed.
        assert!(!queries::claim_slot(&conn, "Dr. Emily Chen", date, time).unwrap());
        // Directory entry created, flagged returning for the next visit.
        let patient = queries::find_patient(&conn, "jane", "smith", "1990-07-22")
            .unwrap()
            .unwrap();
        assert!(patient.is_returning);
    }

    #[test]
    fn test_double_booking_same_slot_fails_atomically() {
        let mut conn = setup_db();
        let date = NaiveDate::from_ymd_opt(2026, 9, 8).unwrap();
        let time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        queries::insert_slot_ignore(&conn, "Dr. Emily Chen", date, time).unwrap();

        book_appointment(
            &mut conn,
            &collected_patient(true),
            &collected_appointment(date, time),
            &InsuranceInfo::self_pay(),
            dt("2026-09-01 10:00"),
        )
        .unwrap();

        let second = book_appointment(
            &mut conn,
            &collected_patient(true),
            &collected_appointment(date, time),
            &InsuranceInfo::self_pay(),
            dt("2026-09-01 11:00"),
        );
        assert!(second.is_err());

        // The failed commit left no ledger record behind.
        assert_eq!(
            queries::confirmed_count_for_slot(&conn, "Dr. Emily Chen", date, time).unwrap(),
            1
        );
    }

    #[test]
    fn test_cancel_frees_slot_and_removes_new_patient() {
        let mut conn = setup_db();
        let date = NaiveDate::from_ymd_opt(2026, 9, 8).unwrap();
        let time = NaiveTime::from_hms_opt(11, 0, 0).unwrap();
        queries::insert_slot_ignore(&conn, "Dr. Emily Chen", date, time).unwrap();

        let record = book_appointment(
            &mut conn,
            &collected_patient(false),
            &collected_appointment(date, time),
            &InsuranceInfo::self_pay(),
            dt("2026-09-01 10:00"),
        )
        .unwrap();

        cancel_appointment(&mut conn, &record, "patient request", dt("2026-09-02 09:00")).unwrap();

        // Slot is bookable again.
        assert!(queries::claim_slot(&conn, "Dr. Emily Chen", date, time).unwrap());
        // A cancelled first visit reverts the identity to unknown.
        assert!(queries::find_patient(&conn, "Jane", "Smith", "1990-07-22")
            .unwrap()
            .is_none());
        // The ledger keeps the history.
        let appt = queries::get_appointment(&conn, &record.id).unwrap().unwrap();
        assert_eq!(appt.status, AppointmentStatus::Cancelled);

        // Cancelling twice is rejected.
        assert!(
            cancel_appointment(&mut conn, &record, "again", dt("2026-09-02 10:00")).is_err()
        );
    }

    #[test]
    fn test_cancel_keeps_returning_patient_record() {
        let mut conn = setup_db();
        let date = NaiveDate::from_ymd_opt(2026, 9, 9).unwrap();
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        queries::insert_slot_ignore(&conn, "Dr. Emily Chen", date, time).unwrap();
        queries::upsert_patient(
            &conn,
            &PatientRecord {
                id: 0,
                first_name: "Jane".to_string(),
                last_name: "Smith".to_string(),
                dob: "1990-07-22".to_string(),
                email: None,
                location: None,
                phone: None,
                is_returning: true,
                insurance_carrier: None,
                insurance_member_id: None,
                insurance_group_number: None,
            },
        )
        .unwrap();

        let record = book_appointment(
            &mut conn,
            &collected_patient(true),
            &collected_appointment(date, time),
            &InsuranceInfo::self_pay(),
            dt("2026-09-01 10:00"),
        )
        .unwrap();
        cancel_appointment(&mut conn, &record, "patient request", dt("2026-09-02 09:00")).unwrap();

        assert!(queries::find_patient(&conn, "Jane", "Smith", "1990-07-22")
            .unwrap()
            .is_some());
    }
}
