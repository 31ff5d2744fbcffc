use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{AppointmentRecord, AppointmentStatus, PatientRecord, SlotRecord};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ── Patients ──

pub fn find_patient(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    dob: &str,
) -> anyhow::Result<Option<PatientRecord>> {
    let result = conn.query_row(
        "SELECT id, first_name, last_name, dob, email, location, phone, is_returning,
                insurance_carrier, insurance_member_id, insurance_group_number
         FROM patients
         WHERE first_name = ?1 AND last_name = ?2 AND dob = ?3",
        params![first_name, last_name, dob],
        |row| {
            Ok(PatientRecord {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                dob: row.get(3)?,
                email: row.get(4)?,
                location: row.get(5)?,
                phone: row.get(6)?,
                is_returning: row.get::<_, i32>(7)? != 0,
                insurance_carrier: row.get(8)?,
                insurance_member_id: row.get(9)?,
                insurance_group_number: row.get(10)?,
            })
        },
    );

    match result {
        Ok(patient) => Ok(Some(patient)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn upsert_patient(conn: &Connection, patient: &PatientRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO patients (first_name, last_name, dob, email, location, phone, is_returning,
                               insurance_carrier, insurance_member_id, insurance_group_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(first_name, last_name, dob) DO UPDATE SET
           email = excluded.email,
           location = excluded.location,
           phone = excluded.phone,
           is_returning = excluded.is_returning,
           insurance_carrier = excluded.insurance_carrier,
           insurance_member_id = excluded.insurance_member_id,
           insurance_group_number = excluded.insurance_group_number",
        params![
            patient.first_name,
            patient.last_name,
            patient.dob,
            patient.email,
            patient.location,
            patient.phone,
            patient.is_returning as i32,
            patient.insurance_carrier,
            patient.insurance_member_id,
            patient.insurance_group_number,
        ],
    )?;
    Ok(())
}

pub fn delete_patient(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    dob: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM patients
         WHERE first_name = ?1 AND last_name = ?2 AND dob = ?3",
        params![first_name, last_name, dob],
    )?;
    Ok(count > 0)
}

pub struct PatientCounts {
    pub returning: i64,
    pub new: i64,
    pub total: i64,
}

pub fn patient_counts(conn: &Connection) -> anyhow::Result<PatientCounts> {
    let (returning, total): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(is_returning), 0), COUNT(*) FROM patients",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(PatientCounts {
        returning,
        new: total - returning,
        total,
    })
}

// ── Schedule slots ──

pub fn insert_slot_ignore(
    conn: &Connection,
    doctor: &str,
    date: NaiveDate,
    time: NaiveTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "INSERT OR IGNORE INTO schedule_slots (doctor, date, time, is_available)
         VALUES (?1, ?2, ?3, 1)",
        params![
            doctor,
            date.format(DATE_FMT).to_string(),
            time.format(TIME_FMT).to_string()
        ],
    )?;
    Ok(count)
}

/// Future, still-available slots ordered earliest-first. `after` bounds the
/// listing to strictly later slots; ISO date/time text compares correctly.
pub fn list_available_slots(
    conn: &Connection,
    doctor: Option<&str>,
    after: &NaiveDateTime,
    limit: i64,
) -> anyhow::Result<Vec<SlotRecord>> {
    let after_date = after.format(DATE_FMT).to_string();
    let after_time = after.format(TIME_FMT).to_string();

    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match doctor {
        Some(doctor) => (
            "SELECT doctor, date, time, is_available FROM schedule_slots
             WHERE is_available = 1 AND doctor = ?1
               AND (date > ?2 OR (date = ?2 AND time > ?3))
             ORDER BY date ASC, time ASC LIMIT ?4"
                .to_string(),
            vec![
                Box::new(doctor.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(after_date),
                Box::new(after_time),
                Box::new(limit),
            ],
        ),
        None => (
            "SELECT doctor, date, time, is_available FROM schedule_slots
             WHERE is_available = 1
               AND (date > ?1 OR (date = ?1 AND time > ?2))
             ORDER BY date ASC, time ASC, doctor ASC LIMIT ?3"
                .to_string(),
            vec![
                Box::new(after_date) as Box<dyn rusqlite::types::ToSql>,
                Box::new(after_time),
                Box::new(limit),
            ],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_slot_row(row)))?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row??);
    }
    Ok(slots)
}

/// Flip a slot to booked, guarded on it still being available. Returns false
/// when the slot is missing or already consumed.
pub fn claim_slot(
    conn: &Connection,
    doctor: &str,
    date: NaiveDate,
    time: NaiveTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE schedule_slots SET is_available = 0
         WHERE doctor = ?1 AND date = ?2 AND time = ?3 AND is_available = 1",
        params![
            doctor,
            date.format(DATE_FMT).to_string(),
            time.format(TIME_FMT).to_string()
        ],
    )?;
    Ok(count > 0)
}

pub fn release_slot(
    conn: &Connection,
    doctor: &str,
    date: NaiveDate,
    time: NaiveTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE schedule_slots SET is_available = 1
         WHERE doctor = ?1 AND date = ?2 AND time = ?3",
        params![
            doctor,
            date.format(DATE_FMT).to_string(),
            time.format(TIME_FMT).to_string()
        ],
    )?;
    Ok(count > 0)
}

fn parse_slot_row(row: &rusqlite::Row) -> anyhow::Result<SlotRecord> {
    let doctor: String = row.get(0)?;
    let date_str: String = row.get(1)?;
    let time_str: String = row.get(2)?;
    let is_available: bool = row.get::<_, i32>(3)? != 0;

    Ok(SlotRecord {
        doctor,
        date: NaiveDate::parse_from_str(&date_str, DATE_FMT)?,
        time: NaiveTime::parse_from_str(&time_str, TIME_FMT)?,
        is_available,
    })
}

// ── Appointments ──

pub fn insert_appointment(conn: &Connection, appt: &AppointmentRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, patient_first_name, patient_last_name, patient_dob,
            patient_email, patient_location, patient_phone, doctor, date, time,
            duration_minutes, was_returning_patient, insurance_carrier, insurance_member_id,
            insurance_group_number, status, created_at, cancellation_reason, cancelled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            appt.id,
            appt.patient_first_name,
            appt.patient_last_name,
            appt.patient_dob,
            appt.patient_email,
            appt.patient_location,
            appt.patient_phone,
            appt.doctor,
            appt.date.format(DATE_FMT).to_string(),
            appt.time.format(TIME_FMT).to_string(),
            appt.duration_minutes,
            appt.was_returning_patient as i32,
            appt.insurance_carrier,
            appt.insurance_member_id,
            appt.insurance_group_number,
            appt.status.as_str(),
            appt.created_at.format(DATETIME_FMT).to_string(),
            appt.cancellation_reason,
            appt.cancelled_at.map(|t| t.format(DATETIME_FMT).to_string()),
        ],
    )?;
    Ok(())
}

const APPOINTMENT_COLUMNS: &str = "id, patient_first_name, patient_last_name, patient_dob, \
    patient_email, patient_location, patient_phone, doctor, date, time, duration_minutes, \
    was_returning_patient, insurance_carrier, insurance_member_id, insurance_group_number, \
    status, created_at, cancellation_reason, cancelled_at";

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<AppointmentRecord>> {
    let result = conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id],
        |row| Ok(parse_appointment_row(row)),
    );

    match result {
        Ok(appt) => Ok(Some(appt?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The patient's most recent Confirmed appointment, matched by the
/// case-insensitive identity tuple.
pub fn find_latest_confirmed_for_patient(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    dob: &str,
) -> anyhow::Result<Option<AppointmentRecord>> {
    let result = conn.query_row(
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE status = 'confirmed'
               AND patient_first_name = ?1
               AND patient_last_name = ?2
               AND patient_dob = ?3
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ),
        params![first_name, last_name, dob],
        |row| Ok(parse_appointment_row(row)),
    );

    match result {
        Ok(appt) => Ok(Some(appt?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Status transition Confirmed -> Cancelled; the guard makes the transition
/// one-shot and terminal.
pub fn mark_cancelled(
    conn: &Connection,
    id: &str,
    reason: &str,
    cancelled_at: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments
         SET status = 'cancelled', cancellation_reason = ?2, cancelled_at = ?3
         WHERE id = ?1 AND status = 'confirmed'",
        params![id, reason, cancelled_at.format(DATETIME_FMT).to_string()],
    )?;
    Ok(count > 0)
}

pub fn list_appointments(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<AppointmentRecord>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE status = ?1 ORDER BY date DESC, time DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 ORDER BY date DESC, time DESC LIMIT ?1"
            ),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_appointment_row(row)))?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub struct AppointmentCounts {
    pub confirmed: i64,
    pub cancelled: i64,
}

pub fn appointment_counts(conn: &Connection) -> anyhow::Result<AppointmentCounts> {
    let (confirmed, cancelled): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(status = 'confirmed'), 0),
                COALESCE(SUM(status = 'cancelled'), 0)
         FROM appointments",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(AppointmentCounts {
        confirmed,
        cancelled,
    })
}

pub fn confirmed_count_for_slot(
    conn: &Connection,
    doctor: &str,
    date: NaiveDate,
    time: NaiveTime,
) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM appointments
         WHERE status = 'confirmed' AND doctor = ?1 AND date = ?2 AND time = ?3",
        params![
            doctor,
            date.format(DATE_FMT).to_string(),
            time.format(TIME_FMT).to_string()
        ],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<AppointmentRecord> {
    let id: String = row.get(0)?;
    let patient_first_name: String = row.get(1)?;
    let patient_last_name: String = row.get(2)?;
    let patient_dob: String = row.get(3)?;
    let patient_email: String = row.get(4)?;
    let patient_location: String = row.get(5)?;
    let patient_phone: Option<String> = row.get(6)?;
    let doctor: String = row.get(7)?;
    let date_str: String = row.get(8)?;
    let time_str: String = row.get(9)?;
    let duration_minutes: i32 = row.get(10)?;
    let was_returning: bool = row.get::<_, i32>(11)? != 0;
    let insurance_carrier: String = row.get(12)?;
    let insurance_member_id: String = row.get(13)?;
    let insurance_group_number: String = row.get(14)?;
    let status_str: String = row.get(15)?;
    let created_at_str: String = row.get(16)?;
    let cancellation_reason: Option<String> = row.get(17)?;
    let cancelled_at_str: Option<String> = row.get(18)?;

    let created_at = NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let cancelled_at = cancelled_at_str
        .as_deref()
        .and_then(|s| NaiveDateTime::parse_from_str(s, DATETIME_FMT).ok());

    Ok(AppointmentRecord {
        id,
        patient_first_name,
        patient_last_name,
        patient_dob,
        patient_email,
        patient_location,
        patient_phone,
        doctor,
        date: NaiveDate::parse_from_str(&date_str, DATE_FMT)?,
        time: NaiveTime::parse_from_str(&time_str, TIME_FMT)?,
        duration_minutes,
        was_returning_patient: was_returning,
        insurance_carrier,
        insurance_member_id,
        insurance_group_number,
        status: AppointmentStatus::parse(&status_str),
        created_at,
        cancellation_reason,
        cancelled_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn sample_patient(first: &str, last: &str, dob: &str, returning: bool) -> PatientRecord {
        PatientRecord {
            id: 0,
            first_name: first.to_string(),
            last_name: last.to_string(),
            dob: dob.to_string(),
            email: Some(format!("{}@example.com", first.to_lowercase())),
            location: Some("123 Main St".to_string()),
            phone: None,
            is_returning: returning,
            insurance_carrier: Some("Aetna".to_string()),
            insurance_member_id: Some("123456789".to_string()),
            insurance_group_number: Some("987654".to_string()),
        }
    }

    fn sample_appointment(id: &str, created_at: &str) -> AppointmentRecord {
        AppointmentRecord {
            id: id.to_string(),
            patient_first_name: "John".to_string(),
            patient_last_name: "Doe".to_string(),
            patient_dob: "1985-03-15".to_string(),
            patient_email: "john@example.com".to_string(),
            patient_location: "123 Main St".to_string(),
            patient_phone: None,
            doctor: "Dr. Emily Chen".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            duration_minutes: 30,
            was_returning_patient: true,
            insurance_carrier: "Self-Pay".to_string(),
            insurance_member_id: "N/A".to_string(),
            insurance_group_number: "N/A".to_string(),
            status: AppointmentStatus::Confirmed,
            created_at: NaiveDateTime::parse_from_str(created_at, DATETIME_FMT).unwrap(),
            cancellation_reason: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_find_patient_case_insensitive() {
        let conn = setup_db();
        upsert_patient(&conn, &sample_patient("John", "Doe", "1985-03-15", true)).unwrap();

        let found = find_patient(&conn, "john", "DOE", "1985-03-15").unwrap();
        assert!(found.unwrap().is_returning);

        let missing = find_patient(&conn, "John", "Doe", "1985-03-16").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_upsert_patient_no_duplicate_key() {
        let conn = setup_db();
        upsert_patient(&conn, &sample_patient("Jane", "Smith", "1990-07-22", false)).unwrap();
        upsert_patient(&conn, &sample_patient("JANE", "smith", "1990-07-22", true)).unwrap();

        let counts = patient_counts(&conn).unwrap();
        assert_eq!(counts.total, 1);
        assert_eq!(counts.returning, 1);
    }

    #[test]
    fn test_claim_slot_only_when_available() {
        let conn = setup_db();
        let date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        insert_slot_ignore(&conn, "Dr. Emily Chen", date, time).unwrap();

        assert!(claim_slot(&conn, "Dr. Emily Chen", date, time).unwrap());
        assert!(!claim_slot(&conn, "Dr. Emily Chen", date, time).unwrap());

        assert!(release_slot(&conn, "Dr. Emily Chen", date, time).unwrap());
        assert!(claim_slot(&conn, "Dr. Emily Chen", date, time).unwrap());
    }

    #[test]
    fn test_latest_confirmed_picks_most_recent() {
        let conn = setup_db();
        insert_appointment(&conn, &sample_appointment("AAAA1111", "2026-08-01 10:00:00")).unwrap();
        insert_appointment(&conn, &sample_appointment("BBBB2222", "2026-08-02 10:00:00")).unwrap();

        let latest = find_latest_confirmed_for_patient(&conn, "JOHN", "doe", "1985-03-15")
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, "BBBB2222");
    }

    #[test]
    fn test_mark_cancelled_is_one_shot() {
        let conn = setup_db();
        insert_appointment(&conn, &sample_appointment("CCCC3333", "2026-08-01 10:00:00")).unwrap();
        let now = Utc::now().naive_utc();

        assert!(mark_cancelled(&conn, "CCCC3333", "patient request", now).unwrap());
        assert!(!mark_cancelled(&conn, "CCCC3333", "again", now).unwrap());

        let appt = get_appointment(&conn, "CCCC3333").unwrap().unwrap();
        assert_eq!(appt.status, AppointmentStatus::Cancelled);
        assert_eq!(appt.cancellation_reason.as_deref(), Some("patient request"));
        assert!(appt.cancelled_at.is_some());
    }

    #[test]
    fn test_list_available_slots_excludes_past_and_booked() {
        let conn = setup_db();
        let doctor = "Dr. Emily Chen";
        let date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        for (h, m) in [(9u32, 0u32), (9, 30), (10, 0)] {
            insert_slot_ignore(&conn, doctor, date, NaiveTime::from_hms_opt(h, m, 0).unwrap())
                .unwrap();
        }
        claim_slot(&conn, doctor, date, NaiveTime::from_hms_opt(9, 30, 0).unwrap()).unwrap();

        let after = NaiveDate::from_ymd_opt(2026, 9, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let slots = list_available_slots(&conn, Some(doctor), &after, 8).unwrap();
        let times: Vec<String> = slots
            .iter()
            .map(|s| s.time.format("%H:%M").to_string())
            .collect();
        assert_eq!(times, vec!["10:00"]);
    }
}
