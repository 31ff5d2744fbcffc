use anyhow::Context;
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL COLLATE NOCASE,
    last_name TEXT NOT NULL COLLATE NOCASE,
    dob TEXT NOT NULL,
    email TEXT,
    location TEXT,
    phone TEXT,
    is_returning INTEGER NOT NULL DEFAULT 0,
    insurance_carrier TEXT,
    insurance_member_id TEXT,
    insurance_group_number TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (first_name, last_name, dob)
);

CREATE TABLE IF NOT EXISTS schedule_slots (
    doctor TEXT NOT NULL,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    is_available INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (doctor, date, time)
);

CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    patient_first_name TEXT NOT NULL COLLATE NOCASE,
    patient_last_name TEXT NOT NULL COLLATE NOCASE,
    patient_dob TEXT NOT NULL,
    patient_email TEXT NOT NULL,
    patient_location TEXT NOT NULL,
    patient_phone TEXT,
    doctor TEXT NOT NULL,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    was_returning_patient INTEGER NOT NULL,
    insurance_carrier TEXT NOT NULL,
    insurance_member_id TEXT NOT NULL,
    insurance_group_number TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'confirmed',
    created_at TEXT NOT NULL,
    cancellation_reason TEXT,
    cancelled_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_appointments_patient
    ON appointments (patient_first_name, patient_last_name, patient_dob);
CREATE INDEX IF NOT EXISTS idx_slots_available
    ON schedule_slots (doctor, is_available, date, time);
";

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(SCHEMA)
        .context("failed to apply database schema")?;
    Ok(())
}
