use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::AppointmentStatus;
use crate::services::scheduling;
use crate::state::AppState;

// GET /api/admin/appointments
#[derive(Deserialize)]
pub struct AppointmentsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct AppointmentResponse {
    id: String,
    patient: String,
    dob: String,
    doctor: String,
    date: String,
    time: String,
    duration_minutes: i32,
    insurance_carrier: String,
    status: String,
    created_at: String,
    cancellation_reason: Option<String>,
}

pub async fn get_appointments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<Vec<AppointmentResponse>>, AppError> {
    let limit = query.limit.unwrap_or(50);
    let appointments = {
        let db = state.db.lock().unwrap();
        queries::list_appointments(&db, query.status.as_deref(), limit)?
    };

    let response = appointments
        .into_iter()
        .map(|a| AppointmentResponse {
            id: a.id,
            patient: format!("{} {}", a.patient_first_name, a.patient_last_name),
            dob: a.patient_dob,
            doctor: a.doctor,
            date: a.date.format("%Y-%m-%d").to_string(),
            time: a.time.format("%H:%M").to_string(),
            duration_minutes: a.duration_minutes,
            insurance_carrier: a.insurance_carrier,
            status: a.status.as_str().to_string(),
            created_at: a.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            cancellation_reason: a.cancellation_reason,
        })
        .collect();

    Ok(Json(response))
}

// POST /api/admin/appointments/:id/cancel
#[derive(Serialize)]
pub struct CancelResponse {
    id: String,
    status: String,
}

pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let appointment = {
        let db = state.db.lock().unwrap();
        queries::get_appointment(&db, &id)?
    }
    .ok_or_else(|| AppError::NotFound(format!("appointment {id}")))?;

    if appointment.status == AppointmentStatus::Cancelled {
        return Err(AppError::Conflict(format!("appointment {id} is already cancelled")));
    }

    {
        let mut db = state.db.lock().unwrap();
        scheduling::cancel_appointment(
            &mut db,
            &appointment,
            "Cancelled by clinic staff",
            Utc::now().naive_utc(),
        )?;
    }

    tracing::info!(appointment = %id, "appointment cancelled by staff");

    Ok(Json(CancelResponse {
        id,
        status: "cancelled".to_string(),
    }))
}

// GET /api/admin/stats
#[derive(Serialize)]
pub struct StatsResponse {
    patients: PatientStats,
    appointments: AppointmentStats,
}

#[derive(Serialize)]
pub struct PatientStats {
    returning: i64,
    new: i64,
    total: i64,
}

#[derive(Serialize)]
pub struct AppointmentStats {
    confirmed: i64,
    cancelled: i64,
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, AppError> {
    let db = state.db.lock().unwrap();
    let patients = queries::patient_counts(&db)?;
    let appointments = queries::appointment_counts(&db)?;

    Ok(Json(StatsResponse {
        patients: PatientStats {
            returning: patients.returning,
            new: patients.new,
            total: patients.total,
        },
        appointments: AppointmentStats {
            confirmed: appointments.confirmed,
            cancelled: appointments.cancelled,
        },
    }))
}

// GET /api/admin/schedule
#[derive(Deserialize)]
pub struct ScheduleQuery {
    pub doctor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct SlotResponse {
    doctor: String,
    date: String,
    time: String,
}

pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Vec<SlotResponse>>, AppError> {
    let limit = query.limit.unwrap_or(50);
    let now = Utc::now().naive_utc();
    let slots = {
        let db = state.db.lock().unwrap();
        queries::list_available_slots(&db, query.doctor.as_deref(), &now, limit)?
    };

    let response = slots
        .into_iter()
        .map(|s| SlotResponse {
            doctor: s.doctor,
            date: s.date.format("%Y-%m-%d").to_string(),
            time: s.time.format("%H:%M").to_string(),
        })
        .collect();

    Ok(Json(response))
}
