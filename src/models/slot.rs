use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// One bookable half-hour interval on a doctor's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub doctor: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub is_available: bool,
}

impl SlotRecord {
    /// Rendering used when slots are offered to the user as a numbered list.
    pub fn label(&self) -> String {
        format!(
            "{} - {} at {}",
            self.doctor,
            self.date.format("%Y-%m-%d"),
            self.time.format("%H:%M")
        )
    }
}
