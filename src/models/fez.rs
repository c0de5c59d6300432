//! Fez request and response shapes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{handle, FezPostData, FezType};
use crate::errors::AppError;
use crate::fez::{Fez, NewFez, Slot};

/// Literal shown for a freed, unfilled seat.
pub const AVAILABLE_SLOT: &str = "AvailableSlot";

/// Shown in place of an unset start or end time.
pub const TIME_TBD: &str = "TBD";

const MAX_TEXT_LEN: usize = 2000;

/// Request body for `POST /api/fez/create`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FezCreateRequest {
    pub fez_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub info: String,
    /// Seconds since the epoch, or empty for no time.
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub min_capacity: i64,
    #[serde(default)]
    pub max_capacity: i64,
    /// Participants of a private fez besides the creator.
    #[serde(default)]
    pub initial_users: Vec<Uuid>,
}

impl FezCreateRequest {
    /// Check and convert into engine input.
    pub fn validate(self) -> Result<NewFez, AppError> {
        let fez_type = FezType::from_api_str(&self.fez_type).ok_or_else(|| {
            AppError::Validation(format!("Unknown fez type '{}'", self.fez_type))
        })?;

        if fez_type == FezType::Closed {
            return Ok(NewFez {
                fez_type,
                title: String::new(),
                info: String::new(),
                location: String::new(),
                start_time: None,
                end_time: None,
                min_capacity: 0,
                max_capacity: 0,
                participants: self.initial_users,
            });
        }

        let title = required_text("Title", &self.title)?;
        let info = required_text("Info", &self.info)?;
        let location = required_text("Location", &self.location)?;
        let start_time = parse_timestamp("startTime", &self.start_time)?;
        let end_time = parse_timestamp("endTime", &self.end_time)?;
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if end < start {
                return Err(AppError::Validation(
                    "endTime must not be before startTime".to_string(),
                ));
            }
        }

        let min_capacity = capacity("minCapacity", self.min_capacity)?;
        let max_capacity = capacity("maxCapacity", self.max_capacity)?;
        if max_capacity > 0 && min_capacity > max_capacity {
            return Err(AppError::Validation(
                "minCapacity cannot exceed maxCapacity".to_string(),
            ));
        }

        Ok(NewFez {
            fez_type,
            title,
            info,
            location,
            start_time,
            end_time,
            min_capacity,
            max_capacity,
            participants: Vec::new(),
        })
    }
}

fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if trimmed.chars().count() > MAX_TEXT_LEN {
        return Err(AppError::Validation(format!("{} is too long", field)));
    }
    Ok(trimmed.to_string())
}

fn capacity(field: &str, value: i64) -> Result<u32, AppError> {
    u32::try_from(value)
        .map_err(|_| AppError::Validation(format!("{} must be a non-negative integer", field)))
}

/// Parse a numeric epoch timestamp (fractional seconds allowed). Empty means no time.
pub fn parse_timestamp(field: &str, value: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let invalid = || AppError::Validation(format!("{} '{}' is not a valid timestamp", field, value));
    let seconds: f64 = trimmed.parse().map_err(|_| invalid())?;
    if !seconds.is_finite() {
        return Err(invalid());
    }

    let whole = seconds.floor();
    let nanos = (((seconds - whole) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(whole as i64, nanos)
        .map(Some)
        .ok_or_else(invalid)
}

fn display_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339())
        .unwrap_or_else(|| TIME_TBD.to_string())
}

/// A roster or waitlist entry as rendered to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeatData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub username: String,
}

impl SeatData {
    fn for_user(user_id: Uuid, usernames: &HashMap<Uuid, String>) -> Self {
        Self {
            user_id: Some(user_id),
            username: usernames
                .get(&user_id)
                .map(|name| handle(name))
                .unwrap_or_else(|| handle(&user_id.to_string())),
        }
    }

    fn available() -> Self {
        Self {
            user_id: None,
            username: AVAILABLE_SLOT.to_string(),
        }
    }
}

/// Snapshot of a fez returned by every membership operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FezData {
    pub fez_id: Uuid,
    pub owner_id: Uuid,
    pub fez_type: FezType,
    pub fez_type_label: &'static str,
    pub title: String,
    pub info: String,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub seamonkeys: Vec<SeatData>,
    pub waiting_list: Vec<SeatData>,
}

impl FezData {
    /// Render a fez, resolving user ids through `usernames`.
    pub fn render(fez: &Fez, usernames: &HashMap<Uuid, String>) -> Self {
        let seamonkeys = fez
            .roster
            .slots()
            .iter()
            .map(|slot| match slot {
                Slot::Occupied(id) => SeatData::for_user(*id, usernames),
                Slot::Available => SeatData::available(),
            })
            .collect();
        let waiting_list = fez
            .waitlist
            .iter()
            .map(|id| SeatData::for_user(id, usernames))
            .collect();

        Self {
            fez_id: fez.id,
            owner_id: fez.owner_id,
            fez_type: fez.fez_type,
            fez_type_label: fez.fez_type.label(),
            title: fez.title.clone(),
            info: fez.info.clone(),
            location: fez.location.clone(),
            start_time: display_time(fez.start_time),
            end_time: display_time(fez.end_time),
            min_capacity: fez.min_capacity,
            max_capacity: fez.max_capacity,
            seamonkeys,
            waiting_list,
        }
    }
}

/// A fez together with its visible discussion posts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FezDetailData {
    #[serde(flatten)]
    pub fez: FezData,
    pub posts: Vec<FezPostData>,
}
