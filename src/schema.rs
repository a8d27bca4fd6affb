//! Wire types shared between the ERP API client and the HTTP handlers.

use crate::tree::{FlatRow, Forest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generate ISO8601 timestamp for current time.
pub fn now_iso8601() -> String {
    let (date, time) = utc_parts(unix_now());
    format!("{}T{}Z", date, time)
}

/// Human-readable UTC timestamp, e.g. `2025-02-05 12:00:00 UTC`.
pub fn now_display() -> String {
    let (date, time) = utc_parts(unix_now());
    format!("{} {} UTC", date, time)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Split seconds since the epoch into `YYYY-MM-DD` and `HH:MM:SS`.
fn utc_parts(secs: u64) -> (String, String) {
    let days_since_epoch = secs / 86400;
    let time_of_day = secs % 86400;

    let mut year = 1970i32;
    let mut remaining_days = days_since_epoch as i32;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let days_in_months: [i32; 12] = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1;
    for days in days_in_months {
        if remaining_days < days {
            break;
        }
        remaining_days -= days;
        month += 1;
    }

    (
        format!("{:04}-{:02}-{:02}", year, month, remaining_days + 1),
        format!(
            "{:02}:{:02}:{:02}",
            time_of_day / 3600,
            (time_of_day % 3600) / 60,
            time_of_day % 60
        ),
    )
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

// ============================================================================
// Authentication
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/login` on the ERP API.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Authenticated user as reported by the ERP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fullname: Option<String>,
    /// Anything else the API attaches to the user (role, organization, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `GET /auth/profile`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileEnvelope {
    pub user: Option<UserProfile>,
}

/// Response to a successful dashboard login.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user: UserProfile,
    pub started_at: String,
}

// ============================================================================
// Change requests
// ============================================================================

/// Review state of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: RequestStatus,
}

// ============================================================================
// Views
// ============================================================================

/// Summary of a freshly committed view.
#[derive(Debug, Clone, Serialize)]
pub struct ViewSummary {
    pub record_type: String,
    pub seq: u64,
    pub fetched_at: String,
    pub total_rows: usize,
    pub root_count: usize,
}

/// The latest forest for a record type.
#[derive(Debug, Clone, Serialize)]
pub struct TreeView {
    pub record_type: String,
    pub seq: u64,
    pub fetched_at: String,
    pub roots: Forest,
}

/// One page of flattened rows.
#[derive(Debug, Clone, Serialize)]
pub struct RowPage {
    pub rows: Vec<FlatRow>,
    pub offset: usize,
    pub limit: usize,
    pub total_rows: usize,
    pub has_more: bool,
}

/// Selection sent by the UI for bulk actions and exports.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionScope {
    pub ids: Vec<String>,
}

/// Landing page counters.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub counts: Vec<RecordCount>,
    pub pending_requests: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordCount {
    pub record_type: String,
    pub label: String,
    pub count: usize,
}
