use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    Morning,
    Afternoon,
    Evening,
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::Morning, Shift::Afternoon, Shift::Evening];

    pub fn as_str(self) -> &'static str {
        match self {
            Shift::Morning => "morning",
            Shift::Afternoon => "afternoon",
            Shift::Evening => "evening",
        }
    }

    pub fn parse(s: &str) -> Option<Shift> {
        match s {
            "morning" => Some(Shift::Morning),
            "afternoon" => Some(Shift::Afternoon),
            "evening" => Some(Shift::Evening),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DutyStatus {
    Scheduled,
    Completed,
    Missed,
    Excused,
}

impl DutyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DutyStatus::Scheduled => "scheduled",
            DutyStatus::Completed => "completed",
            DutyStatus::Missed => "missed",
            DutyStatus::Excused => "excused",
        }
    }

    pub fn parse(s: &str) -> Option<DutyStatus> {
        match s {
            "scheduled" => Some(DutyStatus::Scheduled),
            "completed" => Some(DutyStatus::Completed),
            "missed" => Some(DutyStatus::Missed),
            "excused" => Some(DutyStatus::Excused),
            _ => None,
        }
    }
}

/// One cleaning/monitoring assignment for one user on one calendar day.
/// `status` is a data-entry field; nothing ties it to the wall clock.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyRecord {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub shift: Shift,
    pub location: String,
    pub task: String,
    pub status: DutyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
