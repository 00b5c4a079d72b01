use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{domain::Deal, stages::Stage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealsResponse {
    pub deals: Vec<Deal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDealResponse {
    pub success: bool,
    pub revision: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteDealQuery {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesResponse {
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingMetrics {
    pub this_week: usize,
    pub week_start: NaiveDate,
    pub today: NaiveDate,
    pub all_time: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FirmSortKey {
    Name,
    DateBooked,
    #[default]
    AumMillions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FirmColumn {
    Name,
    DateBooked,
    AumMillions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirmQuery {
    /// Comma-separated terms; a firm matches when any term is a substring of its name.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub sort: FirmSortKey,
    #[serde(default)]
    pub direction: SortDirection,
    /// Comma-separated `FirmColumn` names for CSV export; all columns when absent.
    #[serde(default)]
    pub columns: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmRow {
    pub name: String,
    pub booking_dates: Vec<NaiveDate>,
    /// Booking dates rendered `M/D/YYYY`, comma separated.
    pub date_booked: String,
    pub aum_millions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmKpis {
    pub firm_count: usize,
    pub total_aum: f64,
    pub median_aum: f64,
    pub average_aum: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_booking: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_booking: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmsOverview {
    pub kpis: FirmKpis,
    pub firms: Vec<FirmRow>,
    pub filtered_aum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryQuery {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}
