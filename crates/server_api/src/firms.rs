//! Firm bookings grouped per firm, with KPIs, filtering, sorting and CSV
//! export.

use std::cmp::Ordering;

use chrono::NaiveDate;
use shared::{
    domain::FirmBooking,
    protocol::{FirmColumn, FirmKpis, FirmQuery, FirmRow, FirmSortKey, FirmsOverview, SortDirection},
};

use crate::dates::{parse_sheet_date, us_short};

pub const ALL_COLUMNS: [FirmColumn; 3] = [
    FirmColumn::Name,
    FirmColumn::DateBooked,
    FirmColumn::AumMillions,
];

/// One row per distinct firm name in first-seen order. Booking dates are
/// sorted ascending, unparsable ones dropped; AUM is the largest booked.
pub fn group_bookings(bookings: &[FirmBooking]) -> Vec<FirmRow> {
    let mut rows: Vec<FirmRow> = Vec::new();
    for booking in bookings {
        let date = parse_sheet_date(&booking.date_booked);
        match rows.iter_mut().find(|row| row.name == booking.name) {
            Some(row) => {
                row.booking_dates.extend(date);
                row.aum_millions = row.aum_millions.max(booking.aum_millions);
            }
            None => rows.push(FirmRow {
                name: booking.name.clone(),
                booking_dates: date.into_iter().collect(),
                date_booked: String::new(),
                aum_millions: booking.aum_millions,
            }),
        }
    }

    for row in &mut rows {
        row.booking_dates.sort();
        row.date_booked = row
            .booking_dates
            .iter()
            .map(|d| us_short(*d))
            .collect::<Vec<_>>()
            .join(", ");
    }
    rows
}

pub fn kpis(firms: &[FirmRow]) -> FirmKpis {
    let total_aum = firms.iter().map(|f| f.aum_millions).sum();

    let mut positive: Vec<f64> = firms
        .iter()
        .map(|f| f.aum_millions)
        .filter(|aum| *aum > 0.0)
        .collect();
    positive.sort_by(f64::total_cmp);
    let median_aum = match positive.len() {
        0 => 0.0,
        n if n % 2 == 1 => positive[n / 2],
        n => (positive[n / 2 - 1] + positive[n / 2]) / 2.0,
    };
    let average_aum = if positive.is_empty() {
        0.0
    } else {
        positive.iter().sum::<f64>() / positive.len() as f64
    };

    let all_dates = firms.iter().flat_map(|f| f.booking_dates.iter().copied());
    FirmKpis {
        firm_count: firms.len(),
        total_aum,
        median_aum,
        average_aum,
        first_booking: all_dates.clone().min(),
        last_booking: all_dates.max(),
    }
}

fn search_terms(search: Option<&str>) -> Vec<String> {
    search
        .unwrap_or_default()
        .split(',')
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

fn is_selected(
    row: &FirmRow,
    terms: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> bool {
    if !terms.is_empty() {
        let name = row.name.to_lowercase();
        if !terms.iter().any(|term| name.contains(term.as_str())) {
            return false;
        }
    }
    if start.is_none() && end.is_none() {
        return true;
    }
    // A date filter keeps firms with at least one booking inside the window.
    row.booking_dates.iter().any(|date| {
        start.map_or(true, |start| *date >= start) && end.map_or(true, |end| *date <= end)
    })
}

fn compare(a: &FirmRow, b: &FirmRow, key: FirmSortKey) -> Ordering {
    match key {
        FirmSortKey::Name => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
        FirmSortKey::DateBooked => a.booking_dates.first().cmp(&b.booking_dates.first()),
        FirmSortKey::AumMillions => a.aum_millions.total_cmp(&b.aum_millions),
    }
}

/// Filters and sorts grouped rows according to `query`.
pub fn select(firms: &[FirmRow], query: &FirmQuery) -> Vec<FirmRow> {
    let terms = search_terms(query.search.as_deref());
    let mut selected: Vec<FirmRow> = firms
        .iter()
        .filter(|row| is_selected(row, &terms, query.start, query.end))
        .cloned()
        .collect();
    selected.sort_by(|a, b| {
        let ordering = compare(a, b, query.sort);
        match query.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    selected
}

pub fn overview(bookings: &[FirmBooking], query: &FirmQuery) -> FirmsOverview {
    let grouped = group_bookings(bookings);
    let firms = select(&grouped, query);
    FirmsOverview {
        kpis: kpis(&grouped),
        filtered_aum: firms.iter().map(|f| f.aum_millions).sum(),
        firms,
    }
}

/// Parses a comma-separated column list. Columns always come out in table
/// order; an absent or blank list selects every column.
pub fn parse_columns(raw: Option<&str>) -> Result<Vec<FirmColumn>, String> {
    let requested: Vec<&str> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if requested.is_empty() {
        return Ok(ALL_COLUMNS.to_vec());
    }

    let mut picked = Vec::new();
    for name in requested {
        let column = ALL_COLUMNS
            .into_iter()
            .find(|c| column_key(*c) == name)
            .ok_or_else(|| format!("unknown column '{name}'"))?;
        picked.push(column);
    }
    Ok(ALL_COLUMNS
        .into_iter()
        .filter(|c| picked.contains(c))
        .collect())
}

fn column_key(column: FirmColumn) -> &'static str {
    match column {
        FirmColumn::Name => "name",
        FirmColumn::DateBooked => "dateBooked",
        FirmColumn::AumMillions => "aumMillions",
    }
}

fn column_header(column: FirmColumn) -> &'static str {
    match column {
        FirmColumn::Name => "Firm Name",
        FirmColumn::DateBooked => "Date Booked",
        FirmColumn::AumMillions => "AUM (M)",
    }
}

fn should_neutralize_csv(value: &str) -> bool {
    matches!(
        value.trim_start().chars().next(),
        Some('=') | Some('+') | Some('-') | Some('@')
    )
}

/// Every cell is quoted; leading formula characters get a `'` prefix.
fn csv_cell(value: &str) -> String {
    let safe = if should_neutralize_csv(value) {
        format!("'{value}")
    } else {
        value.to_string()
    };
    format!("\"{}\"", safe.replace('"', "\"\""))
}

pub fn export_csv(rows: &[FirmRow], columns: &[FirmColumn]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        columns
            .iter()
            .map(|c| csv_cell(column_header(*c)))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        lines.push(
            columns
                .iter()
                .map(|column| match column {
                    FirmColumn::Name => csv_cell(&row.name),
                    FirmColumn::DateBooked => csv_cell(&row.date_booked),
                    FirmColumn::AumMillions => format!("\"{}\"", row.aum_millions),
                })
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

#[cfg(test)]
#[path = "tests/firms_tests.rs"]
mod tests;
