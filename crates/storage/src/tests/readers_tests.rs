use super::*;
use crate::SqliteSheet;

fn row(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

#[tokio::test]
async fn meetings_use_the_first_four_columns_and_skip_blank_rows() {
    let sheet = SqliteSheet::new("sqlite::memory:").await.expect("db");
    sheet
        .ensure_sheet(MEETINGS_SHEET, &MEETINGS_HEADER)
        .await
        .expect("sheet");
    let wide = SheetRange::new(MEETINGS_SHEET, 'A', 'F', 2);
    sheet
        .write_row(&wide, 2, &row(&["2024-05-06", "Intro", "Meeting Booked", "Sam", "x", "y"]))
        .await
        .expect("row 2");
    sheet
        .write_row(&wide, 4, &row(&["5/8/2024", " Follow-up "]))
        .await
        .expect("row 4");

    let meetings = MeetingStore::new(Arc::new(sheet))
        .list_meetings()
        .await
        .expect("meetings");
    assert_eq!(meetings.len(), 2);
    assert_eq!(meetings[0].owner, "Sam");
    assert_eq!(meetings[1].title, "Follow-up");
    assert_eq!(meetings[1].owner, "");
}

#[tokio::test]
async fn firm_bookings_parse_aum_leniently() {
    let sheet = SqliteSheet::new("sqlite::memory:").await.expect("db");
    sheet
        .ensure_sheet(FIRMS_SHEET, &FIRMS_HEADER)
        .await
        .expect("sheet");
    let store = FirmStore::new(Arc::new(sheet.clone()));
    let range = SheetRange::new(FIRMS_SHEET, 'A', 'C', 2);
    for (index, cells) in [
        row(&["Acme Capital", "1/5/2024", "1,250.5"]),
        row(&["", "1/6/2024", "10"]),
        row(&["Bridge Partners", "2/1/2024", "n/a"]),
        row(&["Cedar", "", ""]),
    ]
    .into_iter()
    .enumerate()
    {
        sheet
            .write_row(&range, range.row_number(index), &cells)
            .await
            .expect("row");
    }

    let bookings = store.list_bookings().await.expect("bookings");
    assert_eq!(bookings.len(), 3);
    assert_eq!(bookings[0].aum_millions, 1250.5);
    assert_eq!(bookings[1].name, "Bridge Partners");
    assert_eq!(bookings[1].aum_millions, 0.0);
    assert_eq!(bookings[2].date_booked, "");
}

#[tokio::test]
async fn missing_firms_sheet_is_a_schema_error() {
    let sheet = SqliteSheet::new("sqlite::memory:").await.expect("db");
    let err = FirmStore::new(Arc::new(sheet))
        .list_bookings()
        .await
        .expect_err("no sheet");
    assert!(matches!(err, StoreError::Schema(name) if name == "Firms"));
}

#[test]
fn aum_parse_rejects_non_finite_values() {
    assert_eq!(parse_aum("$300"), 300.0);
    assert_eq!(parse_aum("inf"), 0.0);
    assert_eq!(parse_aum("NaN"), 0.0);
}
