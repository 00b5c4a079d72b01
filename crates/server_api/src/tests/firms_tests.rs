use super::*;

fn booking(name: &str, date: &str, aum: f64) -> FirmBooking {
    FirmBooking {
        name: name.into(),
        date_booked: date.into(),
        aum_millions: aum,
    }
}

fn sample() -> Vec<FirmBooking> {
    vec![
        booking("Acme Capital", "3/2/2024", 120.0),
        booking("Bridge Partners", "1/15/2024", 0.0),
        booking("Acme Capital", "1/5/2024", 300.0),
        booking("Cedar Ridge", "2024-02-20", 50.0),
        booking("Delta Fund", "soon", 10.0),
    ]
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

#[test]
fn groups_by_name_with_sorted_dates_and_max_aum() {
    let rows = group_bookings(&sample());
    assert_eq!(rows.len(), 4);
    let acme = &rows[0];
    assert_eq!(acme.name, "Acme Capital");
    assert_eq!(acme.booking_dates, vec![date(2024, 1, 5), date(2024, 3, 2)]);
    assert_eq!(acme.date_booked, "1/5/2024, 3/2/2024");
    assert_eq!(acme.aum_millions, 300.0);
    assert!(rows[3].booking_dates.is_empty());
    assert_eq!(rows[3].date_booked, "");
}

#[test]
fn kpis_use_positive_aum_for_median_and_mean() {
    let rows = group_bookings(&sample());
    let kpis = kpis(&rows);
    assert_eq!(kpis.firm_count, 4);
    assert_eq!(kpis.total_aum, 360.0);
    // Positive values: 10, 50, 300.
    assert_eq!(kpis.median_aum, 50.0);
    assert_eq!(kpis.average_aum, 120.0);
    assert_eq!(kpis.first_booking, Some(date(2024, 1, 5)));
    assert_eq!(kpis.last_booking, Some(date(2024, 3, 2)));
}

#[test]
fn even_count_median_averages_the_middle_pair() {
    let rows = group_bookings(&[
        booking("A", "", 10.0),
        booking("B", "", 20.0),
        booking("C", "", 40.0),
        booking("D", "", 80.0),
    ]);
    assert_eq!(kpis(&rows).median_aum, 30.0);
    assert_eq!(kpis(&[]).median_aum, 0.0);
}

#[test]
fn default_query_sorts_by_aum_descending() {
    let overview = overview(&sample(), &FirmQuery::default());
    let names: Vec<&str> = overview.firms.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Acme Capital", "Cedar Ridge", "Delta Fund", "Bridge Partners"]
    );
    assert_eq!(overview.filtered_aum, 360.0);
}

#[test]
fn search_terms_match_any_substring_case_insensitively() {
    let query = FirmQuery {
        search: Some(" acme , RIDGE,".into()),
        sort: FirmSortKey::Name,
        direction: SortDirection::Asc,
        ..FirmQuery::default()
    };
    let overview = overview(&sample(), &query);
    let names: Vec<&str> = overview.firms.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Acme Capital", "Cedar Ridge"]);
    assert_eq!(overview.filtered_aum, 350.0);
    assert_eq!(overview.kpis.firm_count, 4);
}

#[test]
fn date_window_keeps_firms_with_a_booking_inside_it() {
    let query = FirmQuery {
        start: Some(date(2024, 2, 1)),
        end: Some(date(2024, 2, 29)),
        ..FirmQuery::default()
    };
    let rows = select(&group_bookings(&sample()), &query);
    let names: Vec<&str> = rows.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Cedar Ridge"]);

    let query = FirmQuery {
        start: Some(date(2024, 3, 1)),
        ..FirmQuery::default()
    };
    let rows = select(&group_bookings(&sample()), &query);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Acme Capital");
}

#[test]
fn sorts_by_first_booking_date() {
    let query = FirmQuery {
        sort: FirmSortKey::DateBooked,
        direction: SortDirection::Asc,
        ..FirmQuery::default()
    };
    let rows = select(&group_bookings(&sample()), &query);
    let names: Vec<&str> = rows.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Delta Fund", "Acme Capital", "Bridge Partners", "Cedar Ridge"]
    );
}

#[test]
fn column_lists_parse_in_table_order() {
    assert_eq!(parse_columns(None).expect("all"), ALL_COLUMNS.to_vec());
    assert_eq!(
        parse_columns(Some("aumMillions, name")).expect("two"),
        vec![FirmColumn::Name, FirmColumn::AumMillions]
    );
    assert!(parse_columns(Some("name,owner")).is_err());
}

#[test]
fn csv_quotes_every_cell_and_neutralizes_formulas() {
    let rows = vec![
        FirmRow {
            name: "=HYPERLINK(\"x\")".into(),
            booking_dates: vec![date(2024, 1, 5)],
            date_booked: "1/5/2024".into(),
            aum_millions: 12.5,
        },
        FirmRow {
            name: "Acme, \"The\" Fund".into(),
            booking_dates: Vec::new(),
            date_booked: String::new(),
            aum_millions: 0.0,
        },
    ];
    let csv = export_csv(&rows, &ALL_COLUMNS);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], r#""Firm Name","Date Booked","AUM (M)""#);
    assert_eq!(lines[1], r#""'=HYPERLINK(""x"")","1/5/2024","12.5""#);
    assert_eq!(lines[2], r#""Acme, ""The"" Fund","","0""#);

    let names_only = export_csv(&rows, &[FirmColumn::Name]);
    assert_eq!(names_only.lines().next(), Some(r#""Firm Name""#));
}
