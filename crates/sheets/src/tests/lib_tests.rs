use super::*;

#[test]
fn formats_open_ended_and_single_row_ranges() {
    let range = SheetRange::new("Pipeline", 'A', 'K', 2);
    assert_eq!(range.a1(), "Pipeline!A2:K");
    assert_eq!(range.row_a1(7), "Pipeline!A7:K7");
    assert_eq!(range.width(), 11);
    assert_eq!(range.row_number(0), 2);
    assert_eq!(range.row_number(4), 6);
}

#[test]
fn quotes_sheet_names_with_spaces_or_quotes() {
    let range = SheetRange::new("Q3 Deals", 'A', 'C', 2);
    assert_eq!(range.a1(), "'Q3 Deals'!A2:C");
    let range = SheetRange::new("Bob's", 'A', 'C', 2);
    assert_eq!(range.row_a1(3), "'Bob''s'!A3:C3");
}

#[test]
fn parses_first_row_from_updated_range() {
    assert_eq!(first_row_of_a1("Pipeline!A7:K7"), Some(7));
    assert_eq!(first_row_of_a1("'Q3 Deals'!A12:C12"), Some(12));
    assert_eq!(first_row_of_a1("B3"), Some(3));
    assert_eq!(first_row_of_a1("Pipeline!A:K"), None);
}
