use crate::row::{ResultRow, RowError, SortKey};
use std::cmp::Ordering;

#[test]
pub fn parse_keeps_field_text() {
    let row = ResultRow::parse("  1 05   9.50 0 0.123456789  x\n").unwrap();

    assert_eq!(row.fields(), ["1", "05", "9.50", "0", "0.123456789", "x"]);
    assert_eq!(row.key().columns(), &[1.0, 5.0, 9.5, 0.0]);
    assert_eq!(row.render(), "1 05 9.50 0 0.123456789 x");
}

#[test]
pub fn parse_rejects_short_rows() {
    assert_eq!(
        ResultRow::parse("1 2 3").unwrap_err(),
        RowError::TooFewColumns(3)
    );
}

#[test]
pub fn parse_rejects_non_numeric_key() {
    assert_eq!(
        ResultRow::parse("1 2 abc 4 5").unwrap_err(),
        RowError::NotANumber {
            column: 2,
            value: "abc".to_string()
        }
    );
}

#[test]
pub fn payload_may_be_anything() {
    assert!(ResultRow::parse("1 2 3 4 parallel_lb 0.5s").is_ok());
}

#[test]
pub fn keys_compare_numerically() {
    let two = SortKey::new([2.0, 0.0, 0.0, 0.0]);
    let ten = SortKey::new([10.0, 0.0, 0.0, 0.0]);
    let ten_later = SortKey::new([10.0, 0.0, 0.0, 1.0]);

    assert_eq!(two.compare(&ten), Ordering::Less);
    assert_eq!(ten.compare(&ten_later), Ordering::Less);
    assert_eq!(ten.compare(&ten), Ordering::Equal);
    assert_eq!(ten.group(), ten_later.group());
}

#[test]
pub fn negative_zero_is_zero() {
    let negative = ResultRow::parse("-0 1 -0.0 0 a").unwrap();
    let positive = ResultRow::parse("0 0 0 0 b").unwrap();

    assert_eq!(negative.key().columns(), &[0.0, 1.0, 0.0, 0.0]);
    assert_eq!(negative.key().group(), positive.key().group());
    assert_eq!(positive.key().compare(negative.key()), Ordering::Less);
    assert_eq!(negative.render(), "-0 1 -0.0 0 a");
}
