//! Tests for reading the cell model of a fixture workbook.

use std::io::Cursor;

use crate::{build_xlsx, fixture_parts, fixture_xlsx};
use dispatch_book_core::CellValue;
use dispatch_book_xlsx::{SheetPart, XlsxDocument, XlsxError};
use pretty_assertions::assert_eq;

#[test]
fn test_sheet_names_and_parts() {
    let doc = XlsxDocument::from_reader(Cursor::new(fixture_xlsx())).unwrap();

    assert_eq!(doc.sheet_names(), vec![" Daily Dispatch", "Water Quantity"]);
    assert_eq!(
        doc.sheet_part("Water Quantity"),
        Some(&SheetPart {
            name: "Water Quantity".into(),
            path: "xl/worksheets/sheet2.xml".into(),
        })
    );
}

#[test]
fn test_cell_values() {
    let doc = XlsxDocument::from_reader(Cursor::new(fixture_xlsx())).unwrap();
    let sheet = doc.workbook().worksheet_by_name(" Daily Dispatch").unwrap();

    assert_eq!(sheet.get_value("B4").unwrap().as_string(), Some("Location"));
    assert_eq!(sheet.get_value("B10").unwrap().as_string(), Some("Dibba"));
    assert_eq!(sheet.get_value("B11").unwrap().as_string(), Some(" Khor Fakkan "));
    assert_eq!(sheet.get_value("C10").unwrap(), &CellValue::Number(100.0));
    assert!(sheet.get_value("I10").unwrap().is_empty());
    assert_eq!(
        sheet.get_value("AM10").unwrap().formula_text(),
        Some("=C10-AL10")
    );
}

#[test]
fn test_missing_workbook_part() {
    let parts: Vec<_> = fixture_parts()
        .into_iter()
        .filter(|(name, _)| *name != "xl/workbook.xml")
        .collect();
    let err = XlsxDocument::from_reader(Cursor::new(build_xlsx(&parts))).unwrap_err();
    assert!(matches!(err, XlsxError::MissingPart(_)));
}

#[test]
fn test_not_a_zip() {
    let err = XlsxDocument::from_reader(Cursor::new(b"plain text".to_vec())).unwrap_err();
    assert!(matches!(err, XlsxError::Zip(_)));
}
