//! Tests for patching cells and saving.

use std::io::Cursor;

use crate::{fixture_xlsx, read_part, STYLES, SHARED_STRINGS};
use dispatch_book_core::{CellAddress, CellValue};
use dispatch_book_xlsx::{CellPatches, XlsxDocument, XlsxError};
use pretty_assertions::assert_eq;

fn addr(s: &str) -> CellAddress {
    CellAddress::parse(s).unwrap()
}

#[test]
fn test_values_survive_save_and_reopen() {
    let mut doc = XlsxDocument::from_reader(Cursor::new(fixture_xlsx())).unwrap();

    let mut patches = CellPatches::new();
    patches.set("Water Quantity", addr("D8"), CellValue::Number(120.0));
    patches.set("Water Quantity", addr("E8"), CellValue::Number(150.0));
    patches.set("Water Quantity", addr("F8"), CellValue::Number(30.0));
    doc.set_cells(&patches).unwrap();
    assert!(doc.has_pending_changes());

    let bytes = doc.to_bytes().unwrap();
    assert!(!doc.has_pending_changes());

    let reopened = XlsxDocument::from_reader(Cursor::new(bytes.clone())).unwrap();
    let sheet = reopened.workbook().worksheet_by_name("Water Quantity").unwrap();
    assert_eq!(sheet.get_value("D8").unwrap(), &CellValue::Number(120.0));
    assert_eq!(sheet.get_value("E8").unwrap(), &CellValue::Number(150.0));
    assert_eq!(sheet.get_value("F8").unwrap(), &CellValue::Number(30.0));
    assert_eq!(sheet.get_value("D7").unwrap(), &CellValue::Number(10.0));

    // Parts nobody touched come back byte-for-byte
    assert_eq!(read_part(&bytes, "xl/styles.xml").as_deref(), Some(STYLES));
    assert_eq!(read_part(&bytes, "xl/sharedStrings.xml").as_deref(), Some(SHARED_STRINGS));
    assert!(read_part(&bytes, "xl/calcChain.xml").is_some());
}

#[test]
fn test_value_edit_keeps_style_and_merges() {
    let mut doc = XlsxDocument::from_reader(Cursor::new(fixture_xlsx())).unwrap();
    doc.set_cell(" Daily Dispatch", addr("I10"), CellValue::Number(42.5))
        .unwrap();
    let bytes = doc.to_bytes().unwrap();

    let sheet_xml = read_part(&bytes, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet_xml.contains(r#"<c r="I10" s="1"><v>42.5</v></c>"#));
    assert!(sheet_xml.contains(r#"<mergeCell ref="B2:F2"/>"#));
    assert!(sheet_xml.contains(r#"<dimension ref="B4:AM11"/>"#));
}

#[test]
fn test_formula_edit_resets_calc_chain() {
    let mut doc = XlsxDocument::from_reader(Cursor::new(fixture_xlsx())).unwrap();

    let mut patches = CellPatches::new();
    patches.set(" Daily Dispatch", addr("I10"), CellValue::Number(42.5));
    patches.set(
        " Daily Dispatch",
        addr("AL10"),
        CellValue::formula_with_cached("=SUM(G10:AK10)", CellValue::Number(42.5)),
    );
    doc.set_cells(&patches).unwrap();
    let bytes = doc.to_bytes().unwrap();

    assert!(read_part(&bytes, "xl/calcChain.xml").is_none());
    assert!(!read_part(&bytes, "[Content_Types].xml").unwrap().contains("calcChain"));
    assert!(!read_part(&bytes, "xl/_rels/workbook.xml.rels").unwrap().contains("calcChain"));
    assert!(read_part(&bytes, "xl/workbook.xml")
        .unwrap()
        .contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#));

    let reopened = XlsxDocument::from_reader(Cursor::new(bytes)).unwrap();
    let sheet = reopened.workbook().worksheet_by_name(" Daily Dispatch").unwrap();
    let total = sheet.get_value("AL10").unwrap();
    assert_eq!(total.formula_text(), Some("=SUM(G10:AK10)"));
    assert_eq!(total.as_number(), Some(42.5));
}

#[test]
fn test_unknown_sheet_applies_nothing() {
    let mut doc = XlsxDocument::from_reader(Cursor::new(fixture_xlsx())).unwrap();

    let mut patches = CellPatches::new();
    patches.set("Water Quantity", addr("D8"), CellValue::Number(1.0));
    patches.set("Monthly production", addr("C9"), CellValue::Number(2.0));

    let err = doc.set_cells(&patches).unwrap_err();
    assert!(matches!(err, XlsxError::Core(_)));
    assert!(!doc.has_pending_changes());
    let sheet = doc.workbook().worksheet_by_name("Water Quantity").unwrap();
    assert!(sheet.get_value("D8").unwrap().is_empty());
}

#[test]
fn test_edits_visible_before_save() {
    let mut doc = XlsxDocument::from_reader(Cursor::new(fixture_xlsx())).unwrap();
    doc.set_cell("Water Quantity", addr("D9"), CellValue::Number(7.0))
        .unwrap();

    let sheet = doc.workbook().worksheet_by_name("Water Quantity").unwrap();
    assert_eq!(sheet.get_value("D9").unwrap().as_number(), Some(7.0));
}

#[test]
fn test_save_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Dispatch order.xlsx");
    std::fs::write(&path, fixture_xlsx()).unwrap();

    let mut doc = XlsxDocument::open(&path).unwrap();
    doc.set_cell("Water Quantity", addr("D8"), CellValue::Number(5.0))
        .unwrap();
    std::fs::write(&path, doc.to_bytes().unwrap()).unwrap();

    let reopened = XlsxDocument::open(&path).unwrap();
    let sheet = reopened.workbook().worksheet_by_name("Water Quantity").unwrap();
    assert_eq!(sheet.get_value("D8").unwrap().as_number(), Some(5.0));
}
