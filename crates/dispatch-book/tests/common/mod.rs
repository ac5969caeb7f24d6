//! A small "Dispatch order" workbook for store tests

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use dispatch_book_core::{CellAddress, CellValue, Workbook};
use dispatch_book_xlsx::XlsxReader;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet3.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet4.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name=" Daily Dispatch" sheetId="1" r:id="rId1"/><sheet name="Water Quantity" sheetId="2" r:id="rId2"/><sheet name=" Monthly production" sheetId="3" r:id="rId3"/><sheet name="Second meter production" sheetId="4" r:id="rId4"/></sheets><calcPr calcId="191029"/></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet3.xml"/><Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet4.xml"/><Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#;

const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>Location</t></si><si><t>Dibba</t></si><si><t xml:space="preserve"> Kalba </t></si></sst>"#;

const DISPATCH_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="3"><c r="B3" t="s"><v>0</v></c></row><row r="10"><c r="B10" t="s"><v>1</v></c><c r="C10"><v>100</v></c><c r="G10"><v>10</v></c></row><row r="11"><c r="B11" t="s"><v>2</v></c><c r="C11"><v>50</v></c></row></sheetData></worksheet>"#;

const EMPTY_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;

pub const DISPATCH: &str = " Daily Dispatch";
pub const WATER: &str = "Water Quantity";
pub const PRODUCTION: &str = " Monthly production";
pub const SECOND_METER: &str = "Second meter production";

fn parts(dispatch_sheet: &'static str) -> Vec<(&'static str, &'static str)> {
    vec![
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/sharedStrings.xml", SHARED_STRINGS),
        ("xl/worksheets/sheet1.xml", dispatch_sheet),
        ("xl/worksheets/sheet2.xml", EMPTY_SHEET),
        ("xl/worksheets/sheet3.xml", EMPTY_SHEET),
        ("xl/worksheets/sheet4.xml", EMPTY_SHEET),
    ]
}

/// Write the fixture workbook into `dir`
pub fn write_fixture(dir: &Path) -> PathBuf {
    write_fixture_with_dispatch(dir, DISPATCH_SHEET)
}

/// Write the fixture workbook with its dispatch sheet replaced
pub fn write_fixture_with_dispatch(dir: &Path, dispatch_sheet: &'static str) -> PathBuf {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in parts(dispatch_sheet) {
            zip.start_file(name, options).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    let path = dir.join("Dispatch order.xlsx");
    std::fs::write(&path, buf).unwrap();
    path
}

pub fn read_workbook(path: &Path) -> Workbook {
    XlsxReader::read_file(path).unwrap()
}

pub fn cell(workbook: &Workbook, sheet: &str, addr: &str) -> CellValue {
    workbook
        .worksheet_by_name(sheet)
        .unwrap()
        .value(CellAddress::parse(addr).unwrap())
        .clone()
}

pub fn read_part(path: &Path, name: &str) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut out = String::new();
    entry.read_to_string(&mut out).unwrap();
    out
}
