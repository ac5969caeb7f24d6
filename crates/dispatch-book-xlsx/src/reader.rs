//! XLSX reader
//!
//! Builds the in-memory cell model of a package. Only what lookups need is
//! read: sheet names, cell values, formulas and their cached results.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use dispatch_book_core::{CellValue, Workbook, Worksheet};

use crate::error::{XlsxError, XlsxResult};
use crate::package::XlsxPackage;
use crate::xml::{attr_value, decode_excel_escapes, resolve_target, SheetCursor, WORKBOOK, WORKBOOK_RELS};

/// Location of a worksheet inside the package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetPart {
    /// Sheet name as shown on the tab
    pub name: String,
    /// Part name of the worksheet XML (e.g. `xl/worksheets/sheet1.xml`)
    pub path: String,
}

#[derive(Debug)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

/// XLSX file reader
pub struct XlsxReader;

impl XlsxReader {
    /// Read a workbook from a file path
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsxResult<Workbook> {
        let package = XlsxPackage::read_file(path)?;
        Ok(Self::read_package(&package)?.0)
    }

    /// Read the cell model of a package, along with where each sheet lives
    pub fn read_package(package: &XlsxPackage) -> XlsxResult<(Workbook, Vec<SheetPart>)> {
        let rels = match package.part(WORKBOOK_RELS) {
            Some(data) => Self::read_relationships(data)?,
            None => return Err(XlsxError::MissingPart(WORKBOOK_RELS.into())),
        };

        let shared_strings = match rels
            .iter()
            .find(|rel| rel.rel_type.ends_with("/sharedStrings"))
            .map(|rel| resolve_target("xl", &rel.target))
            .and_then(|path| package.part(&path))
        {
            Some(data) => Self::read_shared_strings(data)?,
            None => Vec::new(),
        };

        let sheets = Self::read_workbook_xml(package.require_part(WORKBOOK)?)?;

        let mut workbook = Workbook::empty();
        let mut parts = Vec::with_capacity(sheets.len());

        for (name, r_id) in sheets {
            let Some(rel) = rels
                .iter()
                .find(|rel| rel.id == r_id && rel.rel_type.ends_with("/worksheet"))
            else {
                // Chartsheets and dialog sheets carry no cells
                tracing::debug!(sheet = %name, "skipping non-worksheet sheet");
                continue;
            };

            let path = resolve_target("xl", &rel.target);
            let idx = workbook.add_worksheet_with_name(&name)?;
            if let Some(worksheet) = workbook.worksheet_mut(idx) {
                Self::read_worksheet(package.require_part(&path)?, worksheet, &shared_strings)?;
            }
            parts.push(SheetPart { name, path });
        }

        Ok((workbook, parts))
    }

    /// Read the shared string table
    fn read_shared_strings(data: &[u8]) -> XlsxResult<Vec<String>> {
        let mut xml_reader = Reader::from_reader(data);
        xml_reader.trim_text(false);

        let mut buf = Vec::new();
        let mut strings = Vec::new();
        let mut current = String::new();
        let mut in_t = false;
        // Phonetic runs repeat the text in another script
        let mut in_phonetic = false;

        loop {
            match xml_reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"si" => current.clear(),
                    b"rPh" => in_phonetic = true,
                    b"t" if !in_phonetic => in_t = true,
                    _ => {}
                },
                Event::Empty(e) if e.local_name().as_ref() == b"si" => {
                    strings.push(String::new());
                }
                Event::Text(e) if in_t => current.push_str(&e.unescape()?),
                Event::End(e) => match e.local_name().as_ref() {
                    b"si" => strings.push(decode_excel_escapes(&current)),
                    b"rPh" => in_phonetic = false,
                    b"t" => in_t = false,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(strings)
    }

    /// Read workbook.xml to get sheet names and relationship ids
    fn read_workbook_xml(data: &[u8]) -> XlsxResult<Vec<(String, String)>> {
        let mut xml_reader = Reader::from_reader(data);
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut sheets = Vec::new();

        loop {
            match xml_reader.read_event_into(&mut buf)? {
                Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                    let name = attr_value(&e, b"name")?;
                    let r_id = Self::relationship_id(&e)?;
                    match (name, r_id) {
                        (Some(name), Some(r_id)) => sheets.push((name, r_id)),
                        _ => {
                            return Err(XlsxError::InvalidFormat(
                                "<sheet> without name or r:id".into(),
                            ))
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(sheets)
    }

    /// The `r:id` attribute, whatever prefix the relationships namespace is bound to
    fn relationship_id(e: &BytesStart<'_>) -> XlsxResult<Option<String>> {
        for attr in e.attributes() {
            let attr = attr?;
            let key = attr.key;
            if key.prefix().is_some() && key.local_name().as_ref() == b"id" {
                return Ok(Some(attr.unescape_value()?.into_owned()));
            }
        }
        Ok(None)
    }

    fn read_relationships(data: &[u8]) -> XlsxResult<Vec<Relationship>> {
        let mut xml_reader = Reader::from_reader(data);
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut rels = Vec::new();

        loop {
            match xml_reader.read_event_into(&mut buf)? {
                Event::Empty(e) | Event::Start(e)
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let id = attr_value(&e, b"Id")?;
                    let rel_type = attr_value(&e, b"Type")?;
                    let target = attr_value(&e, b"Target")?;
                    if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                        rels.push(Relationship {
                            id,
                            rel_type,
                            target,
                        });
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }

    fn read_worksheet(
        data: &[u8],
        worksheet: &mut Worksheet,
        shared_strings: &[String],
    ) -> XlsxResult<()> {
        let mut xml_reader = Reader::from_reader(data);
        xml_reader.trim_text(false);

        let mut buf = Vec::new();
        let mut cursor = SheetCursor::default();
        let mut cell: Option<RawCell> = None;
        let mut text: Option<TextTarget> = None;
        let mut in_inline_str = false;

        loop {
            match xml_reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"row" => {
                        cursor.enter_row(attr_value(&e, b"r")?.as_deref())?;
                    }
                    b"c" => cell = Some(RawCell::start(&e, &mut cursor)?),
                    b"v" if cell.is_some() => text = Some(TextTarget::Value),
                    b"f" => {
                        if let Some(cell) = cell.as_mut() {
                            cell.formula = Some(String::new());
                            text = Some(TextTarget::Formula);
                        }
                    }
                    b"is" if cell.is_some() => in_inline_str = true,
                    b"rPh" => in_inline_str = false,
                    b"t" if in_inline_str => text = Some(TextTarget::Inline),
                    _ => {}
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"row" => {
                        cursor.enter_row(attr_value(&e, b"r")?.as_deref())?;
                    }
                    b"c" => {
                        let raw = RawCell::start(&e, &mut cursor)?;
                        raw.store(worksheet, shared_strings)?;
                    }
                    _ => {}
                },
                Event::Text(e) => {
                    if let (Some(target), Some(cell)) = (text, cell.as_mut()) {
                        cell.push_text(target, &e.unescape()?);
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"v" | b"f" | b"t" => text = None,
                    b"is" => in_inline_str = false,
                    b"c" => {
                        if let Some(raw) = cell.take() {
                            raw.store(worksheet, shared_strings)?;
                        }
                        text = None;
                        in_inline_str = false;
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum TextTarget {
    Value,
    Formula,
    Inline,
}

/// A `<c>` element as found in the sheet, before type decoding
#[derive(Debug)]
struct RawCell {
    row: u32,
    col: u16,
    cell_type: Option<String>,
    value: Option<String>,
    formula: Option<String>,
    inline: Option<String>,
}

impl RawCell {
    fn start(e: &BytesStart<'_>, cursor: &mut SheetCursor) -> XlsxResult<Self> {
        let (row, col) = cursor.cell(attr_value(e, b"r")?.as_deref())?;
        Ok(Self {
            row,
            col,
            cell_type: attr_value(e, b"t")?,
            value: None,
            formula: None,
            inline: None,
        })
    }

    fn push_text(&mut self, target: TextTarget, text: &str) {
        let slot = match target {
            TextTarget::Value => &mut self.value,
            TextTarget::Formula => &mut self.formula,
            TextTarget::Inline => &mut self.inline,
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }

    fn store(self, worksheet: &mut Worksheet, shared_strings: &[String]) -> XlsxResult<()> {
        let cell_type = self.cell_type.as_deref();
        let plain = match (cell_type, self.inline, self.value) {
            (Some("inlineStr"), Some(inline), _) => CellValue::String(decode_excel_escapes(&inline)),
            (_, _, Some(raw)) => decode_value(cell_type, &raw, shared_strings)?,
            _ => CellValue::Empty,
        };

        // Dependent cells of a shared formula have an empty <f/>; keep their
        // cached result as a plain value
        let value = match self.formula {
            Some(text) if !text.trim().is_empty() => {
                if plain.is_empty() {
                    CellValue::formula(text)
                } else {
                    CellValue::formula_with_cached(text, plain)
                }
            }
            _ => plain,
        };

        worksheet.set_cell_value_at(self.row, self.col, value)?;
        Ok(())
    }
}

fn decode_value(cell_type: Option<&str>, raw: &str, shared_strings: &[String]) -> XlsxResult<CellValue> {
    let value = match cell_type {
        Some("s") => {
            let idx: usize = raw
                .trim()
                .parse()
                .map_err(|_| XlsxError::Parse(format!("Invalid shared string index '{}'", raw)))?;
            let s = shared_strings.get(idx).ok_or_else(|| {
                XlsxError::Parse(format!("Shared string index {} out of range", idx))
            })?;
            CellValue::String(s.clone())
        }
        Some("b") => CellValue::Boolean(raw.trim() == "1" || raw.trim().eq_ignore_ascii_case("true")),
        Some("e") => CellValue::Error(raw.to_string()),
        Some("str") | Some("inlineStr") | Some("d") => CellValue::String(decode_excel_escapes(raw)),
        _ => match raw.trim().parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::String(raw.to_string()),
        },
    };
    Ok(value)
}
