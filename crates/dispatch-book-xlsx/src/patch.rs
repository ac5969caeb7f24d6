//! In-place cell patching of worksheet XML
//!
//! A worksheet part is streamed event by event. Events are copied through
//! unchanged except for the `<c>` elements being patched, which are replaced,
//! and rows/cells that do not exist yet, which are inserted in sorted
//! position. A replaced cell keeps its style index.

use std::collections::BTreeMap;
use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use dispatch_book_core::{CellAddress, CellValue};

use crate::error::{XlsxError, XlsxResult};
use crate::package::XlsxPackage;
use crate::xml::{attr_value, SheetCursor, CALC_CHAIN, CONTENT_TYPES, WORKBOOK, WORKBOOK_RELS};

/// Cell edits grouped by sheet name
///
/// Setting the same cell twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellPatches {
    sheets: BTreeMap<String, BTreeMap<(u32, u16), CellValue>>,
}

impl CellPatches {
    /// Create an empty patch set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a cell value
    pub fn set<S: Into<String>>(&mut self, sheet: S, addr: CellAddress, value: CellValue) {
        self.sheets
            .entry(sheet.into())
            .or_default()
            .insert((addr.row, addr.col), value);
    }

    /// Get the patched value of a cell, if any
    pub fn get(&self, sheet: &str, addr: CellAddress) -> Option<&CellValue> {
        self.sheets.get(sheet)?.get(&(addr.row, addr.col))
    }

    /// Merge another patch set into this one; its values win
    pub fn merge(&mut self, other: &CellPatches) {
        for (sheet, cells) in &other.sheets {
            let target = self.sheets.entry(sheet.clone()).or_default();
            for (key, value) in cells {
                target.insert(*key, value.clone());
            }
        }
    }

    /// Check if there are no edits
    pub fn is_empty(&self) -> bool {
        self.sheets.values().all(BTreeMap::is_empty)
    }

    /// Number of patched cells across all sheets
    pub fn len(&self) -> usize {
        self.sheets.values().map(BTreeMap::len).sum()
    }

    /// Names of sheets with edits
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    /// Iterate over all edits: (sheet, address, value), sorted by sheet then position
    pub fn iter(&self) -> impl Iterator<Item = (&str, CellAddress, &CellValue)> {
        self.sheets.iter().flat_map(|(sheet, cells)| {
            cells
                .iter()
                .map(move |(&(row, col), value)| (sheet.as_str(), CellAddress::new(row, col), value))
        })
    }

    /// Whether any edit writes a formula
    pub fn has_formulas(&self) -> bool {
        self.sheets
            .values()
            .flat_map(BTreeMap::values)
            .any(CellValue::is_formula)
    }

    pub(crate) fn sheet_cells(&self, sheet: &str) -> Option<&BTreeMap<(u32, u16), CellValue>> {
        self.sheets.get(sheet).filter(|cells| !cells.is_empty())
    }

    pub(crate) fn clear(&mut self) {
        self.sheets.clear();
    }
}

type PendingRow<'a> = (u32, Vec<(u16, &'a CellValue)>);

/// Rewrite a worksheet part with the given cells replaced or inserted
pub fn patch_worksheet_xml(
    data: &[u8],
    cells: &BTreeMap<(u32, u16), CellValue>,
) -> XlsxResult<Vec<u8>> {
    let mut pending_rows: Vec<PendingRow<'_>> = Vec::new();
    for (&(row, col), value) in cells {
        match pending_rows.last_mut() {
            Some((last, row_cells)) if *last == row => row_cells.push((col, value)),
            _ => pending_rows.push((row, vec![(col, value)])),
        }
    }
    // Reversed so the next pending row/cell is always at the end
    pending_rows.reverse();
    for (_, row_cells) in pending_rows.iter_mut() {
        row_cells.reverse();
    }

    let mut xml_reader = Reader::from_reader(data);
    xml_reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(data.len() + 512));

    let mut buf = Vec::new();
    let mut cursor = SheetCursor::default();
    let mut found_sheet_data = false;
    let mut in_sheet_data = false;
    // Cells still to write in the row currently open
    let mut open_row: Vec<(u16, &CellValue)> = Vec::new();
    // Depth inside a replaced <c>, whose events are dropped
    let mut skip_depth = 0usize;
    // The replaced <c>, written once its old content has been read
    let mut replacing: Option<Replacement<'_>> = None;

    loop {
        let event = xml_reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match event {
                Event::Start(e) => {
                    note_shared_master(&e, &mut replacing)?;
                    skip_depth += 1;
                }
                Event::Empty(e) => note_shared_master(&e, &mut replacing)?,
                Event::End(_) => {
                    skip_depth -= 1;
                    if skip_depth == 0 {
                        if let Some(replacement) = replacing.take() {
                            replacement.write(&mut writer)?;
                        }
                    }
                }
                Event::Eof => {
                    return Err(XlsxError::InvalidFormat("Unterminated <c> element".into()))
                }
                _ => {}
            }
        } else {
            match event {
                Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                    found_sheet_data = true;
                    in_sheet_data = true;
                    writer.write_event(Event::Start(e))?;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                    found_sheet_data = true;
                    if pending_rows.is_empty() {
                        writer.write_event(Event::Empty(e))?;
                    } else {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(e))?;
                        write_rows_before(&mut writer, &mut pending_rows, u32::MAX)?;
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                }
                Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                    write_rows_before(&mut writer, &mut pending_rows, u32::MAX)?;
                    in_sheet_data = false;
                    writer.write_event(Event::End(e))?;
                }
                Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                    let row = cursor.enter_row(attr_value(&e, b"r")?.as_deref())?;
                    write_rows_before(&mut writer, &mut pending_rows, row)?;
                    open_row = take_row(&mut pending_rows, row);
                    if open_row.is_empty() {
                        writer.write_event(Event::Start(e))?;
                    } else {
                        writer.write_event(Event::Start(without_spans(&e)?))?;
                    }
                }
                Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                    let row = cursor.enter_row(attr_value(&e, b"r")?.as_deref())?;
                    write_rows_before(&mut writer, &mut pending_rows, row)?;
                    let row_cells = take_row(&mut pending_rows, row);
                    if row_cells.is_empty() {
                        writer.write_event(Event::Empty(e))?;
                    } else {
                        let start = without_spans(&e)?;
                        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(start))?;
                        for (col, value) in row_cells.into_iter().rev() {
                            write_cell(&mut writer, row, col, None, value, None)?;
                        }
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                }
                Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                    let row = cursor.current_row().unwrap_or(0);
                    while let Some((col, value)) = open_row.pop() {
                        write_cell(&mut writer, row, col, None, value, None)?;
                    }
                    writer.write_event(Event::End(e))?;
                }
                Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                    let (row, col) = cursor.cell(attr_value(&e, b"r")?.as_deref())?;
                    write_cells_before(&mut writer, &mut open_row, row, col)?;
                    match take_cell(&mut open_row, col) {
                        Some(value) => {
                            replacing = Some(Replacement {
                                row,
                                col,
                                style: attr_value(&e, b"s")?,
                                value,
                                shared: None,
                            });
                            skip_depth = 1;
                        }
                        None => writer.write_event(Event::Start(e))?,
                    }
                }
                Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                    let (row, col) = cursor.cell(attr_value(&e, b"r")?.as_deref())?;
                    write_cells_before(&mut writer, &mut open_row, row, col)?;
                    match take_cell(&mut open_row, col) {
                        Some(value) => {
                            let style = attr_value(&e, b"s")?;
                            write_cell(&mut writer, row, col, style.as_deref(), value, None)?;
                        }
                        None => writer.write_event(Event::Empty(e))?,
                    }
                }
                Event::Eof => break,
                other => writer.write_event(other)?,
            }
        }

        buf.clear();
    }

    if !found_sheet_data && !pending_rows.is_empty() {
        return Err(XlsxError::InvalidFormat(
            "Worksheet has no <sheetData> element".into(),
        ));
    }

    Ok(writer.into_inner())
}

fn take_row<'a>(pending_rows: &mut Vec<PendingRow<'a>>, row: u32) -> Vec<(u16, &'a CellValue)> {
    match pending_rows.last() {
        Some((next, _)) if *next == row => pending_rows
            .pop()
            .map(|(_, cells)| cells)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn take_cell<'a>(open_row: &mut Vec<(u16, &'a CellValue)>, col: u16) -> Option<&'a CellValue> {
    match open_row.last() {
        Some((next, _)) if *next == col => open_row.pop().map(|(_, value)| value),
        _ => None,
    }
}

fn write_rows_before<W: Write>(
    writer: &mut Writer<W>,
    pending_rows: &mut Vec<PendingRow<'_>>,
    before: u32,
) -> XlsxResult<()> {
    while pending_rows.last().is_some_and(|(row, _)| *row < before) {
        let Some((row, cells)) = pending_rows.pop() else {
            break;
        };
        let number = (row + 1).to_string();
        let mut start = BytesStart::new("row");
        start.push_attribute(("r", number.as_str()));
        writer.write_event(Event::Start(start))?;
        for (col, value) in cells.into_iter().rev() {
            write_cell(writer, row, col, None, value, None)?;
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

fn write_cells_before<W: Write>(
    writer: &mut Writer<W>,
    open_row: &mut Vec<(u16, &CellValue)>,
    row: u32,
    before: u16,
) -> XlsxResult<()> {
    while open_row.last().is_some_and(|(col, _)| *col < before) {
        let Some((col, value)) = open_row.pop() else {
            break;
        };
        write_cell(writer, row, col, None, value, None)?;
    }
    Ok(())
}

/// Copy of a `<row>` start tag without its `spans` hint, which would no
/// longer cover inserted cells
fn without_spans(e: &BytesStart<'_>) -> XlsxResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"spans" {
            start.push_attribute(attr);
        }
    }
    Ok(start.into_owned())
}

/// The `ref` and `si` of a shared formula group's master cell
#[derive(Debug, Clone, PartialEq)]
struct SharedFormula {
    range: String,
    index: Option<String>,
}

/// A `<c>` being replaced, held until its old content has been read
struct Replacement<'a> {
    row: u32,
    col: u16,
    style: Option<String>,
    value: &'a CellValue,
    shared: Option<SharedFormula>,
}

impl Replacement<'_> {
    /// A formula written over a shared master keeps the group attributes so
    /// the dependents still resolve; anything else would orphan them.
    fn write<W: Write>(self, writer: &mut Writer<W>) -> XlsxResult<()> {
        match (&self.shared, self.value) {
            (Some(_), CellValue::Formula { .. }) | (None, _) => write_cell(
                writer,
                self.row,
                self.col,
                self.style.as_deref(),
                self.value,
                self.shared.as_ref(),
            ),
            (Some(shared), _) => Err(XlsxError::SharedFormulaMaster(format!(
                "{} (group {})",
                CellAddress::new(self.row, self.col).to_a1_string(),
                shared.range
            ))),
        }
    }
}

fn note_shared_master(e: &BytesStart<'_>, replacing: &mut Option<Replacement<'_>>) -> XlsxResult<()> {
    if e.local_name().as_ref() != b"f" || attr_value(e, b"t")?.as_deref() != Some("shared") {
        return Ok(());
    }
    if let (Some(range), Some(replacement)) = (attr_value(e, b"ref")?, replacing.as_mut()) {
        replacement.shared = Some(SharedFormula {
            range,
            index: attr_value(e, b"si")?,
        });
    }
    Ok(())
}

/// Write a complete `<c>` element for `value`
fn write_cell<W: Write>(
    writer: &mut Writer<W>,
    row: u32,
    col: u16,
    style: Option<&str>,
    value: &CellValue,
    shared: Option<&SharedFormula>,
) -> XlsxResult<()> {
    let reference = CellAddress::new(row, col).to_a1_string();
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", reference.as_str()));
    if let Some(style) = style {
        start.push_attribute(("s", style));
    }

    match value {
        CellValue::Empty => {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        CellValue::Formula { text, cached_value } => {
            let cached = cached_value.as_deref();
            if let Some(t) = cached.and_then(type_attr) {
                start.push_attribute(("t", t));
            }
            writer.write_event(Event::Start(start))?;
            let body = text.strip_prefix('=').unwrap_or(text);
            let mut f = BytesStart::new("f");
            if let Some(shared) = shared {
                f.push_attribute(("t", "shared"));
                f.push_attribute(("ref", shared.range.as_str()));
                if let Some(index) = &shared.index {
                    f.push_attribute(("si", index.as_str()));
                }
            }
            writer.write_event(Event::Start(f))?;
            writer.write_event(Event::Text(BytesText::new(body)))?;
            writer.write_event(Event::End(BytesEnd::new("f")))?;
            if let Some(raw) = cached.and_then(raw_value) {
                write_text_element(writer, "v", &raw, false)?;
            }
        }
        CellValue::String(s) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            write_text_element(writer, "t", s, needs_space_preserve(s))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
        }
        other => {
            if let Some(t) = type_attr(other) {
                start.push_attribute(("t", t));
            }
            writer.write_event(Event::Start(start))?;
            if let Some(raw) = raw_value(other) {
                write_text_element(writer, "v", &raw, false)?;
            }
        }
    }

    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
    preserve: bool,
) -> XlsxResult<()> {
    let mut start = BytesStart::new(name);
    if preserve {
        start.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// The `t` attribute for a plain (or cached) value
fn type_attr(value: &CellValue) -> Option<&'static str> {
    match value {
        CellValue::Boolean(_) => Some("b"),
        CellValue::String(_) => Some("str"),
        CellValue::Error(_) => Some("e"),
        CellValue::Number(n) if !n.is_finite() => Some("e"),
        _ => None,
    }
}

/// Text of the `<v>` element for a plain (or cached) value
fn raw_value(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Number(n) if n.is_finite() => Some(n.to_string()),
        CellValue::Number(_) => Some("#NUM!".to_string()),
        CellValue::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
        CellValue::String(s) => Some(s.clone()),
        CellValue::Error(e) => Some(e.clone()),
        CellValue::Formula { cached_value, .. } => cached_value.as_deref().and_then(raw_value),
        CellValue::Empty => None,
    }
}

fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) || s.contains('\n')
}

/// Drop the calculation chain so Excel rebuilds it
///
/// The chain lists formula cells in evaluation order; a stale chain that
/// misses newly written formulas makes Excel report the file as damaged.
pub(crate) fn drop_calc_chain(package: &mut XlsxPackage) -> XlsxResult<()> {
    if package.remove_part(CALC_CHAIN).is_some() {
        tracing::debug!("removed {}", CALC_CHAIN);
    }

    let calc_chain_name = format!("/{}", CALC_CHAIN);
    if let Some(data) = package.part(CONTENT_TYPES) {
        let updated = remove_elements(data, |e| {
            Ok(e.local_name().as_ref() == b"Override"
                && attr_value(e, b"PartName")?.as_deref() == Some(calc_chain_name.as_str()))
        })?;
        package.set_part(CONTENT_TYPES, updated);
    }

    if let Some(data) = package.part(WORKBOOK_RELS) {
        let updated = remove_elements(data, |e| {
            Ok(e.local_name().as_ref() == b"Relationship"
                && attr_value(e, b"Type")?.is_some_and(|t| t.ends_with("/calcChain")))
        })?;
        package.set_part(WORKBOOK_RELS, updated);
    }

    Ok(())
}

/// Ask Excel to recalculate every formula when the workbook is opened
pub(crate) fn force_full_calc_on_load(package: &mut XlsxPackage) -> XlsxResult<()> {
    let updated = set_full_calc_on_load(package.require_part(WORKBOOK)?)?;
    package.set_part(WORKBOOK, updated);
    Ok(())
}

/// Elements that follow `<calcPr>` in the workbook schema
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

fn set_full_calc_on_load(data: &[u8]) -> XlsxResult<Vec<u8>> {
    let mut xml_reader = Reader::from_reader(data);
    xml_reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(data.len() + 64));

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut done = false;

    loop {
        match xml_reader.read_event_into(&mut buf)? {
            Event::Start(e) if depth == 1 && e.local_name().as_ref() == b"calcPr" => {
                writer.write_event(Event::Start(with_full_calc(&e)?))?;
                done = true;
                depth += 1;
            }
            Event::Empty(e) if depth == 1 && e.local_name().as_ref() == b"calcPr" => {
                writer.write_event(Event::Empty(with_full_calc(&e)?))?;
                done = true;
            }
            Event::Start(e) => {
                if depth == 1 && !done && AFTER_CALC_PR.contains(&e.local_name().as_ref()) {
                    write_calc_pr(&mut writer)?;
                    done = true;
                }
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) => {
                if depth == 1 && !done && AFTER_CALC_PR.contains(&e.local_name().as_ref()) {
                    write_calc_pr(&mut writer)?;
                    done = true;
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                if depth == 1 && !done {
                    write_calc_pr(&mut writer)?;
                    done = true;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn write_calc_pr<W: Write>(writer: &mut Writer<W>) -> XlsxResult<()> {
    let mut calc_pr = BytesStart::new("calcPr");
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    writer.write_event(Event::Empty(calc_pr))?;
    Ok(())
}

fn with_full_calc(e: &BytesStart<'_>) -> XlsxResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"fullCalcOnLoad" {
            start.push_attribute(attr);
        }
    }
    start.push_attribute(("fullCalcOnLoad", "1"));
    Ok(start.into_owned())
}

/// Copy `data`, dropping every element (and its content) that `matches`
fn remove_elements<F>(data: &[u8], matches: F) -> XlsxResult<Vec<u8>>
where
    F: Fn(&BytesStart<'_>) -> XlsxResult<bool>,
{
    let mut xml_reader = Reader::from_reader(data);
    xml_reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(data.len()));

    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = xml_reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
        } else {
            match event {
                Event::Start(e) if matches(&e)? => skip_depth = 1,
                Event::Empty(e) if matches(&e)? => {}
                Event::Eof => break,
                other => writer.write_event(other)?,
            }
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}
