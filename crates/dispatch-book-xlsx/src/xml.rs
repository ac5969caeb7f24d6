//! Small XML helpers shared by the reader and the patcher.

use dispatch_book_core::CellAddress;
use quick_xml::events::BytesStart;

use crate::error::{XlsxError, XlsxResult};

pub(crate) const CONTENT_TYPES: &str = "[Content_Types].xml";
pub(crate) const WORKBOOK: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
pub(crate) const CALC_CHAIN: &str = "xl/calcChain.xml";

/// Unescaped value of the attribute whose qualified name is `key`
pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> XlsxResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Row/column position while walking `<sheetData>`
///
/// `r` attributes are optional on both `<row>` and `<c>`; a row without one
/// follows the previous row, and a cell without one follows the previous
/// cell in its row.
#[derive(Debug, Default)]
pub(crate) struct SheetCursor {
    row: Option<u32>,
    next_col: u16,
}

impl SheetCursor {
    /// Enter a `<row>`, returning its 0-based index
    pub(crate) fn enter_row(&mut self, r: Option<&str>) -> XlsxResult<u32> {
        let row = match r {
            Some(r) => r
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .ok_or_else(|| XlsxError::Parse(format!("Invalid row number '{}'", r)))?,
            None => self.row.map_or(0, |row| row + 1),
        };
        self.row = Some(row);
        self.next_col = 0;
        Ok(row)
    }

    /// 0-based index of the row last entered
    pub(crate) fn current_row(&self) -> Option<u32> {
        self.row
    }

    /// Position of a `<c>` in the current row
    pub(crate) fn cell(&mut self, r: Option<&str>) -> XlsxResult<(u32, u16)> {
        let (row, col) = match r {
            Some(r) => {
                let addr = CellAddress::parse(r).map_err(|e| {
                    XlsxError::Parse(format!("Invalid cell reference '{}': {}", r, e))
                })?;
                (addr.row, addr.col)
            }
            None => (self.row.unwrap_or(0), self.next_col),
        };
        self.next_col = col.saturating_add(1);
        Ok((row, col))
    }
}

/// Decode Excel's `_xHHHH_` escape sequences in strings.
///
/// Excel writes control characters this way (`_x000d_` for CR, `_x000a_`
/// for LF) and escapes a literal underscore sequence as `_x005f_`.
/// Anything that is not a complete escape is passed through.
pub(crate) fn decode_excel_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        let decoded = candidate
            .get(2..6)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .filter(|_| candidate.as_bytes().get(6) == Some(&b'_'))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &candidate[7..];
            }
            None => {
                out.push('_');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Resolve a relationship target against the directory of its source part.
///
/// `resolve_target("xl", "worksheets/sheet1.xml")` is `xl/worksheets/sheet1.xml`;
/// absolute targets (`/xl/...`) are taken from the package root.
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    let mut segments: Vec<&str> = match target.strip_prefix('/') {
        Some(_) => Vec::new(),
        None => base_dir.split('/').filter(|s| !s.is_empty()).collect(),
    };

    for segment in target.trim_start_matches('/').split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.join("/")
}
