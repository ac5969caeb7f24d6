//! An opened xlsx file: its raw package plus the cell model read from it

use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use dispatch_book_core::{CellAddress, CellValue, Workbook};

use crate::error::XlsxResult;
use crate::package::XlsxPackage;
use crate::patch::{drop_calc_chain, force_full_calc_on_load, patch_worksheet_xml, CellPatches};
use crate::reader::{SheetPart, XlsxReader};

/// An xlsx document open for cell edits
///
/// Edits update the in-memory [`Workbook`] immediately, so lookups see them
/// right away, and are written into the worksheet XML when the document is
/// saved.
#[derive(Debug, Clone)]
pub struct XlsxDocument {
    package: XlsxPackage,
    workbook: Workbook,
    sheet_parts: Vec<SheetPart>,
    pending: CellPatches,
}

impl XlsxDocument {
    /// Open a document from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> XlsxResult<Self> {
        Self::from_package(XlsxPackage::read_file(path)?)
    }

    /// Open a document from a reader
    pub fn from_reader<R: Read + Seek>(reader: R) -> XlsxResult<Self> {
        Self::from_package(XlsxPackage::read(reader)?)
    }

    /// Open a document from an already-read package
    pub fn from_package(package: XlsxPackage) -> XlsxResult<Self> {
        let (workbook, sheet_parts) = XlsxReader::read_package(&package)?;
        Ok(Self {
            package,
            workbook,
            sheet_parts,
            pending: CellPatches::new(),
        })
    }

    /// The cell model, including unsaved edits
    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// Sheet names in file order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.workbook.sheet_names()
    }

    /// Where a sheet's XML lives in the package
    pub fn sheet_part(&self, name: &str) -> Option<&SheetPart> {
        self.sheet_parts.iter().find(|part| part.name == name)
    }

    /// Set a single cell
    pub fn set_cell(&mut self, sheet: &str, addr: CellAddress, value: CellValue) -> XlsxResult<()> {
        let mut patches = CellPatches::new();
        patches.set(sheet, addr, value);
        self.set_cells(&patches)
    }

    /// Apply a set of edits
    ///
    /// Every sheet named in `patches` must exist; if one does not, nothing is
    /// applied.
    pub fn set_cells(&mut self, patches: &CellPatches) -> XlsxResult<()> {
        for sheet in patches.sheet_names() {
            self.workbook.require_worksheet(sheet)?;
        }

        for (sheet, addr, value) in patches.iter() {
            if let Some(worksheet) = self.workbook.worksheet_by_name_mut(sheet) {
                worksheet.set_cell_value_at(addr.row, addr.col, value.clone())?;
            }
        }

        self.pending.merge(patches);
        Ok(())
    }

    /// Whether there are edits not yet written into the package
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Write the document, with all edits applied
    pub fn write<W: Write + Seek>(&mut self, writer: W) -> XlsxResult<()> {
        self.flush()?;
        self.package.write(writer)
    }

    /// Serialize the document to bytes
    pub fn to_bytes(&mut self) -> XlsxResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(Cursor::new(&mut buf))?;
        Ok(buf)
    }

    /// Patch pending edits into the worksheet parts
    fn flush(&mut self) -> XlsxResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        for part in &self.sheet_parts {
            let Some(cells) = self.pending.sheet_cells(&part.name) else {
                continue;
            };
            let patched = patch_worksheet_xml(self.package.require_part(&part.path)?, cells)?;
            self.package.set_part(part.path.clone(), patched);
            tracing::debug!(sheet = %part.name, cells = cells.len(), "patched worksheet");
        }

        if self.pending.has_formulas() {
            drop_calc_chain(&mut self.package)?;
            force_full_calc_on_load(&mut self.package)?;
        }

        self.pending.clear();
        Ok(())
    }
}
