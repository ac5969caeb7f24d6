//! Raw OPC package: the zip entries of an `.xlsx` file, kept in file order.

use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use crate::error::{XlsxError, XlsxResult};
use crate::xml::CONTENT_TYPES;

#[derive(Debug, Clone)]
struct PackagePart {
    name: String,
    data: Vec<u8>,
}

/// All parts of an xlsx package, decompressed in memory
///
/// Parts are written back in the order they were read, so an untouched
/// package round-trips with identical part contents.
#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    parts: Vec<PackagePart>,
}

impl XlsxPackage {
    /// Read a package from a file path
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsxResult<Self> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Read a package from a reader
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            parts.push(PackagePart { name, data });
        }

        let package = Self { parts };
        if package.part(CONTENT_TYPES).is_none() {
            return Err(XlsxError::InvalidFormat(format!("Missing {}", CONTENT_TYPES)));
        }
        Ok(package)
    }

    /// Get a part's bytes by name
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.data.as_slice())
    }

    /// Get a part's bytes by name, failing with [`XlsxError::MissingPart`]
    pub fn require_part(&self, name: &str) -> XlsxResult<&[u8]> {
        self.part(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))
    }

    /// Replace a part, or append it if the package has no part by that name
    pub fn set_part<S: Into<String>>(&mut self, name: S, data: Vec<u8>) {
        let name = name.into();
        match self.parts.iter_mut().find(|p| p.name == name) {
            Some(part) => part.data = data,
            None => self.parts.push(PackagePart { name, data }),
        }
    }

    /// Remove a part, returning its bytes
    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let idx = self.parts.iter().position(|p| p.name == name)?;
        Some(self.parts.remove(idx).data)
    }

    /// Write the package to a writer
    pub fn write<W: Write + Seek>(&self, writer: W) -> XlsxResult<()> {
        let mut zip = zip::ZipWriter::new(writer);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for part in &self.parts {
            zip.start_file(part.name.as_str(), options)?;
            zip.write_all(&part.data)?;
        }

        zip.finish()?;
        Ok(())
    }
}
