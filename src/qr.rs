use std::collections::HashSet;
use std::io::{Cursor, Write};

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};

const FILENAME_SUFFIX: &str = "_qr_code.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrSize {
    /// Inline preview.
    Small,
    /// Downloadable image.
    Large,
}

impl QrSize {
    fn module_px(self) -> u32 {
        match self {
            QrSize::Small => 5,
            QrSize::Large => 10,
        }
    }
}

/// Encodes `data` as a PNG QR code.
pub fn render_png(data: &str, size: QrSize) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(|e| Error::QrEncoding(e.to_string()))?;

    let px = size.module_px();
    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(px, px)
        .build();

    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|e| Error::QrEncoding(e.to_string()))?;

    Ok(bytes.into_inner())
}

/// Attachment filename for a link's QR code.
#[must_use]
pub fn qr_filename(display_name: &str) -> String {
    let safe: String = display_name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{safe}{FILENAME_SUFFIX}")
}

/// One PNG in a QR archive.
pub struct ArchiveEntry {
    pub filename: String,
    pub data: String,
}

fn archive_err(e: zip::result::ZipError) -> Error {
    Error::Archive(e.to_string())
}

/// Renders a large QR code for each entry and packs them into a ZIP archive.
/// Repeated filenames get a numeric prefix so every entry is kept.
pub fn render_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    // PNG data is already deflated
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut used = HashSet::new();

    for entry in entries {
        let png = render_png(&entry.data, QrSize::Large)?;

        let mut name = entry.filename.clone();
        let mut n = 1;
        while !used.insert(name.clone()) {
            name = format!("{n}_{}", entry.filename);
            n += 1;
        }

        zip.start_file(name, options).map_err(archive_err)?;
        zip.write_all(&png)?;
    }

    let cursor = zip.finish().map_err(archive_err)?;
    Ok(cursor.into_inner())
}
