//! File facts read before recognition: MIME type, dimensions and EXIF tags.

use anyhow::Context;
use exif::{Exif, In, Reader, Tag, Value};
use image::{ImageFormat, ImageReader};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

/// Longest side of generated previews, in pixels
pub const PREVIEW_MAX_SIDE: u32 = 320;

/// Longer EXIF values are binary blobs rather than anything readable
const EXIF_VALUE_MAX_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub mime_type: String,
    pub dimensions: Option<(u32, u32)>,
    /// `(latitude, longitude)` in decimal degrees
    pub gps: Option<(f64, f64)>,
    /// Readable EXIF tags of the main image, keyed by tag name
    pub exif: BTreeMap<String, String>,
}

impl FileMetadata {
    /// `WxH`, as stored in `analysis.dimensions`
    pub fn dimensions_label(&self) -> Option<String> {
        self.dimensions.map(|(w, h)| format!("{}x{}", w, h))
    }

    /// EXIF tags as stored in `analysis.exif`; `None` when there are none
    pub fn exif_json(&self) -> Option<String> {
        if self.exif.is_empty() {
            return None;
        }
        serde_json::to_string(&self.exif).ok()
    }
}

pub fn inspect(bytes: &[u8], filename: &str) -> FileMetadata {
    let exif = read_exif(bytes);
    FileMetadata {
        mime_type: detect_mime(bytes, filename),
        dimensions: read_dimensions(bytes),
        gps: exif.as_ref().and_then(gps_position),
        exif: exif.as_ref().map(exif_tags).unwrap_or_default(),
    }
}

/// MIME type from magic bytes, then from the extension, else `unknown`
pub fn detect_mime(bytes: &[u8], filename: &str) -> String {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
        .or_else(|| {
            mime_guess::from_path(filename)
                .first()
                .map(|mime| mime.essence_str().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn read_exif(bytes: &[u8]) -> Option<Exif> {
    Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()
}

/// EXIF tags of the main image as display strings. Maker notes and values
/// too long to be text are left out.
pub fn exif_tags(exif: &Exif) -> BTreeMap<String, String> {
    exif.fields()
        .filter(|field| field.ifd_num == In::PRIMARY)
        .filter(|field| {
            !matches!(
                field.tag,
                Tag::MakerNote | Tag::ExifIFDPointer | Tag::GPSInfoIFDPointer | Tag::InteropIFDPointer
            )
        })
        .map(|field| {
            let value = match &field.value {
                Value::Ascii(parts) => parts
                    .iter()
                    .map(|part| String::from_utf8_lossy(part).trim().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => field.display_value().with_unit(exif).to_string(),
            };
            (field.tag.to_string(), value)
        })
        .filter(|(_, value)| !value.is_empty() && value.len() <= EXIF_VALUE_MAX_LEN)
        .collect()
}

/// GPS position from EXIF, if the file carries one
fn gps_position(exif: &Exif) -> Option<(f64, f64)> {
    let coordinate = |value_tag: Tag, ref_tag: Tag, negative_ref: u8| -> Option<f64> {
        let field = exif.get_field(value_tag, In::PRIMARY)?;
        let Value::Rational(ref parts) = field.value else {
            return None;
        };
        if parts.len() < 3 {
            return None;
        }
        let dms = [parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64()];

        let negative = match exif.get_field(ref_tag, In::PRIMARY).map(|f| &f.value) {
            Some(Value::Ascii(values)) => values
                .first()
                .and_then(|v| v.first())
                .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref)),
            _ => false,
        };

        Some(dms_to_degrees(dms, negative))
    };

    let lat = coordinate(Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let lng = coordinate(Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;

    if !lat.is_finite() || !lng.is_finite() || lat.abs() > 90.0 || lng.abs() > 180.0 {
        return None;
    }
    Some((lat, lng))
}

/// Degrees/minutes/seconds to signed decimal degrees
pub fn dms_to_degrees(dms: [f64; 3], negative: bool) -> f64 {
    let degrees = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    if negative {
        -degrees
    } else {
        degrees
    }
}

/// Write a PNG preview of `source` to `destination`, shrunk to fit
/// [`PREVIEW_MAX_SIDE`]; smaller images keep their size.
pub fn write_preview(source: &Path, destination: &Path) -> anyhow::Result<()> {
    let img = image::open(source).with_context(|| format!("opening {}", source.display()))?;
    let preview = if img.width() > PREVIEW_MAX_SIDE || img.height() > PREVIEW_MAX_SIDE {
        img.thumbnail(PREVIEW_MAX_SIDE, PREVIEW_MAX_SIDE)
    } else {
        img
    };
    preview
        .save_with_format(destination, ImageFormat::Png)
        .with_context(|| format!("writing {}", destination.display()))?;
    Ok(())
}
