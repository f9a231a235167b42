//! EXIF-backed [`MetadataReader`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{Field, In, Value};
use stitchshot_pipeline::{MetadataReader, MetadataSnapshot};
use tracing::{debug, trace};

/// Reads primary-image EXIF tags from PNG, JPEG, TIFF, HEIF, and WebP
/// containers.
///
/// Tag names are the standard EXIF names (`DateTimeOriginal`, `Make`,
/// ...). ASCII values are kept verbatim; other values use the reader's
/// display form.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifReader;

impl MetadataReader for ExifReader {
    fn read(&self, path: &Path) -> Option<MetadataSnapshot> {
        match read_exif(path) {
            Ok(snapshot) if snapshot.is_empty() => {
                debug!(path = %path.display(), "EXIF block has no primary-image tags");
                None
            }
            Ok(snapshot) => {
                trace!(path = %path.display(), tags = snapshot.len(), "read EXIF metadata");
                Some(snapshot)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no usable EXIF metadata");
                None
            }
        }
    }
}

fn read_exif(path: &Path) -> Result<MetadataSnapshot, exif::Error> {
    let file = File::open(path)?;
    let parsed = exif::Reader::new().read_from_container(&mut BufReader::new(file))?;

    Ok(parsed
        .fields()
        .filter(|field| field.ifd_num == In::PRIMARY)
        .map(|field| (field.tag.to_string(), field_text(field)))
        .collect())
}

/// Text of a field, without the quoting `display_value` adds to strings.
fn field_text(field: &Field) -> String {
    match field.value {
        Value::Ascii(ref parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default(),
        _ => field.display_value().to_string(),
    }
}
