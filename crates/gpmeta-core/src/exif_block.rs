//! EXIF block rebuild for images.
//!
//! The existing block is never edited in place: its fields are read into an
//! owned table, new entries replace or extend that table by `(tag, ifd)`, and
//! the result is serialized into a fresh TIFF buffer that the container
//! re-embeds.

use std::io::Cursor;

use chrono::{DateTime, Local};
use exif::experimental::Writer;
use exif::{Exif, Field, In, Reader, Tag, Value};
use img_parts::{Bytes, DynImage, ImageEXIF};

use crate::error::WriteError;
use crate::geo::{self, GpsRational};
use crate::sidecar::GeoPoint;

/// EXIF date layout; the writer appends the NUL terminator.
pub const DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// An owned EXIF field table plus what is needed to serialize it again.
#[derive(Debug, Clone)]
pub struct ExifBlock {
    fields: Vec<Field>,
    little_endian: bool,
    thumbnail: Option<Vec<u8>>,
}

impl ExifBlock {
    /// Empty table for images that carry no EXIF block yet.
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            little_endian: false,
            thumbnail: None,
        }
    }

    /// Parse a raw TIFF-structured EXIF block.
    pub fn parse(tiff: Vec<u8>) -> Result<Self, exif::Error> {
        let exif = Reader::new().read_raw(tiff)?;
        let thumbnail = thumbnail_jpeg(&exif);
        let fields = exif
            .fields()
            .filter(|f| f.ifd_num == In::PRIMARY || (f.ifd_num == In::THUMBNAIL && thumbnail.is_some()))
            // fields of unknown type cannot be serialized again
            .filter(|f| !matches!(f.value, Value::Unknown(..)))
            .cloned()
            .collect();
        Ok(Self {
            fields,
            little_endian: exif.little_endian(),
            thumbnail,
        })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, tag: Tag, ifd: In) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag && f.ifd_num == ifd)
    }

    /// New block with `updates` applied by replace-or-insert.
    pub fn apply(self, updates: Vec<Field>) -> Self {
        Self {
            fields: merge_entries(self.fields, updates),
            ..self
        }
    }

    /// Serialize to a TIFF buffer, keeping the original byte order.
    pub fn to_tiff(&self) -> Result<Vec<u8>, exif::Error> {
        let mut writer = Writer::new();
        for field in &self.fields {
            writer.push_field(field);
        }
        if let Some(jpeg) = &self.thumbnail {
            writer.set_jpeg(jpeg, In::THUMBNAIL);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, self.little_endian)?;
        Ok(buf.into_inner())
    }
}

fn thumbnail_jpeg(exif: &Exif) -> Option<Vec<u8>> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let len = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    exif.buf().get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
}

/// Replace entries of `existing` that share `(tag, ifd)` with an update and
/// append the rest. Nothing is ever removed.
pub fn merge_entries(existing: Vec<Field>, updates: Vec<Field>) -> Vec<Field> {
    let mut merged = existing;
    for update in updates {
        match merged
            .iter_mut()
            .find(|f| f.tag == update.tag && f.ifd_num == update.ifd_num)
        {
            Some(slot) => *slot = update,
            None => merged.push(update),
        }
    }
    merged
}

fn primary(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

fn ascii(text: impl Into<Vec<u8>>) -> Value {
    Value::Ascii(vec![text.into()])
}

/// The entries written for a capture time and an optional coordinate:
/// the DateTime triplet, then GPS reference/value pairs and altitude.
pub fn fusion_entries(when: &DateTime<Local>, geo: Option<&GeoPoint>) -> Vec<Field> {
    let stamp = when.format(DATETIME_FORMAT).to_string();
    let mut entries = vec![
        primary(Tag::DateTime, ascii(stamp.clone())),
        primary(Tag::DateTimeOriginal, ascii(stamp.clone())),
        primary(Tag::DateTimeDigitized, ascii(stamp)),
    ];

    if let Some(geo) = geo {
        entries.push(primary(
            Tag::GPSLatitudeRef,
            ascii(vec![geo::hemisphere(geo.latitude, b'N', b'S')]),
        ));
        entries.push(primary(
            Tag::GPSLatitude,
            Value::Rational(GpsRational::encode(geo.latitude).rationals()),
        ));
        entries.push(primary(
            Tag::GPSLongitudeRef,
            ascii(vec![geo::hemisphere(geo.longitude, b'E', b'W')]),
        ));
        entries.push(primary(
            Tag::GPSLongitude,
            Value::Rational(GpsRational::encode(geo.longitude).rationals()),
        ));
        if let Some(altitude) = geo.altitude {
            entries.push(primary(
                Tag::GPSAltitude,
                Value::Rational(vec![geo::encode_altitude(altitude)]),
            ));
        }
    }

    entries
}

/// Re-embed a rebuilt EXIF block into an image container held in memory.
///
/// Returns the complete new file contents; `bytes` is consumed, never mutated
/// on disk.
pub fn rewrite_container(bytes: Vec<u8>, updates: Vec<Field>) -> Result<Vec<u8>, WriteError> {
    let mut image =
        DynImage::from_bytes(Bytes::from(bytes))?.ok_or(WriteError::UnsupportedContainer)?;

    let block = match image.exif() {
        Some(tiff) => ExifBlock::parse(tiff.to_vec())?,
        None => ExifBlock::empty(),
    };
    let tiff = block.apply(updates).to_tiff()?;
    image.set_exif(Some(Bytes::from(tiff)));

    let mut out = Vec::new();
    image.encoder().write_to(&mut out)?;
    Ok(out)
}
