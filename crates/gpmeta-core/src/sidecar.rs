use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// Timestamp fields, in precedence order (JSON pointers)
pub const TIMESTAMP_PATHS: &[&str] = &["/photoTakenTime/timestamp", "/creationTime/timestamp"];

const LATITUDE_PATH: &str = "/geoData/latitude";
const LONGITUDE_PATH: &str = "/geoData/longitude";
const ALTITUDE_PATH: &str = "/geoData/altitude";

/// Metadata recovered from one Takeout JSON sidecar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidecarRecord {
    /// `title`: the media file name the export declared
    pub declared_media_name: Option<String>,
    /// Capture time converted to local wall-clock time
    pub capture_time: Option<DateTime<Local>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

/// A complete coordinate: latitude and longitude both present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

impl SidecarRecord {
    /// Build a record from an already parsed sidecar document.
    ///
    /// Geodata is only read when a timestamp was found.
    pub fn from_value(data: &Value) -> Self {
        let capture_time = capture_time(data);
        let (latitude, longitude, altitude) = if capture_time.is_some() {
            (
                data.pointer(LATITUDE_PATH).and_then(Value::as_f64),
                data.pointer(LONGITUDE_PATH).and_then(Value::as_f64),
                data.pointer(ALTITUDE_PATH).and_then(Value::as_f64),
            )
        } else {
            (None, None, None)
        };

        Self {
            declared_media_name: declared_media_name(data),
            capture_time,
            latitude,
            longitude,
            altitude,
        }
    }

    /// The coordinate, if both latitude and longitude are present.
    /// A lone latitude or longitude from a malformed sidecar yields `None`.
    pub fn geo(&self) -> Option<GeoPoint> {
        Some(GeoPoint {
            latitude: self.latitude?,
            longitude: self.longitude?,
            altitude: self.altitude,
        })
    }
}

/// Read and parse a sidecar file into a JSON document.
pub fn load(path: &Path) -> Result<Value> {
    let parse_err = |source| Error::SidecarParse {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|e| parse_err(serde_json::Error::io(e)))?;
    serde_json::from_reader(BufReader::new(file)).map_err(parse_err)
}

/// Read a sidecar into a record, propagating parse failures.
pub fn read(path: &Path) -> Result<SidecarRecord> {
    load(path).map(|data| SidecarRecord::from_value(&data))
}

/// Read a sidecar into a record. Unreadable or malformed files yield a record
/// with every field absent.
pub fn extract(path: &Path) -> SidecarRecord {
    read(path).unwrap_or_else(|e| {
        warn!("{}", e);
        SidecarRecord::default()
    })
}

/// The `title` field, regardless of whether a timestamp exists.
pub fn declared_media_name(data: &Value) -> Option<String> {
    data.get("title")?.as_str().map(str::to_string)
}

/// First usable timestamp from [`TIMESTAMP_PATHS`], as local time.
pub fn capture_time(data: &Value) -> Option<DateTime<Local>> {
    TIMESTAMP_PATHS
        .iter()
        .find_map(|path| data.pointer(path).and_then(epoch_seconds))
        .and_then(local_time)
}

/// Epoch seconds from either a JSON string or a JSON number.
fn epoch_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Convert UTC epoch seconds to local wall-clock time
pub fn local_time(epoch: i64) -> Option<DateTime<Local>> {
    let utc = DateTime::from_timestamp(epoch, 0)?;
    Some(utc.with_timezone(&Local))
}
