use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result, WriteError};
use crate::exif_block;
use crate::media::MediaKind;
use crate::sidecar::GeoPoint;

/// A way of stamping a capture time (and maybe a coordinate) onto a file.
pub trait FusionStrategy {
    fn apply(&self, path: &Path, when: &DateTime<Local>, geo: Option<&GeoPoint>) -> Result<()>;
}

/// EXIF rewrite plus filesystem timestamps.
pub struct ImageFusion;

/// Filesystem timestamps only; the coordinate has nowhere to go.
pub struct TimestampFusion;

impl FusionStrategy for ImageFusion {
    fn apply(&self, path: &Path, when: &DateTime<Local>, geo: Option<&GeoPoint>) -> Result<()> {
        fuse_image(path, when, geo)
    }
}

impl FusionStrategy for TimestampFusion {
    fn apply(&self, path: &Path, when: &DateTime<Local>, _geo: Option<&GeoPoint>) -> Result<()> {
        fuse_timestamps_only(path, when)
    }
}

impl MediaKind {
    pub fn strategy(self) -> &'static dyn FusionStrategy {
        match self {
            MediaKind::Image => &ImageFusion,
            MediaKind::Video | MediaKind::MpCompanion => &TimestampFusion,
        }
    }
}

/// Rewrite the image's EXIF block with the capture time and coordinate, then
/// set its filesystem timestamps.
///
/// The original is only replaced by an atomic rename of a fully written
/// temporary file; on any earlier failure it is left untouched.
pub fn fuse_image(path: &Path, when: &DateTime<Local>, geo: Option<&GeoPoint>) -> Result<()> {
    let bytes = fs::read(path).map_err(|e| Error::write(path, e))?;
    let updates = exif_block::fusion_entries(when, geo);
    let rewritten =
        exif_block::rewrite_container(bytes, updates).map_err(|e| Error::write(path, e))?;
    replace_file(path, &rewritten).map_err(|e| Error::write(path, e))?;
    set_file_times(path, when).map_err(|e| Error::write(path, e))?;
    debug!(path = %path.display(), gps = geo.is_some(), "EXIF block rewritten");
    Ok(())
}

/// Set filesystem timestamps only.
pub fn fuse_timestamps_only(path: &Path, when: &DateTime<Local>) -> Result<()> {
    set_file_times(path, when).map_err(|e| Error::write(path, e))
}

/// Write `contents` next to `path` and rename over it. The temporary file is
/// removed on drop if anything fails before the rename.
fn replace_file(path: &Path, contents: &[u8]) -> std::result::Result<(), WriteError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(path)?.permissions();

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(path)?;
    Ok(())
}

/// Set modification and access time (and creation time where the platform
/// allows setting it) to `when`.
pub fn set_file_times(path: &Path, when: &DateTime<Local>) -> std::io::Result<()> {
    let ft = filetime::FileTime::from_unix_time(when.timestamp(), 0);
    filetime::set_file_times(path, ft, ft)?;

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileTimesExt;
        let file = fs::OpenOptions::new().write(true).open(path)?;
        let created = std::time::SystemTime::from(*when);
        file.set_times(fs::FileTimes::new().set_created(created))?;
    }

    Ok(())
}
