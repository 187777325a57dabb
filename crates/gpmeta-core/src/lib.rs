pub mod error;
pub mod exif_block;
pub mod extras;
pub mod geo;
pub mod media;
pub mod resolve;
pub mod scan;
pub mod sidecar;
pub mod writer;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

pub use error::{Error, Result, WriteError};

use extras::VariantTable;
use media::MediaKind;
use resolve::{Claim, Resolver};
use sidecar::SidecarRecord;

/// `total` passed to progress callbacks while the total is not known yet.
pub const UNKNOWN_TOTAL: u64 = u64::MAX;

/// When a sidecar is deleted after its media files were processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetirePolicy {
    /// Delete only if at least one media file was fused from it.
    #[default]
    RequireFusion,
    /// Delete whenever a media file was found, fused or not.
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Extracted Takeout directory, scanned recursively
    pub root: PathBuf,
    #[serde(default)]
    pub retire_policy: RetirePolicy,
    /// Extra localized "edited" suffixes, probed after the built-in ones
    #[serde(default)]
    pub edited_suffixes: Vec<String>,
    /// Resolve and log only; touch nothing on disk
    #[serde(default)]
    pub dry_run: bool,
}

impl ProcessOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retire_policy: RetirePolicy::default(),
            edited_suffixes: Vec::new(),
            dry_run: false,
        }
    }

    pub fn variant_table(&self) -> VariantTable {
        VariantTable::default().with_edited_suffixes(&self.edited_suffixes)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub sidecars_found: u64,
    pub sidecars_retired: u64,
    /// Sidecars left on disk for inspection or a later run
    pub sidecars_kept: u64,
    pub media_fused: u64,
    /// Motion-photo companions and edited copies updated alongside an image
    pub variants_fused: u64,
    pub failures: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Type alias for progress callback: `(stage, current, total, message)`.
/// The closure may borrow from the caller's stack.
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter: emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current.saturating_add(1) >= total;
        if !is_done {
            let mut last = match self.last_emit.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if last.elapsed() < Duration::from_millis(200) {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Scan `options.root` for sidecars and fuse each into the media it describes.
///
/// Only a failure to enumerate the directory tree is returned as an error;
/// per-sidecar and per-file failures are logged and counted in the result.
pub fn process(
    options: &ProcessOptions,
    progress_callback: &ProgressCallback<'_>,
) -> Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);

    let sidecars = scan::find_sidecars(&options.root, &tp)?;
    let total = sidecars.len() as u64;
    info!(root = %options.root.display(), sidecars = total, "scan complete");

    let variants = options.variant_table();
    let mut pipeline = Pipeline {
        options,
        resolver: Resolver::new(&variants),
        result: ProcessResult {
            sidecars_found: total,
            ..ProcessResult::default()
        },
    };

    for (i, sidecar) in sidecars.iter().enumerate() {
        let span = info_span!("sidecar", path = %sidecar.display());
        let _enter = span.enter();

        let name = sidecar
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        tp.report("fuse", i as u64, total, name);

        match pipeline.run_sidecar(sidecar) {
            Ok(true) => pipeline.result.sidecars_retired += 1,
            Ok(false) => pipeline.result.sidecars_kept += 1,
            Err(e @ Error::MissingDeclaredName { .. }) => {
                // album metadata and other untitled JSON files land here
                info!("{}, skipping", e);
                pipeline.result.sidecars_kept += 1;
            }
            Err(e) => {
                pipeline.note_failure(&e);
                pipeline.result.sidecars_kept += 1;
            }
        }
    }
    tp.report("fuse", total, total, "Done");

    Ok(pipeline.result)
}

struct Pipeline<'a> {
    options: &'a ProcessOptions,
    resolver: Resolver<'a>,
    result: ProcessResult,
}

impl Pipeline<'_> {
    /// Process one sidecar to completion. Returns whether it was retired.
    fn run_sidecar(&mut self, sidecar: &Path) -> Result<bool> {
        let data = sidecar::load(sidecar)?;
        let declared = sidecar::declared_media_name(&data).ok_or_else(|| {
            Error::MissingDeclaredName {
                path: sidecar.to_path_buf(),
            }
        })?;
        let record = SidecarRecord::from_value(&data);

        let associations = self.resolver.resolve(sidecar, &declared);
        if associations.is_empty() {
            return Err(Error::NoMatchingMediaFile {
                path: sidecar.to_path_buf(),
            });
        }

        let mut fused = 0u64;
        let mut video_fused = false;
        for assoc in &associations {
            let kind = match assoc.claim {
                Claim::Companion => Some(MediaKind::MpCompanion),
                Claim::Exact | Claim::Glob => MediaKind::classify(&assoc.media),
            };
            let Some(kind) = kind else {
                self.note_failure(&Error::UnsupportedMedia {
                    path: assoc.media.clone(),
                });
                continue;
            };

            match self.fuse(sidecar, &assoc.media, kind, &record) {
                Ok(()) => {
                    fused += 1;
                    self.result.media_fused += 1;
                    match kind {
                        MediaKind::Video => video_fused = true,
                        MediaKind::Image if assoc.claim == Claim::Exact => {
                            self.propagate(sidecar, &assoc.media, &record)
                        }
                        _ => {}
                    }
                }
                Err(e) => self.note_failure(&e),
            }
        }

        let retire = video_fused
            || match self.options.retire_policy {
                RetirePolicy::RequireFusion => fused > 0,
                RetirePolicy::Lenient => true,
            };
        if !retire {
            debug!("nothing fused, keeping sidecar");
            return Ok(false);
        }
        Ok(self.retire(sidecar))
    }

    fn fuse(
        &self,
        sidecar: &Path,
        media: &Path,
        kind: MediaKind,
        record: &SidecarRecord,
    ) -> Result<()> {
        let when = record.capture_time.as_ref().ok_or_else(|| Error::NoTimestamp {
            sidecar: sidecar.to_path_buf(),
            media: media.to_path_buf(),
        })?;
        let geo = record.geo();

        if self.options.dry_run {
            info!(
                path = %media.display(),
                time = %when.format(exif_block::DATETIME_FORMAT),
                gps = geo.is_some(),
                "would update {} file",
                kind.label()
            );
            return Ok(());
        }

        info!(path = %media.display(), "Processing {} file", kind.label());
        kind.strategy().apply(media, when, geo.as_ref())
    }

    /// Fuse the motion-photo companion and edited copies of an image that was
    /// matched by its exact declared name. Outcomes never affect retirement.
    fn propagate(&mut self, sidecar: &Path, media: &Path, record: &SidecarRecord) {
        let mut derived: Vec<(PathBuf, MediaKind)> = Vec::new();
        if let Some(mp) = self.resolver.mp_companion(media) {
            derived.push((mp, MediaKind::MpCompanion));
        }
        for edited in self.resolver.edited_variants(media) {
            derived.push((edited, MediaKind::Image));
        }

        for (path, kind) in derived {
            match self.fuse(sidecar, &path, kind, record) {
                Ok(()) => {
                    self.result.variants_fused += 1;
                    info!(path = %path.display(), "Metadata updated for {} file", kind.label());
                }
                Err(e) => self.note_failure(&e),
            }
        }
    }

    fn retire(&mut self, sidecar: &Path) -> bool {
        if self.options.dry_run {
            info!("would delete sidecar");
            return true;
        }
        match fs::remove_file(sidecar) {
            Ok(()) => {
                debug!("sidecar deleted");
                true
            }
            Err(e) => {
                let msg = format!("cannot delete sidecar {}: {}", sidecar.display(), e);
                warn!("{}", msg);
                self.result.failures += 1;
                self.result.warnings.push(msg);
                false
            }
        }
    }

    fn note_failure(&mut self, err: &Error) {
        warn!("{}", err);
        self.result.failures += 1;
        self.result.warnings.push(err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttled_progress_always_emits_completion() {
        let count = std::sync::atomic::AtomicU64::new(0);
        let cb = |_: &str, _: u64, _: u64, _: &str| {
            count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        };
        let tp = ThrottledProgress::new(&cb);
        for i in 0..50 {
            tp.report("fuse", i, 100, "");
        }
        tp.report("fuse", 100, 100, "");
        // the first report passes the throttle, the rest of the burst does not
        assert_eq!(count.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[test]
    fn test_options_defaults_from_json() {
        let options: ProcessOptions = serde_json::from_str(r#"{"root": "/takeout"}"#).unwrap();
        assert_eq!(options.retire_policy, RetirePolicy::RequireFusion);
        assert!(!options.dry_run);

        let options: ProcessOptions =
            serde_json::from_str(r#"{"root": "/t", "retire_policy": "lenient"}"#).unwrap();
        assert_eq!(options.retire_policy, RetirePolicy::Lenient);
    }

    #[test]
    fn test_variant_table_includes_extra_suffixes() {
        let mut options = ProcessOptions::new("/t");
        options.edited_suffixes = vec!["-editada".to_string()];
        let table = options.variant_table();
        assert_eq!(table.edited_suffixes.last().map(String::as_str), Some("-editada"));
    }
}
