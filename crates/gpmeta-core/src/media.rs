use std::path::Path;

/// Extensions whose files carry an embeddable EXIF block (lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &["arw", "gif", "png", "jpg", "jpeg", "raw"];

/// Extensions that only get filesystem timestamps (lowercase)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "mp"];

/// How a media file receives its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// EXIF block rewrite plus filesystem timestamps
    Image,
    /// Filesystem timestamps only
    Video,
    /// Motion-photo clip found next to a still; filesystem timestamps only
    MpCompanion,
}

impl MediaKind {
    /// Classify by extension (case-insensitive). Motion-photo companions are
    /// never returned here: they are only known from how they were found.
    pub fn classify(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::MpCompanion => "motion-photo companion",
        }
    }
}
