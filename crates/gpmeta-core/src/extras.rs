use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

/// Localized "edited" suffixes probed next to a fused image
pub const EDITED_SUFFIXES: &[&str] = &[
    "-edited",     // EN
    "-bearbeitet", // DE
];

/// Motion-photo companion name endings, appended to the stem, in priority order.
/// Export pipeline versions disagree on the naming.
pub const MP_COMPANION_ENDINGS: &[&str] = &[
    "",       // no extension
    ".MP4",
    ".MP",
    "_PX.MP",
    "PX.MP",
];

/// Ordered derived-file naming rules handed to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantTable {
    pub edited_suffixes: Vec<String>,
    pub mp_companion_endings: Vec<String>,
}

impl Default for VariantTable {
    fn default() -> Self {
        Self {
            edited_suffixes: EDITED_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            mp_companion_endings: MP_COMPANION_ENDINGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl VariantTable {
    /// Append extra edited suffixes (e.g. other locales), NFC-normalized, keeping order
    /// and skipping ones already present.
    pub fn with_edited_suffixes<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for suffix in extra {
            let suffix: String = suffix.as_ref().nfc().collect();
            if !suffix.is_empty() && !self.edited_suffixes.contains(&suffix) {
                self.edited_suffixes.push(suffix);
            }
        }
        self
    }

    /// `<stem><suffix><ext>` next to `media`, one per edited suffix.
    pub fn edited_candidates(&self, media: &Path) -> Vec<PathBuf> {
        let Some((dir, stem)) = split_stem(media) else {
            return Vec::new();
        };
        let ext = media
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        self.edited_suffixes
            .iter()
            .map(|suffix| dir.join(format!("{}{}{}", stem, suffix, ext)))
            .collect()
    }

    /// Motion-photo companion candidates next to `media`, in priority order.
    ///
    /// Endings that start with `.` replace whatever extension is left on the
    /// stem, so a sidecar `PXL_1.jpg.json` probes `PXL_1.MP4`. Other endings
    /// are appended to the stem as is.
    pub fn mp_companion_candidates(&self, media: &Path) -> Vec<PathBuf> {
        let Some((dir, stem)) = split_stem(media) else {
            return Vec::new();
        };
        self.mp_companion_endings
            .iter()
            .map(|ending| match ending.strip_prefix('.') {
                Some(ext) => dir.join(stem).with_extension(ext),
                None => dir.join(format!("{}{}", stem, ending)),
            })
            .filter(|candidate| candidate != media)
            .collect()
    }
}

fn split_stem(path: &Path) -> Option<(&Path, &str)> {
    let stem = path.file_stem()?.to_str()?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    Some((dir, stem))
}
