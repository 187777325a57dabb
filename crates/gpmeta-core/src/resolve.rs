use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::extras::VariantTable;
use crate::scan;

/// How a media file came to be claimed by a sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The declared name exists next to the sidecar
    Exact,
    /// Matched `<sidecar stem>*<declared ext>` after the declared name was not found
    Glob,
    /// Motion-photo companion probed from the sidecar path on the glob route
    Companion,
}

/// One `(sidecar, media)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub sidecar: PathBuf,
    pub media: PathBuf,
    pub claim: Claim,
}

/// Finds the media files a sidecar describes, and the derived files next to them.
pub struct Resolver<'a> {
    variants: &'a VariantTable,
}

impl<'a> Resolver<'a> {
    pub fn new(variants: &'a VariantTable) -> Self {
        Self { variants }
    }

    /// Associations for one sidecar, in fusion order. Empty if nothing matched.
    ///
    /// An existing file under the declared name short-circuits everything else.
    /// Otherwise every glob match is claimed, followed by the motion-photo
    /// companion of the sidecar itself.
    pub fn resolve(&self, sidecar: &Path, declared_name: &str) -> Vec<Association> {
        let pair = |media: PathBuf, claim| Association {
            sidecar: sidecar.to_path_buf(),
            media,
            claim,
        };

        if let Some(candidate) = exact_candidate(sidecar, declared_name) {
            if candidate.is_file() {
                return vec![pair(candidate, Claim::Exact)];
            }
        }

        let matches = glob_matches(sidecar, declared_name);
        if matches.is_empty() {
            return Vec::new();
        }
        debug!(
            sidecar = %sidecar.display(),
            count = matches.len(),
            "declared name missing, matched by stem"
        );

        let companion = self.mp_companion(sidecar);
        matches
            .into_iter()
            .map(|m| pair(m, Claim::Glob))
            .chain(companion.map(|c| pair(c, Claim::Companion)))
            .collect()
    }

    /// First existing motion-photo companion of `media`, in table order.
    pub fn mp_companion(&self, media: &Path) -> Option<PathBuf> {
        self.variants
            .mp_companion_candidates(media)
            .into_iter()
            .find(|candidate| candidate.is_file())
    }

    /// Existing edited variants of `media`, in table order.
    pub fn edited_variants(&self, media: &Path) -> Vec<PathBuf> {
        self.variants
            .edited_candidates(media)
            .into_iter()
            .filter(|candidate| candidate.is_file())
            .collect()
    }
}

/// `sidecar`'s sibling named after the declared file name. Only the final
/// component of the declared name is used so a title can never point outside
/// the sidecar's directory.
fn exact_candidate(sidecar: &Path, declared_name: &str) -> Option<PathBuf> {
    let name = Path::new(declared_name).file_name()?;
    Some(parent_dir(sidecar).join(name))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Files in the sidecar's directory matching `<sidecar stem>*<declared ext>`,
/// sorted. Names are compared NFC-normalized; the extension case-insensitively.
/// Sidecars never match.
fn glob_matches(sidecar: &Path, declared_name: &str) -> Vec<PathBuf> {
    let Some(stem) = sidecar.file_stem().and_then(|s| s.to_str()) else {
        return Vec::new();
    };
    let prefix: String = stem.nfc().collect();
    let suffix = Path::new(declared_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();

    let Ok(entries) = fs::read_dir(parent_dir(sidecar)) else {
        return Vec::new();
    };

    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().map_or(false, |t| t.is_file()))
        .map(|entry| entry.path())
        .filter(|path| !scan::is_sidecar(path))
        .filter(|path| {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            let name: String = name.nfc().collect();
            match name.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.to_lowercase().ends_with(&suffix),
                None => false,
            }
        })
        .collect();
    matches.sort();
    matches
}
