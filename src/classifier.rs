//! Action-category classification for visited files.
//!
//! Classification is a pure function of the file path and the configured
//! filetype table: the same path always yields the same category, and file
//! contents are never read. Each heuristic is a named predicate evaluated in
//! a fixed precedence order, so a file is assigned at most one category.
//!
//! The premium-source detectors are acknowledged guesses. Platform filename
//! conventions change, and a screenshot can legitimately carry a token that
//! looks like an export name; the detectors trade occasional false positives
//! for not having to inspect file contents.

use crate::config::{DetectorToggles, FiletypeTable};
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};

/// A snapshot of one file as read from the filesystem at visit time.
///
/// Entries are ephemeral: they are rebuilt from a fresh `stat` on every
/// visit and never cached across runs.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Final extension, lower-cased, with its leading dot. Empty when the
    /// file has no extension.
    pub extension: String,
    /// Size in bytes.
    pub size: u64,
    /// The directory containing the file.
    pub parent: PathBuf,
}

impl FileEntry {
    /// Builds an entry from a path, reading its metadata.
    ///
    /// # Errors
    ///
    /// Fails when the file vanished or its metadata cannot be read.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            extension: extension_of(path),
            size: metadata.len(),
            parent: path.parent().unwrap_or_else(|| Path::new("")).to_path_buf(),
        })
    }

    /// Filename without its final extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Full filename component.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Lower-cased, dotted extension of a path ("" when absent).
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// The action category assigned to a visited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Nothing to do for this file.
    None,
    /// Detected paid-platform content; belongs in the model's premium
    /// subdirectory.
    PremiumSource,
    /// A social-media export that must never be renamed or imported.
    SocialProtected,
    /// A recognized media file sitting directly in its model directory;
    /// belongs in a typed subfolder.
    LooseImport,
}

/// Extensions a social-media export can carry and still count as protected.
const PROTECTED_SUFFIXES: [&str; 3] = [".jpg", ".jpeg", ".mp4"];

/// Substrings of filename stems that identify a paid platform.
const PLATFORM_TAGS: [&str; 5] = ["fanhouse", "fansly", "gumroad", "onlyfans", "patreon"];

/// Classifies file paths into action categories.
///
/// All regexes are compiled once at construction; `classify` itself touches
/// neither the filesystem nor any mutable state.
pub struct Classifier {
    root: PathBuf,
    filetypes: FiletypeTable,
    toggles: DetectorToggles,
    social_export: Regex,
    content_hash: Regex,
    image_token: Regex,
    video_token: Regex,
    ppv_phrase: Regex,
}

impl Classifier {
    /// Builds a classifier for the given root and tables.
    pub fn new(root: &Path, filetypes: FiletypeTable, toggles: DetectorToggles) -> Self {
        Self {
            root: root.to_path_buf(),
            filetypes,
            toggles,
            social_export: Regex::new(
                r"(?:_n\.(?:jpe?g|mp4)|-img1\.(?:jpe?g|mp4)|-vid1\.mp4|_video_dashinit\.mp4)$",
            )
            .expect("invalid social export pattern"),
            content_hash: Regex::new(r"^[a-fA-F0-9]{64}$").expect("invalid content hash pattern"),
            image_token: Regex::new(r"\d+x\d+_[a-z0-9]{32}").expect("invalid image token pattern"),
            video_token: Regex::new(r"[a-z0-9]{21}(?:_source|_480p|_720p|_1080p)")
                .expect("invalid video token pattern"),
            ppv_phrase: Regex::new(r"pay[\s_-]*per[\s_-]*view").expect("invalid ppv pattern"),
        }
    }

    /// Assigns the entry its category.
    ///
    /// Precedence: protection first (it suppresses everything else), then the
    /// premium-source detectors, then the loose-file check. The first match
    /// wins.
    pub fn classify(&self, entry: &FileEntry) -> Category {
        if self.is_social_export(entry) {
            return Category::SocialProtected;
        }

        if self.is_premium_source(entry) {
            return Category::PremiumSource;
        }

        if self.is_loose_media_file(entry) {
            return Category::LooseImport;
        }

        Category::None
    }

    /// Social-media export detector: a known app-generated suffix pattern on
    /// the filename combined with one of the protected extensions.
    pub fn is_social_export(&self, entry: &FileEntry) -> bool {
        PROTECTED_SUFFIXES.contains(&entry.extension.as_str())
            && self.social_export.is_match(&entry.file_name())
    }

    /// Any enabled premium-source detector matches.
    pub fn is_premium_source(&self, entry: &FileEntry) -> bool {
        let stem = entry.stem();
        let stem_lower = stem.to_lowercase();

        (self.toggles.content_hash && self.is_content_hash_name(&stem))
            || self.has_platform_tag(&stem_lower)
            || (self.toggles.onlyfans && self.is_dimensioned_image_name(&stem, &entry.extension))
            || (self.toggles.onlyfans && self.is_tokened_video_name(&stem, &entry.extension))
            || (self.toggles.ppv && self.is_pay_per_view_name(&stem_lower))
    }

    /// Content-hash filename convention: the stem is exactly 64 hexadecimal
    /// characters and nothing else.
    pub fn is_content_hash_name(&self, stem: &str) -> bool {
        self.content_hash.is_match(stem)
    }

    /// A platform name appears anywhere in the lower-cased stem.
    pub fn has_platform_tag(&self, stem_lower: &str) -> bool {
        let enabled = [
            self.toggles.fanhouse,
            self.toggles.fansly,
            self.toggles.gumroad,
            self.toggles.onlyfans,
            self.toggles.patreon,
        ];

        PLATFORM_TAGS
            .iter()
            .zip(enabled)
            .any(|(tag, on)| on && stem_lower.contains(tag))
    }

    /// Image-export naming convention: a `WIDTHxHEIGHT_<32 hex>` token in the
    /// stem of a recognized image file.
    pub fn is_dimensioned_image_name(&self, stem: &str, extension: &str) -> bool {
        self.filetypes.is_image(extension) && self.image_token.is_match(stem)
    }

    /// Video-export naming convention: a 21-character alphanumeric id
    /// followed by a source or resolution tag, in the stem of a recognized
    /// video file.
    pub fn is_tokened_video_name(&self, stem: &str, extension: &str) -> bool {
        self.filetypes.is_video(extension) && self.video_token.is_match(stem)
    }

    /// Pay-per-view phrase with loose spacing and punctuation, or the short
    /// literal alias.
    pub fn is_pay_per_view_name(&self, stem_lower: &str) -> bool {
        stem_lower.contains("ppv") || self.ppv_phrase.is_match(stem_lower)
    }

    /// A recognized media file sitting directly in its model directory, i.e.
    /// not yet inside a typed subfolder.
    fn is_loose_media_file(&self, entry: &FileEntry) -> bool {
        if self.filetypes.subfolder_for(&entry.extension).is_none() {
            return false;
        }

        // Loose means the path is exactly root/<model>/<file>.
        match entry.path.strip_prefix(&self.root) {
            Ok(rel) => rel.components().count() == 2,
            Err(_) => false,
        }
    }

    /// The top-level model directory name owning this path, when there is one.
    pub fn model_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        if rel.components().count() < 2 {
            return None;
        }
        rel.components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorToggles, FiletypeTable};

    fn classifier(root: &str) -> Classifier {
        Classifier::new(
            Path::new(root),
            FiletypeTable::default(),
            DetectorToggles::default(),
        )
    }

    fn entry(path: &str) -> FileEntry {
        let path = PathBuf::from(path);
        FileEntry {
            extension: extension_of(&path),
            parent: path.parent().unwrap().to_path_buf(),
            size: 0,
            path,
        }
    }

    #[test]
    fn test_content_hash_stem_is_premium() {
        let c = classifier("/root");
        let hex = "a".repeat(64);
        let e = entry(&format!("/root/alice/sub/{hex}.mp4"));
        assert_eq!(c.classify(&e), Category::PremiumSource);
    }

    #[test]
    fn test_63_hex_chars_is_not_a_content_hash() {
        let c = classifier("/root");
        assert!(!c.is_content_hash_name(&"a".repeat(63)));
        assert!(!c.is_content_hash_name(&format!("{}g", "a".repeat(63))));
    }

    #[test]
    fn test_dimensioned_image_name_is_premium() {
        let c = classifier("/root");
        let e = entry("/root/alice/sub/1920x1080_0123456789abcdef0123456789abcdef.jpg");
        assert_eq!(c.classify(&e), Category::PremiumSource);
    }

    #[test]
    fn test_dimensioned_token_with_text_extension_is_not_premium() {
        let c = classifier("/root");
        let e = entry("/root/alice/sub/1920x1080_0123456789abcdef0123456789abcdef.txt");
        assert_ne!(c.classify(&e), Category::PremiumSource);
    }

    #[test]
    fn test_tokened_video_name_is_premium() {
        let c = classifier("/root");
        let e = entry("/root/alice/sub/abcdefghij0123456789x_source.mp4");
        assert_eq!(c.classify(&e), Category::PremiumSource);
        let e = entry("/root/alice/sub/abcdefghij0123456789x_720p.mkv");
        assert_eq!(c.classify(&e), Category::PremiumSource);
    }

    #[test]
    fn test_platform_tag_in_stem_is_premium() {
        let c = classifier("/root");
        for name in [
            "My Fansly Set 3.zip",
            "patreon_reward.png",
            "gumroad-bundle.rar",
        ] {
            let e = entry(&format!("/root/alice/sub/{name}"));
            assert_eq!(c.classify(&e), Category::PremiumSource, "{name}");
        }
    }

    #[test]
    fn test_ppv_phrase_variants() {
        let c = classifier("/root");
        assert!(c.is_pay_per_view_name("pay per view 04"));
        assert!(c.is_pay_per_view_name("pay_per_view"));
        assert!(c.is_pay_per_view_name("pay-per--view"));
        assert!(c.is_pay_per_view_name("payperview"));
        assert!(c.is_pay_per_view_name("new ppv drop"));
        assert!(!c.is_pay_per_view_name("paper view"));
    }

    #[test]
    fn test_social_export_suppresses_premium() {
        let c = classifier("/root");
        // Would match the platform detector, but the protected suffix
        // pattern takes precedence.
        let e = entry("/root/alice/sub/onlyfans_export_n.jpg");
        assert_eq!(c.classify(&e), Category::SocialProtected);
    }

    #[test]
    fn test_social_export_patterns() {
        let c = classifier("/root");
        for name in [
            "123456_n.jpg",
            "clip_n.mp4",
            "export-img1.jpeg",
            "story-vid1.mp4",
            "reel_video_dashinit.mp4",
        ] {
            let e = entry(&format!("/root/alice/{name}"));
            assert_eq!(c.classify(&e), Category::SocialProtected, "{name}");
        }
    }

    #[test]
    fn test_social_export_requires_protected_extension() {
        let c = classifier("/root");
        let e = entry("/root/alice/123456_n.png");
        assert_ne!(c.classify(&e), Category::SocialProtected);
    }

    #[test]
    fn test_loose_file_in_model_dir() {
        let c = classifier("/root");
        let e = entry("/root/alice/photo.png");
        assert_eq!(c.classify(&e), Category::LooseImport);
    }

    #[test]
    fn test_file_in_typed_subfolder_is_not_loose() {
        let c = classifier("/root");
        let e = entry("/root/alice/images/photo.png");
        assert_eq!(c.classify(&e), Category::None);
    }

    #[test]
    fn test_unknown_extension_is_not_loose() {
        let c = classifier("/root");
        let e = entry("/root/alice/notes.xyz");
        assert_eq!(c.classify(&e), Category::None);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let c = classifier("/root");
        let e = entry("/root/alice/fansly_promo.jpg");
        let first = c.classify(&e);
        for _ in 0..10 {
            assert_eq!(c.classify(&e), first);
        }
    }

    #[test]
    fn test_disabled_detectors_do_not_match() {
        let toggles = DetectorToggles {
            content_hash: false,
            fansly: false,
            ppv: false,
            ..DetectorToggles::default()
        };
        let c = Classifier::new(Path::new("/root"), FiletypeTable::default(), toggles);

        let hex = "a".repeat(64);
        let e = entry(&format!("/root/alice/sub/{hex}.mp4"));
        assert_ne!(c.classify(&e), Category::PremiumSource);

        let e = entry("/root/alice/sub/fansly_pack.zip");
        assert_ne!(c.classify(&e), Category::PremiumSource);

        let e = entry("/root/alice/sub/ppv_special.mp4");
        assert_ne!(c.classify(&e), Category::PremiumSource);
    }

    #[test]
    fn test_model_of() {
        let c = classifier("/root");
        assert_eq!(
            c.model_of(Path::new("/root/alice/photo.png")),
            Some("alice".to_string())
        );
        assert_eq!(
            c.model_of(Path::new("/root/alice/images/photo.png")),
            Some("alice".to_string())
        );
        assert_eq!(c.model_of(Path::new("/root/loose.png")), None);
        assert_eq!(c.model_of(Path::new("/elsewhere/alice/x.png")), None);
    }
}
