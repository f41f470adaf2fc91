//! Settings loading and startup validation.
//!
//! All runtime behavior is driven by a TOML settings file resolved in this
//! order:
//! 1. An explicitly provided path (`--config`)
//! 2. `./mediatidy.toml` in the current directory
//! 3. `~/.config/mediatidy/config.toml` in the home directory
//!
//! There is no built-in default configuration: the root directory and the
//! history/inventory file locations must come from the user, and a run never
//! starts without them.
//!
//! # Configuration File Format
//!
//! ```toml
//! root_dir = "/data/collections"
//! history_file = "/data/history.json"
//! inventory_file = "/data/collections.json"
//! premium_dir = "premium"
//! partial_download_extension = ".part"
//! threads = 8
//! dry_run = true
//!
//! [stages]
//! imports = true
//! premium_imports = true
//! loose_imports = true
//! renames = true
//! lowercase = true
//! remove_duplicate_extensions = true
//! sanitize_filenames = true
//! converts = true
//! image_converts = true
//! video_converts = true
//!
//! [detectors]
//! content_hash = true
//! fanhouse = true
//! fansly = true
//! gumroad = true
//! onlyfans = true
//! patreon = true
//! ppv = true
//!
//! [filetypes]
//! images = [".jpg", ".jpeg", ".png", ".bmp", ".tiff", ".webp", ".jfif"]
//! videos = [".mp4", ".mkv", ".mov", ".m4v", ".wmv", ".webm", ".gif", ".avi", ".ts", ".mpg", ".flv", ".mpeg"]
//! audio = [".mp3", ".wav", ".flac", ".m4a", ".aac", ".ogg"]
//! text = [".txt", ".doc", ".docx", ".pdf", ".rtf", ".xls", ".xlsx"]
//! goal_images = [".jpg", ".webp"]
//! goal_videos = [".mp4", ".webm", ".gif"]
//!
//! [protection]
//! models = ["curated collection"]
//! dirs = ["premium", "fix", "manual_review", "corrupted", "favorites", "sorted albums"]
//! ```

use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Errors that can occur during settings loading and validation.
///
/// Every variant is fatal: a run never starts with a broken configuration.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// No settings file was found at any of the lookup locations.
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    ConfigInvalid(String),
    /// Invalid glob pattern in the protected directory list.
    InvalidGlobPattern(String),
    /// A setting has a value that cannot work (bad root, empty goal list, ...).
    InvalidSetting(String),
    /// IO error while reading the settings file.
    IoError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ConfigNotFound(path) => {
                write!(f, "Settings file not found: {}", path.display())
            }
            ConfigError::ConfigInvalid(msg) => write!(f, "Invalid settings: {}", msg),
            ConfigError::InvalidGlobPattern(pattern) => {
                write!(f, "Invalid protected directory pattern '{}'", pattern)
            }
            ConfigError::InvalidSetting(msg) => write!(f, "Invalid setting: {}", msg),
            ConfigError::IoError(msg) => write!(f, "IO error reading settings: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Per-stage enable switches for the pipeline.
///
/// Everything defaults to on; switching a stage off skips it for every file
/// in the run without affecting the other stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageToggles {
    #[serde(default = "default_true")]
    pub imports: bool,
    #[serde(default = "default_true")]
    pub premium_imports: bool,
    #[serde(default = "default_true")]
    pub loose_imports: bool,
    #[serde(default = "default_true")]
    pub renames: bool,
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_true")]
    pub remove_duplicate_extensions: bool,
    #[serde(default = "default_true")]
    pub sanitize_filenames: bool,
    #[serde(default = "default_true")]
    pub converts: bool,
    #[serde(default = "default_true")]
    pub image_converts: bool,
    #[serde(default = "default_true")]
    pub video_converts: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            imports: true,
            premium_imports: true,
            loose_imports: true,
            renames: true,
            lowercase: true,
            remove_duplicate_extensions: true,
            sanitize_filenames: true,
            converts: true,
            image_converts: true,
            video_converts: true,
        }
    }
}

/// Per-detector enable switches for premium-source classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorToggles {
    /// 64-hex-character content-hash filenames.
    #[serde(default = "default_true")]
    pub content_hash: bool,
    #[serde(default = "default_true")]
    pub fanhouse: bool,
    #[serde(default = "default_true")]
    pub fansly: bool,
    #[serde(default = "default_true")]
    pub gumroad: bool,
    #[serde(default = "default_true")]
    pub onlyfans: bool,
    #[serde(default = "default_true")]
    pub patreon: bool,
    /// Pay-per-view phrase detection.
    #[serde(default = "default_true")]
    pub ppv: bool,
}

impl Default for DetectorToggles {
    fn default() -> Self {
        Self {
            content_hash: true,
            fanhouse: true,
            fansly: true,
            gumroad: true,
            onlyfans: true,
            patreon: true,
            ppv: true,
        }
    }
}

/// Recognized extensions per media category, plus the "goal" extensions a
/// conversion pass aims for.
///
/// Extensions are stored lower-cased with their leading dot so they can be
/// compared directly against a file entry's extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiletypeTable {
    #[serde(default = "default_image_extensions")]
    pub images: Vec<String>,
    #[serde(default = "default_video_extensions")]
    pub videos: Vec<String>,
    #[serde(default = "default_audio_extensions")]
    pub audio: Vec<String>,
    #[serde(default = "default_text_extensions")]
    pub text: Vec<String>,
    /// Image extensions that need no conversion.
    #[serde(default = "default_goal_images")]
    pub goal_images: Vec<String>,
    /// Video extensions that need no conversion.
    #[serde(default = "default_goal_videos")]
    pub goal_videos: Vec<String>,
}

impl Default for FiletypeTable {
    fn default() -> Self {
        Self {
            images: default_image_extensions(),
            videos: default_video_extensions(),
            audio: default_audio_extensions(),
            text: default_text_extensions(),
            goal_images: default_goal_images(),
            goal_videos: default_goal_videos(),
        }
    }
}

impl FiletypeTable {
    /// Returns true if `ext` (lower-cased, with dot) is a recognized image type.
    pub fn is_image(&self, ext: &str) -> bool {
        self.images.iter().any(|e| e == ext)
    }

    /// Returns true if `ext` (lower-cased, with dot) is a recognized video type.
    pub fn is_video(&self, ext: &str) -> bool {
        self.videos.iter().any(|e| e == ext)
    }

    /// Returns the typed subfolder name a loose file with this extension
    /// belongs in, or `None` when the extension is not recognized at all.
    pub fn subfolder_for(&self, ext: &str) -> Option<&'static str> {
        if self.is_image(ext) {
            Some("images")
        } else if self.is_video(ext) {
            Some("videos")
        } else if self.audio.iter().any(|e| e == ext) {
            Some("audio")
        } else if self.text.iter().any(|e| e == ext) {
            Some("text")
        } else {
            None
        }
    }

    /// All video and image extension tokens, in that order.
    ///
    /// These are the tokens the duplicate-extension heuristic searches for
    /// inside filename stems.
    pub fn media_tokens(&self) -> impl Iterator<Item = &str> {
        self.videos
            .iter()
            .chain(self.images.iter())
            .map(String::as_str)
    }

    fn lowercase_all(&mut self) {
        for list in [
            &mut self.images,
            &mut self.videos,
            &mut self.audio,
            &mut self.text,
            &mut self.goal_images,
            &mut self.goal_videos,
        ] {
            for ext in list.iter_mut() {
                *ext = ext.to_lowercase();
            }
        }
    }
}

/// Directories exempt from all automated mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtectionRules {
    /// Top-level model directories to leave completely alone, matched as a
    /// path prefix directly under the root.
    #[serde(default)]
    pub models: Vec<String>,

    /// Directory name patterns (glob, case-insensitive) ignored anywhere in
    /// the tree.
    #[serde(default = "default_protected_dirs")]
    pub dirs: Vec<String>,
}

/// Complete runtime settings for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// The media tree to reorganize. Every destination computed during a run
    /// stays underneath this directory.
    pub root_dir: PathBuf,
    /// Where the rename history JSON lives. A `.bak` sibling is kept next to it.
    pub history_file: PathBuf,
    /// Where the end-of-run inventory snapshot is written.
    pub inventory_file: PathBuf,

    /// Name of the per-model subdirectory premium content is moved into.
    #[serde(default = "default_premium_dir")]
    pub premium_dir: String,

    /// Marker extension of partially-downloaded files; these are skipped
    /// entirely.
    #[serde(default = "default_partial_marker")]
    pub partial_download_extension: String,

    /// Worker pool size for per-file processing.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// When true, print every planned action without touching the filesystem.
    #[serde(default = "default_true")]
    pub dry_run: bool,

    #[serde(default)]
    pub stages: StageToggles,
    #[serde(default)]
    pub detectors: DetectorToggles,
    #[serde(default)]
    pub filetypes: FiletypeTable,
    #[serde(default)]
    pub protection: ProtectionRules,
}

fn default_true() -> bool {
    true
}

fn default_premium_dir() -> String {
    "premium".to_string()
}

fn default_partial_marker() -> String {
    ".part".to_string()
}

fn default_threads() -> usize {
    8
}

fn default_image_extensions() -> Vec<String> {
    [".jpg", ".jpeg", ".png", ".bmp", ".tiff", ".webp", ".jfif"]
        .map(String::from)
        .to_vec()
}

fn default_video_extensions() -> Vec<String> {
    [
        ".mp4", ".mkv", ".mov", ".m4v", ".wmv", ".webm", ".gif", ".avi", ".ts", ".mpg", ".flv",
        ".mpeg",
    ]
    .map(String::from)
    .to_vec()
}

fn default_audio_extensions() -> Vec<String> {
    [".mp3", ".wav", ".flac", ".m4a", ".aac", ".ogg"]
        .map(String::from)
        .to_vec()
}

fn default_text_extensions() -> Vec<String> {
    [".txt", ".doc", ".docx", ".pdf", ".rtf", ".xls", ".xlsx"]
        .map(String::from)
        .to_vec()
}

fn default_goal_images() -> Vec<String> {
    [".jpg", ".webp"].map(String::from).to_vec()
}

fn default_goal_videos() -> Vec<String> {
    [".mp4", ".webm", ".gif"].map(String::from).to_vec()
}

fn default_protected_dirs() -> Vec<String> {
    [
        "premium",
        "fix",
        "manual_review",
        "corrupted",
        "favorites",
        "sorted albums",
    ]
    .map(String::from)
    .to_vec()
}

impl Settings {
    /// Load settings from a file, searching the standard locations.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` when no file exists at any
    /// lookup location, and parse/IO errors for a file that exists but
    /// cannot be used.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from("mediatidy.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("mediatidy")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Err(ConfigError::ConfigNotFound(local_config))
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut settings: Settings =
            toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        settings.normalize();
        Ok(settings)
    }

    /// Normalizes extension tables to lower case and makes sure the premium
    /// directory is part of the protected set, so content already imported is
    /// never reprocessed on the next run.
    pub fn normalize(&mut self) {
        self.filetypes.lowercase_all();
        self.partial_download_extension = self.partial_download_extension.to_lowercase();
        if !self
            .protection
            .dirs
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&self.premium_dir))
        {
            self.protection.dirs.push(self.premium_dir.clone());
        }
    }

    /// Validates settings before any traversal starts.
    ///
    /// # Errors
    ///
    /// Returns an error when the root is missing or not a directory, when a
    /// goal extension is not part of its own filetype list, when extension
    /// entries are malformed, or when the worker count is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root_dir.is_dir() {
            return Err(ConfigError::InvalidSetting(format!(
                "root_dir is not a directory: {}",
                self.root_dir.display()
            )));
        }

        if self.threads == 0 {
            return Err(ConfigError::InvalidSetting(
                "threads must be at least 1".to_string(),
            ));
        }

        for ext in self
            .filetypes
            .images
            .iter()
            .chain(self.filetypes.videos.iter())
            .chain(self.filetypes.audio.iter())
            .chain(self.filetypes.text.iter())
        {
            if !ext.starts_with('.') || ext.len() < 2 {
                return Err(ConfigError::InvalidSetting(format!(
                    "extension entries must start with a dot: '{}'",
                    ext
                )));
            }
        }

        for goal in &self.filetypes.goal_images {
            if !self.filetypes.is_image(goal) {
                return Err(ConfigError::InvalidSetting(format!(
                    "goal image extension '{}' is not in the images list",
                    goal
                )));
            }
        }
        for goal in &self.filetypes.goal_videos {
            if !self.filetypes.is_video(goal) {
                return Err(ConfigError::InvalidSetting(format!(
                    "goal video extension '{}' is not in the videos list",
                    goal
                )));
            }
        }

        if self.filetypes.goal_images.is_empty() || self.filetypes.goal_videos.is_empty() {
            return Err(ConfigError::InvalidSetting(
                "goal_images and goal_videos must not be empty".to_string(),
            ));
        }

        for output in [&self.history_file, &self.inventory_file] {
            if let Some(parent) = output.parent()
                && !parent.as_os_str().is_empty()
                && !parent.is_dir()
            {
                return Err(ConfigError::InvalidSetting(format!(
                    "parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        Ok(())
    }

    /// Compile the protection rules into matchers the traversal can apply per
    /// directory entry.
    ///
    /// # Errors
    ///
    /// Returns an error if any protected directory glob pattern is invalid.
    pub fn compile_exclusions(&self) -> Result<CompiledExclusions, ConfigError> {
        CompiledExclusions::new(self)
    }
}

/// Pre-compiled exclusion matchers for the traversal.
///
/// Name patterns are matched case-insensitively against each directory's own
/// name anywhere in the tree; protected models are matched as path prefixes
/// directly under the root.
pub struct CompiledExclusions {
    dir_patterns: Vec<Pattern>,
    model_prefixes: Vec<PathBuf>,
}

impl CompiledExclusions {
    fn new(settings: &Settings) -> Result<Self, ConfigError> {
        let dir_patterns = settings
            .protection
            .dirs
            .iter()
            .map(|pattern| {
                Pattern::new(&pattern.to_lowercase())
                    .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let model_prefixes = settings
            .protection
            .models
            .iter()
            .map(|model| settings.root_dir.join(model))
            .collect();

        Ok(Self {
            dir_patterns,
            model_prefixes,
        })
    }

    /// Returns true when a directory must not be descended into.
    pub fn is_excluded_dir(&self, dir: &Path) -> bool {
        if let Some(name) = dir.file_name() {
            let name = name.to_string_lossy().to_lowercase();
            if self.dir_patterns.iter().any(|p| p.matches(&name)) {
                return true;
            }
        }

        self.model_prefixes.iter().any(|m| dir.starts_with(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings(root: &Path) -> Settings {
        Settings {
            root_dir: root.to_path_buf(),
            history_file: root.join("history.json"),
            inventory_file: root.join("inventory.json"),
            premium_dir: default_premium_dir(),
            partial_download_extension: default_partial_marker(),
            threads: 2,
            dry_run: true,
            stages: StageToggles::default(),
            detectors: DetectorToggles::default(),
            filetypes: FiletypeTable::default(),
            protection: ProtectionRules {
                models: vec![],
                dirs: default_protected_dirs(),
            },
        }
    }

    #[test]
    fn test_parse_minimal_settings() {
        let toml_src = r#"
            root_dir = "/tmp"
            history_file = "/tmp/history.json"
            inventory_file = "/tmp/inventory.json"
        "#;
        let settings: Settings = toml::from_str(toml_src).expect("minimal settings should parse");
        assert!(settings.dry_run);
        assert_eq!(settings.threads, 8);
        assert_eq!(settings.premium_dir, "premium");
        assert!(settings.stages.imports);
        assert!(settings.detectors.ppv);
        assert!(settings.filetypes.is_image(".jpg"));
    }

    #[test]
    fn test_missing_required_key_is_an_error() {
        let toml_src = r#"
            history_file = "/tmp/history.json"
            inventory_file = "/tmp/inventory.json"
        "#;
        assert!(toml::from_str::<Settings>(toml_src).is_err());
    }

    #[test]
    fn test_normalize_lowercases_extensions_and_protects_premium_dir() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let mut settings = test_settings(tmp.path());
        settings.filetypes.images = vec![".JPG".to_string(), ".Png".to_string()];
        settings.protection.dirs = vec!["fix".to_string()];
        settings.normalize();
        assert_eq!(settings.filetypes.images, vec![".jpg", ".png"]);
        assert!(settings.protection.dirs.contains(&"premium".to_string()));
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let mut settings = test_settings(tmp.path());
        settings.root_dir = tmp.path().join("does-not-exist");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_goal_extension_outside_table() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let mut settings = test_settings(tmp.path());
        settings.filetypes.goal_images = vec![".tga".to_string()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let settings = test_settings(tmp.path());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_subfolder_for_known_and_unknown_extensions() {
        let table = FiletypeTable::default();
        assert_eq!(table.subfolder_for(".jpg"), Some("images"));
        assert_eq!(table.subfolder_for(".mp4"), Some("videos"));
        assert_eq!(table.subfolder_for(".mp3"), Some("audio"));
        assert_eq!(table.subfolder_for(".pdf"), Some("text"));
        assert_eq!(table.subfolder_for(".xyz"), None);
    }

    #[test]
    fn test_excluded_dir_by_name_pattern_case_insensitive() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let settings = test_settings(tmp.path());
        let exclusions = settings.compile_exclusions().expect("compile");

        assert!(exclusions.is_excluded_dir(&tmp.path().join("alice").join("premium")));
        assert!(exclusions.is_excluded_dir(&tmp.path().join("alice").join("Premium")));
        assert!(exclusions.is_excluded_dir(&tmp.path().join("bob").join("Sorted Albums")));
        assert!(!exclusions.is_excluded_dir(&tmp.path().join("alice").join("images")));
    }

    #[test]
    fn test_excluded_dir_by_model_prefix() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let mut settings = test_settings(tmp.path());
        settings.protection.models = vec!["curated".to_string()];
        let exclusions = settings.compile_exclusions().expect("compile");

        assert!(exclusions.is_excluded_dir(&tmp.path().join("curated")));
        assert!(exclusions.is_excluded_dir(&tmp.path().join("curated").join("nested")));
        assert!(!exclusions.is_excluded_dir(&tmp.path().join("curated-other")));
    }

    #[test]
    fn test_invalid_glob_pattern_is_an_error() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let mut settings = test_settings(tmp.path());
        settings.protection.dirs = vec!["[invalid".to_string()];
        assert!(settings.compile_exclusions().is_err());
    }
}
