//! Per-file processing pipeline and run orchestration.
//!
//! One traversal thread walks the tree and hands each file to a bounded
//! worker pool; workers run the stages in a fixed order, rebinding the
//! working path whenever a stage moves the file:
//!
//! 1. inventory record (always, whatever happens afterwards)
//! 2. pending-conversion bookkeeping and the conversion stage
//! 3. lowercase and duplicate-extension renames
//! 4. filename sanitization (skipped for protected social exports)
//! 5. premium / loose-file imports, driven by the classifier
//!
//! Every error below the configuration layer is contained to the file that
//! raised it; the run always continues with the next file.

use crate::classifier::{Category, Classifier, FileEntry};
use crate::config::{CompiledExclusions, Settings};
use crate::convert::{
    FfmpegImageCodec, FfmpegTranscoder, ImageCodec, PendingConversions, VideoTranscoder,
};
use crate::history::HistoryStore;
use crate::inventory::InventoryIndex;
use crate::output::OutputFormatter;
use crate::renamer::{RenameExecutor, RenameOutcome, RenamePlan, RenameReason};
use crate::resolver::{self, UniquePathAllocator};
use crate::sanitize;
use crate::walker::{WalkStats, Walker};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What one full run did, for the end-of-run summary.
#[derive(Debug)]
pub struct RunReport {
    pub stats: WalkStats,
    /// Executed actions, or would-be actions in dry-run mode.
    pub actions: usize,
    /// History records appended by this run.
    pub renames_recorded: usize,
    /// Files still waiting for image conversion.
    pub pending_images: Vec<PathBuf>,
    /// Files still waiting for video conversion.
    pub pending_videos: Vec<PathBuf>,
}

/// The shared per-run state and stage logic.
pub struct Pipeline {
    settings: Settings,
    exclusions: CompiledExclusions,
    classifier: Classifier,
    allocator: Arc<UniquePathAllocator>,
    history: Mutex<HistoryStore>,
    inventory: Mutex<InventoryIndex>,
    pending: PendingConversions,
    image_codec: Option<Box<dyn ImageCodec>>,
    video_transcoder: Option<Box<dyn VideoTranscoder>>,
    actions: AtomicUsize,
}

/// What applying one plan means for the working path.
enum Applied {
    /// The file now lives here.
    Moved(PathBuf),
    /// Stop processing this file: it is gone (resolved duplicate, vanished
    /// source) or hit an I/O error that makes further stages pointless.
    Halted,
    /// Nothing moved; keep working with the old path.
    Unchanged,
}

impl Pipeline {
    pub fn new(settings: Settings, exclusions: CompiledExclusions, history: HistoryStore) -> Self {
        let classifier = Classifier::new(
            &settings.root_dir,
            settings.filetypes.clone(),
            settings.detectors.clone(),
        );

        Self {
            settings,
            exclusions,
            classifier,
            allocator: Arc::new(UniquePathAllocator::new()),
            history: Mutex::new(history),
            inventory: Mutex::new(InventoryIndex::new()),
            pending: PendingConversions::new(),
            image_codec: None,
            video_transcoder: None,
            actions: AtomicUsize::new(0),
        }
    }

    /// Wires up the ffmpeg-backed converters for the configured goal
    /// formats.
    pub fn with_default_codecs(mut self) -> Self {
        let goal_image = self
            .settings
            .filetypes
            .goal_images
            .first()
            .cloned()
            .unwrap_or_else(|| ".jpg".to_string());
        self.image_codec = Some(Box::new(FfmpegImageCodec::new(
            &goal_image,
            self.allocator.clone(),
        )));
        self.video_transcoder = Some(Box::new(FfmpegTranscoder::new(self.allocator.clone())));
        self
    }

    /// Replaces the image codec (tests, alternative converters).
    pub fn with_image_codec(mut self, codec: Box<dyn ImageCodec>) -> Self {
        self.image_codec = Some(codec);
        self
    }

    /// Replaces the video transcoder (tests, alternative converters).
    pub fn with_video_transcoder(mut self, transcoder: Box<dyn VideoTranscoder>) -> Self {
        self.video_transcoder = Some(transcoder);
        self
    }

    /// Walks the tree, processes every file on the worker pool, then saves
    /// history and exports the inventory.
    pub fn run(&self) -> Result<RunReport, String> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.threads)
            .build()
            .map_err(|e| format!("Could not build worker pool: {}", e))?;

        let spinner = OutputFormatter::create_crawl_spinner(&self.settings.root_dir);

        let stats = pool.scope(|scope| {
            let walker = Walker::new(
                &self.settings.root_dir,
                &self.exclusions,
                &self.settings.partial_download_extension,
            );
            walker.run(|path| {
                spinner.inc(1);
                scope.spawn(move |_| self.process_file(path));
            })
        });

        spinner.finish_and_clear();

        if !self.settings.dry_run {
            if let Err(e) = self.history.lock().expect("history lock poisoned").save() {
                OutputFormatter::error(&format!("Could not save history: {}", e));
            }
        }

        if let Err(e) = self
            .inventory
            .lock()
            .expect("inventory lock poisoned")
            .export(&self.settings.inventory_file)
        {
            OutputFormatter::error(&format!("Could not export inventory: {}", e));
        }

        Ok(RunReport {
            stats,
            actions: self.actions.load(Ordering::Relaxed),
            renames_recorded: self
                .history
                .lock()
                .expect("history lock poisoned")
                .appended_this_run(),
            pending_images: self.pending.images(),
            pending_videos: self.pending.videos(),
        })
    }

    /// Runs the full stage sequence for one file.
    pub fn process_file(&self, path: PathBuf) {
        self.inventory
            .lock()
            .expect("inventory lock poisoned")
            .record(&self.settings.root_dir, &path);

        let mut path = path;

        self.queue_pending_conversion(&path);

        if self.settings.stages.converts {
            match self.conversion_stage(path) {
                Some(next) => path = next,
                None => return,
            }
        }

        if self.settings.stages.renames {
            match self.rename_stages(path) {
                Some(next) => path = next,
                None => return,
            }
        }

        if self.settings.stages.imports {
            self.import_stage(path);
        }
    }

    /// Queues files whose extension is recognized but not a goal format.
    fn queue_pending_conversion(&self, path: &Path) {
        let ext = crate::classifier::extension_of(path);
        let table = &self.settings.filetypes;

        if table.is_image(&ext) && !table.goal_images.contains(&ext) {
            self.pending.push_image(path);
        }
        if table.is_video(&ext) && !table.goal_videos.contains(&ext) {
            self.pending.push_video(path);
        }
    }

    /// Converts images and videos that are not in a goal format yet.
    ///
    /// Returns the (possibly moved) working path, or `None` when the file is
    /// gone.
    fn conversion_stage(&self, mut path: PathBuf) -> Option<PathBuf> {
        let table = &self.settings.filetypes;
        let ext = crate::classifier::extension_of(&path);

        if self.settings.stages.image_converts
            && table.is_image(&ext)
            && !table.goal_images.contains(&ext)
        {
            if ext == ".jpeg" {
                // An alias of the goal format: a plain rename, no codec.
                let plan = RenamePlan::new(
                    path.clone(),
                    path.with_extension("jpg"),
                    RenameReason::FormatConvert,
                );
                match self.apply_plan(plan) {
                    Applied::Moved(new_path) => {
                        self.pending.remove_image(&path);
                        path = new_path;
                    }
                    Applied::Halted => return None,
                    Applied::Unchanged => {}
                }
            } else if let Some(codec) = &self.image_codec {
                self.actions.fetch_add(1, Ordering::Relaxed);
                if self.settings.dry_run {
                    OutputFormatter::dry_run_notice(&format!(
                        "Would convert {}",
                        path.display()
                    ));
                } else {
                    match codec.convert(&path) {
                        Ok(new_path) => {
                            self.pending.remove_image(&path);
                            OutputFormatter::action(&path, &new_path);
                            path = new_path;
                        }
                        Err(e) => {
                            // Original preserved; stays queued for a future run.
                            OutputFormatter::error(&e.to_string());
                        }
                    }
                }
            }
        }

        let ext = crate::classifier::extension_of(&path);
        if self.settings.stages.video_converts
            && table.is_video(&ext)
            && !table.goal_videos.contains(&ext)
            && let Some(transcoder) = &self.video_transcoder
        {
            let target = table
                .goal_videos
                .first()
                .cloned()
                .unwrap_or_else(|| ".mp4".to_string());
            self.actions.fetch_add(1, Ordering::Relaxed);
            if self.settings.dry_run {
                OutputFormatter::dry_run_notice(&format!(
                    "Would convert {} to {}",
                    path.display(),
                    target
                ));
            } else {
                match transcoder.remux_or_transcode(&path, &target) {
                    Ok(new_path) => {
                        self.pending.remove_video(&path);
                        OutputFormatter::action(&path, &new_path);
                        path = new_path;
                    }
                    Err(e) => {
                        OutputFormatter::error(&e.to_string());
                    }
                }
            }
        }

        Some(path)
    }

    /// Lowercase, duplicate-extension, and sanitize renames.
    fn rename_stages(&self, mut path: PathBuf) -> Option<PathBuf> {
        if self.settings.stages.lowercase {
            let name = file_name_of(&path);
            if name != name.to_lowercase() {
                let plan = RenamePlan::new(
                    path.clone(),
                    path.with_file_name(name.to_lowercase()),
                    RenameReason::Lowercase,
                );
                match self.apply_plan(plan) {
                    Applied::Moved(new_path) => path = new_path,
                    Applied::Halted => return None,
                    Applied::Unchanged => {}
                }
            }
        }

        if self.settings.stages.remove_duplicate_extensions {
            let name = file_name_of(&path);
            if resolver::has_duplicate_extension(&name, &self.settings.filetypes) {
                let cleaned = resolver::strip_duplicate_extensions(&name, &self.settings.filetypes);
                if cleaned != name {
                    let plan = RenamePlan::new(
                        path.clone(),
                        path.with_file_name(cleaned),
                        RenameReason::DedupExtension,
                    );
                    match self.apply_plan(plan) {
                        Applied::Moved(new_path) => path = new_path,
                        Applied::Halted => return None,
                        Applied::Unchanged => {}
                    }
                }
            }
        }

        if self.settings.stages.sanitize_filenames && !self.is_protected(&path) {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let normalized = sanitize::normalize(&stem);
            if !normalized.is_empty() && normalized != stem {
                let ext = crate::classifier::extension_of(&path);
                let plan = RenamePlan::new(
                    path.clone(),
                    path.with_file_name(format!("{}{}", normalized, ext)),
                    RenameReason::SanitizeName,
                );
                match self.apply_plan(plan) {
                    Applied::Moved(new_path) => path = new_path,
                    Applied::Halted => return None,
                    Applied::Unchanged => {}
                }
            }
        }

        Some(path)
    }

    /// Premium and loose-file imports, driven by one classification of the
    /// file's current path.
    fn import_stage(&self, path: PathBuf) {
        let Ok(entry) = FileEntry::from_path(&path) else {
            // Nothing left to do for a file that vanished mid-pipeline.
            return;
        };

        match self.classifier.classify(&entry) {
            Category::PremiumSource if self.settings.stages.premium_imports => {
                let Some(model) = self.classifier.model_of(&path) else {
                    return;
                };
                let premium_dir = self
                    .settings
                    .root_dir
                    .join(&model)
                    .join(&self.settings.premium_dir);
                self.import_into(&path, &premium_dir, RenameReason::PremiumImport);
            }
            Category::LooseImport if self.settings.stages.loose_imports => {
                let Some(subfolder) = self.settings.filetypes.subfolder_for(&entry.extension)
                else {
                    return;
                };
                let Some(model) = self.classifier.model_of(&path) else {
                    return;
                };
                let subdir = self.settings.root_dir.join(&model).join(subfolder);
                self.import_into(&path, &subdir, RenameReason::LooseImport);
            }
            _ => {}
        }
    }

    /// Moves a file into a (possibly new) directory under its model.
    fn import_into(&self, path: &Path, directory: &Path, reason: RenameReason) {
        if !self.settings.dry_run
            && let Err(e) = fs::create_dir_all(directory)
        {
            OutputFormatter::error(&format!(
                "Could not create {}: {}",
                directory.display(),
                e
            ));
            return;
        }

        let destination = directory.join(file_name_of(path));
        let plan = RenamePlan::new(path.to_path_buf(), destination, reason);
        self.apply_plan(plan);
    }

    /// Social exports are exempt from sanitization and imports.
    fn is_protected(&self, path: &Path) -> bool {
        match FileEntry::from_path(path) {
            Ok(entry) => self.classifier.is_social_export(&entry),
            Err(_) => false,
        }
    }

    /// Prints and executes one plan (or just prints it in dry-run mode).
    fn apply_plan(&self, plan: RenamePlan) -> Applied {
        self.actions.fetch_add(1, Ordering::Relaxed);

        if self.settings.dry_run {
            OutputFormatter::would(plan.reason.verb(), &plan.source, &plan.destination);
            return Applied::Unchanged;
        }

        let executor = RenameExecutor::new(&self.allocator, &self.history);
        match executor.execute(&plan) {
            RenameOutcome::Succeeded { new_path } | RenameOutcome::RetriedTo { new_path } => {
                OutputFormatter::action(&plan.source, &new_path);
                Applied::Moved(new_path)
            }
            RenameOutcome::DuplicateResolved => {
                OutputFormatter::warning(&format!(
                    "Deleted duplicate file: {}",
                    plan.source.display()
                ));
                Applied::Halted
            }
            RenameOutcome::Failed(failure) => {
                OutputFormatter::error(&failure.to_string());
                Applied::Halted
            }
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use tempfile::TempDir;

    fn settings(root: &Path) -> Settings {
        let toml_src = r#"
            root_dir = "/placeholder"
            history_file = "/placeholder/history.json"
            inventory_file = "/placeholder/inventory.json"
            dry_run = false
            threads = 2
        "#;
        let mut settings: Settings = toml::from_str(toml_src).expect("settings");
        settings.root_dir = root.to_path_buf();
        settings.history_file = root.join("history.json");
        settings.inventory_file = root.join("inventory.json");
        settings.normalize();
        settings
    }

    fn pipeline(settings: Settings) -> Pipeline {
        let exclusions = settings.compile_exclusions().expect("exclusions");
        let history = HistoryStore::load(&settings.history_file).expect("history");
        Pipeline::new(settings, exclusions, history)
    }

    #[test]
    fn test_lowercase_stage_renames_mixed_case_file() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("alice/extras")).expect("mkdir");
        let file = tmp.path().join("alice/extras/Shoot Day.XYZ");
        fs::write(&file, b"x").expect("write");

        let p = pipeline(settings(tmp.path()));
        p.process_file(file.clone());

        assert!(!file.exists());
        assert!(tmp.path().join("alice/extras/shoot day.xyz").exists());
    }

    #[test]
    fn test_duplicate_extension_stage() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("alice/videos")).expect("mkdir");
        let file = tmp.path().join("alice/videos/clip.mp4.mp4");
        fs::write(&file, b"x").expect("write");

        let p = pipeline(settings(tmp.path()));
        p.process_file(file.clone());

        assert!(!file.exists());
        assert!(tmp.path().join("alice/videos/clip.mp4").exists());
    }

    #[test]
    fn test_loose_import_moves_into_typed_subfolder() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("alice")).expect("mkdir");
        let file = tmp.path().join("alice/track.mp3");
        fs::write(&file, b"x").expect("write");

        let p = pipeline(settings(tmp.path()));
        p.process_file(file.clone());

        assert!(!file.exists());
        assert!(tmp.path().join("alice/audio/track.mp3").exists());
    }

    #[test]
    fn test_premium_import_moves_into_premium_dir() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("alice/sets")).expect("mkdir");
        let file = tmp.path().join("alice/sets/fansly_pack_07.zip");
        fs::write(&file, b"x").expect("write");

        let p = pipeline(settings(tmp.path()));
        p.process_file(file.clone());

        assert!(!file.exists());
        assert!(tmp.path().join("alice/premium/fansly_pack_07.zip").exists());
    }

    #[test]
    fn test_protected_export_is_not_imported_or_sanitized() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("alice")).expect("mkdir");
        // Matches the premium platform detector and the social export
        // pattern; protection must win.
        let file = tmp.path().join("alice/onlyfans promo_n.jpg");
        fs::write(&file, b"x").expect("write");

        let p = pipeline(settings(tmp.path()));
        p.process_file(file.clone());

        assert!(file.exists(), "protected file must stay in place");
        assert!(!tmp.path().join("alice/premium").exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("alice")).expect("mkdir");
        let file = tmp.path().join("alice/Track.MP3");
        fs::write(&file, b"x").expect("write");

        let mut s = settings(tmp.path());
        s.dry_run = true;
        let p = pipeline(s);
        p.process_file(file.clone());

        assert!(file.exists());
        assert!(!tmp.path().join("alice/audio").exists());
        assert!(p.actions.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_jpeg_alias_is_renamed_without_codec() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("alice/images")).expect("mkdir");
        let file = tmp.path().join("alice/images/photo.jpeg");
        fs::write(&file, b"x").expect("write");

        let p = pipeline(settings(tmp.path()));
        p.process_file(file.clone());

        assert!(!file.exists());
        assert!(tmp.path().join("alice/images/photo.jpg").exists());
        assert!(p.pending.images().is_empty());
    }

    #[test]
    fn test_unconverted_image_stays_in_pending_list() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("alice/images")).expect("mkdir");
        let file = tmp.path().join("alice/images/photo.png");
        fs::write(&file, b"x").expect("write");

        // No codec wired up: the file is queued and reported, not touched.
        let p = pipeline(settings(tmp.path()));
        p.process_file(file.clone());

        assert!(file.exists());
        assert_eq!(p.pending.images(), vec![file]);
    }

    #[test]
    fn test_second_pass_is_a_fixed_point() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("alice")).expect("mkdir");
        fs::write(tmp.path().join("alice/Track.MP3"), b"x").expect("write");
        fs::write(tmp.path().join("alice/clip.mp4.mp4"), b"yy").expect("write");

        let p = pipeline(settings(tmp.path()));
        p.process_file(tmp.path().join("alice/Track.MP3"));
        p.process_file(tmp.path().join("alice/clip.mp4.mp4"));
        assert!(p.actions.load(Ordering::Relaxed) > 0);

        // Second pass over the settled tree plans nothing.
        let p2 = pipeline(settings(tmp.path()));
        p2.process_file(tmp.path().join("alice/audio/track.mp3"));
        p2.process_file(tmp.path().join("alice/videos/clip.mp4"));
        assert_eq!(p2.actions.load(Ordering::Relaxed), 0);
    }
}
