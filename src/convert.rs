//! Media conversion seams and the ffmpeg-backed implementations.
//!
//! The pipeline never talks to a codec binary directly; it goes through the
//! [`ImageCodec`] and [`VideoTranscoder`] traits so the conversion machinery
//! can be swapped out (or mocked in tests). Both shipped implementations
//! shell out to `ffmpeg` and share the same contract: the source file is
//! deleted only after the output has been verified, and a partial output is
//! removed on any failure, so a botched conversion never loses the original.

use crate::resolver::UniquePathAllocator;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

/// Errors raised by a conversion attempt. The original file survives all of
/// them.
#[derive(Debug)]
pub enum ConvertError {
    /// The codec process failed or produced undecodable output.
    CodecFailed { path: PathBuf, detail: String },
    /// The codec reported success but the output is missing or empty.
    EmptyOutput { path: PathBuf },
    /// The input is not a format this converter handles.
    UnsupportedInput { path: PathBuf },
    /// Failed to launch the codec or touch the filesystem.
    Io { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for ConvertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CodecFailed { path, detail } => {
                write!(f, "Conversion of {} failed: {}", path.display(), detail)
            }
            Self::EmptyOutput { path } => {
                write!(f, "Conversion produced no output for {}", path.display())
            }
            Self::UnsupportedInput { path } => {
                write!(f, "Unsupported conversion input: {}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Conversion IO error for {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConvertError {}

/// Converts a single image into the goal format.
pub trait ImageCodec: Send + Sync {
    /// Decodes the image, flattens transparency, re-encodes at maximum
    /// quality, and returns the new path. Deletes the source only after the
    /// output was verified non-empty.
    fn convert(&self, path: &Path) -> Result<PathBuf, ConvertError>;
}

/// Converts a single video into the goal container.
pub trait VideoTranscoder: Send + Sync {
    /// Tries a lossless container copy first and falls back to re-encoding.
    /// The output container is probed before the source is deleted.
    fn remux_or_transcode(&self, path: &Path, target: &str) -> Result<PathBuf, ConvertError>;
}

/// Image conversion by shelling out to ffmpeg.
pub struct FfmpegImageCodec {
    binary: String,
    goal_extension: String,
    allocator: Arc<UniquePathAllocator>,
}

impl FfmpegImageCodec {
    /// `goal_extension` is dotted and lower-cased, e.g. `".jpg"`.
    pub fn new(goal_extension: &str, allocator: Arc<UniquePathAllocator>) -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            goal_extension: goal_extension.to_string(),
            allocator,
        }
    }
}

impl ImageCodec for FfmpegImageCodec {
    fn convert(&self, path: &Path) -> Result<PathBuf, ConvertError> {
        let output =
            self.allocator
                .unique_path(&path.with_extension(self.goal_extension.trim_start_matches('.')));

        // format=rgb24 drops the alpha channel the goal format cannot carry;
        // -q:v 1 is ffmpeg's highest JPEG quality.
        let status = Command::new(&self.binary)
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(path)
            .arg("-vf")
            .arg("format=rgb24")
            .arg("-q:v")
            .arg("1")
            .arg(&output)
            .status()
            .map_err(|e| ConvertError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        if !status.success() {
            remove_partial(&output);
            return Err(ConvertError::CodecFailed {
                path: path.to_path_buf(),
                detail: format!("ffmpeg exited with {}", status),
            });
        }

        verify_non_empty(&output)?;

        fs::remove_file(path).map_err(|e| ConvertError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(output)
    }
}

/// Video conversion by shelling out to ffmpeg, validating with ffprobe.
pub struct FfmpegTranscoder {
    binary: String,
    probe_binary: String,
    allocator: Arc<UniquePathAllocator>,
}

impl FfmpegTranscoder {
    pub fn new(allocator: Arc<UniquePathAllocator>) -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            probe_binary: "ffprobe".to_string(),
            allocator,
        }
    }

    fn run_ffmpeg(&self, input: &Path, output: &Path, copy_streams: bool) -> io::Result<bool> {
        let mut command = Command::new(&self.binary);
        command
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input);
        if copy_streams {
            command.arg("-c").arg("copy");
        }
        Ok(command.arg(output).status()?.success())
    }

    /// Asks ffprobe for the container format names of the output and checks
    /// the target is among them.
    fn probe_container(&self, output: &Path, target: &str) -> Result<(), ConvertError> {
        let probe = Command::new(&self.probe_binary)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=format_name")
            .arg("-of")
            .arg("csv=p=0")
            .arg(output)
            .output()
            .map_err(|e| ConvertError::Io {
                path: output.to_path_buf(),
                source: e,
            })?;

        let formats = String::from_utf8_lossy(&probe.stdout);
        if probe.status.success() && formats.split(',').any(|f| f.trim() == target) {
            Ok(())
        } else {
            Err(ConvertError::CodecFailed {
                path: output.to_path_buf(),
                detail: format!("output container is not {}", target),
            })
        }
    }
}

impl VideoTranscoder for FfmpegTranscoder {
    fn remux_or_transcode(&self, path: &Path, target: &str) -> Result<PathBuf, ConvertError> {
        let target = target.trim_start_matches('.');
        let output = self.allocator.unique_path(&path.with_extension(target));

        // Lossless container copy first; re-encode only when the streams do
        // not fit the target container.
        let copied = self
            .run_ffmpeg(path, &output, true)
            .map_err(|e| ConvertError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        if !copied {
            remove_partial(&output);
            let encoded = self
                .run_ffmpeg(path, &output, false)
                .map_err(|e| ConvertError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            if !encoded {
                remove_partial(&output);
                return Err(ConvertError::CodecFailed {
                    path: path.to_path_buf(),
                    detail: "ffmpeg failed to remux and to re-encode".to_string(),
                });
            }
        }

        verify_non_empty(&output)?;
        if let Err(e) = self.probe_container(&output, target) {
            remove_partial(&output);
            return Err(e);
        }

        fs::remove_file(path).map_err(|e| ConvertError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(output)
    }
}

fn verify_non_empty(output: &Path) -> Result<(), ConvertError> {
    match fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => {
            remove_partial(output);
            Err(ConvertError::EmptyOutput {
                path: output.to_path_buf(),
            })
        }
    }
}

fn remove_partial(output: &Path) {
    if output.is_file() {
        let _ = fs::remove_file(output);
    }
}

/// Files that still need conversion, collected during the run and reported
/// at the end. Shared across workers behind a lock.
#[derive(Debug, Default)]
pub struct PendingConversions {
    images: Mutex<Vec<PathBuf>>,
    videos: Mutex<Vec<PathBuf>>,
}

impl PendingConversions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_image(&self, path: &Path) {
        self.images
            .lock()
            .expect("pending list lock poisoned")
            .push(path.to_path_buf());
    }

    pub fn push_video(&self, path: &Path) {
        self.videos
            .lock()
            .expect("pending list lock poisoned")
            .push(path.to_path_buf());
    }

    /// Drops a file from the image list once it was converted.
    pub fn remove_image(&self, path: &Path) {
        self.images
            .lock()
            .expect("pending list lock poisoned")
            .retain(|p| p != path);
    }

    /// Drops a file from the video list once it was converted.
    pub fn remove_video(&self, path: &Path) {
        self.videos
            .lock()
            .expect("pending list lock poisoned")
            .retain(|p| p != path);
    }

    /// Remaining images, in insertion order.
    pub fn images(&self) -> Vec<PathBuf> {
        self.images
            .lock()
            .expect("pending list lock poisoned")
            .clone()
    }

    /// Remaining videos, in insertion order.
    pub fn videos(&self) -> Vec<PathBuf> {
        self.videos
            .lock()
            .expect("pending list lock poisoned")
            .clone()
    }
}
