//! Audio normalization via an external ffmpeg process.
//!
//! Whatever the capture surface produced is transcoded to the canonical
//! recognizer format (mono WAV at the configured rate). The transcode runs in
//! a scoped temporary directory that is deleted on every exit path — success,
//! error, or cancellation — via the [`NormalizedAudio`] guard's Drop.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

use clarion_core::config::AudioConfig;
use clarion_core::error::{PipelineError, Result};
use clarion_core::types::{AudioClip, AudioFormat};

use crate::sniff::sniff_container;
use crate::wav::parse_wav;

/// Normalization seam. The production implementation shells out to ffmpeg;
/// tests substitute mocks.
#[async_trait]
pub trait Normalize: Send + Sync {
    async fn normalize(&self, clip: &AudioClip) -> Result<NormalizedAudio>;
}

/// Canonical-format audio backed by a scoped temp directory.
///
/// The directory (and the WAV inside it) lives exactly as long as this value:
/// the owning turn drops it on completion, failure, or cancellation.
pub struct NormalizedAudio {
    clip: AudioClip,
    wav_path: PathBuf,
    _scratch: TempDir,
}

impl NormalizedAudio {
    pub fn new(clip: AudioClip, wav_path: PathBuf, scratch: TempDir) -> Self {
        Self {
            clip,
            wav_path,
            _scratch: scratch,
        }
    }

    pub fn clip(&self) -> &AudioClip {
        &self.clip
    }

    /// On-disk location of the normalized WAV, valid until drop.
    pub fn path(&self) -> &Path {
        &self.wav_path
    }
}

impl std::fmt::Debug for NormalizedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedAudio")
            .field("bytes", &self.clip.len())
            .field("wav_path", &self.wav_path)
            .finish()
    }
}

/// ffmpeg-backed [`Normalize`] implementation.
pub struct FfmpegNormalizer {
    ffmpeg_path: String,
    sample_rate_hz: u32,
    timeout: Duration,
    scratch_root: PathBuf,
}

impl FfmpegNormalizer {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path().to_string(),
            sample_rate_hz: config.sample_rate_hz(),
            timeout: config.transcode_timeout(),
            scratch_root: config.scratch_dir(),
        }
    }
}

#[async_trait]
impl Normalize for FfmpegNormalizer {
    async fn normalize(&self, clip: &AudioClip) -> Result<NormalizedAudio> {
        // The payload's magic bytes are authoritative; capture widgets lie
        // about MIME types.
        let container = sniff_container(&clip.data).ok_or_else(|| {
            PipelineError::UnsupportedFormat(format!(
                "unrecognized container (declared {})",
                clip.format.container.extension()
            ))
        })?;

        let scratch = TempDir::new_in(&self.scratch_root).map_err(PipelineError::Io)?;
        let input_path = scratch
            .path()
            .join(format!("input.{}", container.extension()));
        let output_path = scratch.path().join("normalized.wav");

        tokio::fs::write(&input_path, &clip.data)
            .await
            .map_err(PipelineError::Io)?;

        debug!(
            container = container.extension(),
            bytes = clip.data.len(),
            rate = self.sample_rate_hz,
            "Transcoding input audio"
        );

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-i")
            .arg(&input_path)
            .arg("-ar")
            .arg(self.sample_rate_hz.to_string())
            .arg("-ac")
            .arg("1")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(PipelineError::Transcode(format!(
                    "failed to run {}: {e}",
                    self.ffmpeg_path
                )));
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Transcode timed out");
                return Err(PipelineError::Transcode(format!(
                    "{} timed out after {}ms",
                    self.ffmpeg_path,
                    self.timeout.as_millis()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(PipelineError::Transcode(format!(
                "{} exited with {}: {tail}",
                self.ffmpeg_path, output.status
            )));
        }

        let data = tokio::fs::read(&output_path)
            .await
            .map_err(PipelineError::Io)?;

        let duration_ms = parse_wav(&data).map(|info| info.duration_ms());
        let format = AudioFormat {
            duration_ms,
            ..AudioFormat::canonical(self.sample_rate_hz)
        };

        debug!(bytes = data.len(), ?duration_ms, "Transcode complete");

        Ok(NormalizedAudio::new(
            AudioClip::new(data, format),
            output_path,
            scratch,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::pcm_to_wav;
    use clarion_core::types::AudioContainer;

    fn normalizer_with(scratch: &Path, ffmpeg: &str) -> FfmpegNormalizer {
        let config = AudioConfig {
            ffmpeg_path: Some(ffmpeg.into()),
            scratch_dir: Some(scratch.to_string_lossy().into_owned()),
            ..Default::default()
        };
        FfmpegNormalizer::new(&config)
    }

    fn wav_input() -> AudioClip {
        let data = pcm_to_wav(&vec![100i16; 8000], 44_100, 2, 16);
        AudioClip::new(
            data,
            AudioFormat {
                container: AudioContainer::Wav,
                sample_rate_hz: Some(44_100),
                channels: Some(2),
                duration_ms: None,
            },
        )
    }

    #[tokio::test]
    async fn test_unknown_container_rejected_without_spawning() {
        let root = tempfile::tempdir().unwrap();
        // A binary that cannot exist; reaching it would fail differently.
        let normalizer = normalizer_with(root.path(), "/nonexistent/ffmpeg");

        let clip = AudioClip::new(
            b"this is not audio data, whatever the label says".to_vec(),
            AudioFormat::canonical(16_000),
        );
        let err = normalizer.normalize(&clip).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));

        // Nothing was written: detection failed before scratch setup.
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_transcoder_is_transcode_error_and_scratch_cleaned() {
        let root = tempfile::tempdir().unwrap();
        let normalizer = normalizer_with(root.path(), "/nonexistent/ffmpeg");

        let err = normalizer.normalize(&wav_input()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transcode(_)));

        // The scoped scratch dir was deleted on the error path.
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failing_transcoder_reports_exit_status() {
        let root = tempfile::tempdir().unwrap();
        // `false` accepts any args and exits 1 without writing output.
        let normalizer = normalizer_with(root.path(), "false");

        let err = normalizer.normalize(&wav_input()).await.unwrap_err();
        match err {
            PipelineError::Transcode(msg) => assert!(msg.contains("exited with")),
            other => panic!("expected Transcode, got {other:?}"),
        }
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_format_is_canonical_mono_16k() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();

        // Stub transcoder: copies a canonical fixture to the output path
        // (the final argument), standing in for ffmpeg.
        let fixture = root.path().join("fixture.wav");
        std::fs::write(&fixture, pcm_to_wav(&vec![7i16; 16_000], 16_000, 1, 16)).unwrap();

        let stub = root.path().join("transcode.sh");
        std::fs::write(
            &stub,
            format!("#!/bin/sh\nfor last; do :; done\ncp '{}' \"$last\"\n", fixture.display()),
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let scratch_root = tempfile::tempdir().unwrap();
        let normalizer = normalizer_with(scratch_root.path(), &stub.to_string_lossy());

        // A high-rate stereo capture comes out declared 16kHz mono.
        let normalized = normalizer.normalize(&wav_input()).await.unwrap();
        assert!(normalized.clip().format.is_canonical(16_000));
        assert_eq!(normalized.clip().format.duration_ms, Some(1000));
        assert!(normalized.path().exists());

        drop(normalized);
        assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_normalized_audio_drop_deletes_file() {
        let scratch = tempfile::tempdir().unwrap();
        let wav_path = scratch.path().join("normalized.wav");
        std::fs::write(&wav_path, b"RIFF0000WAVE").unwrap();

        let normalized = NormalizedAudio::new(
            AudioClip::new(vec![0u8; 16], AudioFormat::canonical(16_000)),
            wav_path.clone(),
            scratch,
        );
        assert!(wav_path.exists());
        drop(normalized);
        assert!(!wav_path.exists());
    }
}
