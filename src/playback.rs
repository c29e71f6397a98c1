//! Temp-file staging and playback of synthesized replies.
//!
//! `TempWorkspace` is the per-process directory; `PlaybackManager` writes one
//! reply into it, plays it and removes it again whatever happened in between.

use crate::backend::AudioFormat;
use crate::{log_debug, log_timing};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const PLAYBACK_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to stage audio at {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("playback interrupted")]
    Interrupted,
}

/// Encoding of a staged file, as the player needs to know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub format: AudioFormat,
    /// Only consulted for headerless PCM.
    pub sample_rate: u32,
}

/// Plays an audio file to completion, or until `interrupt` is raised.
pub trait AudioPlayer: Send + Sync {
    fn play(
        &self,
        path: &Path,
        spec: AudioSpec,
        interrupt: &AtomicBool,
    ) -> Result<(), PlaybackError>;
}

/// How rodio gets samples out of a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Container with a header rodio's decoder recognizes on its own.
    Decoder,
    /// Mono s16le samples wrapped in a `SamplesBuffer`.
    RawPcm,
}

fn route(format: AudioFormat) -> Option<Route> {
    match format {
        AudioFormat::Mp3 | AudioFormat::Wav => Some(Route::Decoder),
        AudioFormat::Pcm => Some(Route::RawPcm),
        AudioFormat::Opus => None,
    }
}

fn pcm_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32_768.0)
        .collect()
}

/// Default output device via rodio.
#[derive(Debug, Clone, Copy, Default)]
pub struct RodioPlayer;

impl RodioPlayer {
    /// Whether replies in `format` can be played at all.
    pub fn supports(format: AudioFormat) -> bool {
        route(format).is_some()
    }
}

impl AudioPlayer for RodioPlayer {
    fn play(
        &self,
        path: &Path,
        spec: AudioSpec,
        interrupt: &AtomicBool,
    ) -> Result<(), PlaybackError> {
        let route = route(spec.format).ok_or_else(|| {
            PlaybackError::Decode(format!("no decoder for {} audio", spec.format.label()))
        })?;
        let mut stream = rodio::OutputStreamBuilder::from_default_device()
            .and_then(|builder| builder.open_stream())
            .map_err(|err| PlaybackError::Output(err.to_string()))?;
        stream.log_on_drop(false);
        let sink = match route {
            Route::Decoder => {
                let file = File::open(path).map_err(|err| PlaybackError::Decode(err.to_string()))?;
                rodio::play(stream.mixer(), BufReader::new(file))
                    .map_err(|err| PlaybackError::Decode(err.to_string()))?
            }
            Route::RawPcm => {
                let bytes = fs::read(path).map_err(|err| PlaybackError::Decode(err.to_string()))?;
                let sink = rodio::Sink::connect_new(stream.mixer());
                sink.append(rodio::buffer::SamplesBuffer::new(
                    1,
                    spec.sample_rate,
                    pcm_samples(&bytes),
                ));
                sink
            }
        };
        while !sink.empty() {
            if interrupt.load(Ordering::Acquire) {
                sink.stop();
                return Err(PlaybackError::Interrupted);
            }
            thread::sleep(PLAYBACK_POLL);
        }
        Ok(())
    }
}

/// Process-scoped scratch directory, `<root>/walkie-<pid>`.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: PathBuf,
    removed: bool,
}

impl TempWorkspace {
    /// Create the directory under `root`, or the system temp dir.
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let root = root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        let dir = root.join(format!("walkie-{}", process::id()));
        fs::create_dir_all(&dir)?;
        log_debug(&format!("temp workspace at {}", dir.display()));
        Ok(Self {
            dir,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Remove the directory and everything left in it. Idempotent.
    pub fn cleanup(&mut self) -> io::Result<()> {
        if self.removed {
            return Ok(());
        }
        self.removed = true;
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if let Err(err) = self.cleanup() {
            log_debug(&format!(
                "failed to remove temp workspace {}: {err}",
                self.dir.display()
            ));
        }
    }
}

/// A staged reply on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempAudioArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Deletes the artifact when dropped, so panics and early returns clean up too.
struct ArtifactGuard {
    artifact: Option<TempAudioArtifact>,
}

impl ArtifactGuard {
    fn release(&mut self) {
        let Some(artifact) = self.artifact.take() else {
            return;
        };
        match fs::remove_file(&artifact.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                log_debug(&format!(
                    "failed to delete {}: {err}",
                    artifact.path.display()
                ));
                tracing::warn!(
                    path = %artifact.path.display(),
                    error = %err,
                    "temp audio cleanup failed"
                );
            }
        }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stages and plays one reply at a time.
pub struct PlaybackManager {
    dir: PathBuf,
    player: Arc<dyn AudioPlayer>,
    next_id: u64,
}

impl PlaybackManager {
    pub fn new(workspace: &TempWorkspace, player: Arc<dyn AudioPlayer>) -> Self {
        Self {
            dir: workspace.path().to_path_buf(),
            player,
            next_id: 1,
        }
    }

    /// Write `bytes` to a fresh artifact, play it and delete it. The file is
    /// gone when this returns, on success and on every error.
    pub fn play(
        &mut self,
        bytes: &[u8],
        spec: AudioSpec,
        interrupt: &AtomicBool,
    ) -> Result<TempAudioArtifact, PlaybackError> {
        let format = spec.format;
        let path = self
            .dir
            .join(format!("reply-{}.{}", self.next_id, format.extension()));
        self.next_id += 1;
        let artifact = TempAudioArtifact {
            path: path.clone(),
            size_bytes: bytes.len() as u64,
        };
        let mut guard = ArtifactGuard {
            artifact: Some(artifact.clone()),
        };
        fs::write(&path, bytes).map_err(|source| PlaybackError::Stage {
            path: path.clone(),
            source,
        })?;
        log_debug(&format!(
            "staged {} bytes of {} at {}",
            bytes.len(),
            format.label(),
            path.display()
        ));

        let started = Instant::now();
        let played = self.player.play(&path, spec, interrupt);
        log_timing("playback", started.elapsed());
        guard.release();
        played?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlayer, PlayerMode};

    fn workspace() -> (tempfile::TempDir, TempWorkspace) {
        let root = tempfile::tempdir().expect("tempdir");
        let workspace = TempWorkspace::create(Some(root.path())).expect("workspace");
        (root, workspace)
    }

    fn spec(format: AudioFormat) -> AudioSpec {
        AudioSpec {
            format,
            sample_rate: format.default_sample_rate(),
        }
    }

    fn dir_entries(path: &Path) -> usize {
        fs::read_dir(path).map(|dir| dir.count()).unwrap_or(0)
    }

    #[test]
    fn artifact_exists_only_during_playback() {
        let (_root, workspace) = workspace();
        let player = FakePlayer::new(PlayerMode::Succeed);
        let mut manager = PlaybackManager::new(&workspace, player.clone());
        let flag = AtomicBool::new(false);

        let artifact = manager
            .play(b"fake mp3", spec(AudioFormat::Mp3), &flag)
            .expect("play");
        assert_eq!(artifact.size_bytes, 8);
        assert!(artifact.path.extension().is_some_and(|ext| ext == "mp3"));
        assert!(!artifact.path.exists());
        assert_eq!(player.played(), vec![(artifact.path.clone(), true)]);
        assert_eq!(dir_entries(workspace.path()), 0);
    }

    #[test]
    fn failed_playback_still_deletes_artifact() {
        let (_root, workspace) = workspace();
        let player = FakePlayer::new(PlayerMode::Fail);
        let mut manager = PlaybackManager::new(&workspace, player.clone());
        let flag = AtomicBool::new(false);

        let err = manager
            .play(b"garbage", spec(AudioFormat::Wav), &flag)
            .expect_err("decode fails");
        assert!(matches!(err, PlaybackError::Decode(_)));
        let (path, existed) = player.played()[0].clone();
        assert!(existed);
        assert!(!path.exists());
        assert_eq!(dir_entries(workspace.path()), 0);
    }

    #[test]
    fn interrupted_playback_deletes_artifact() {
        let (_root, workspace) = workspace();
        let player = FakePlayer::new(PlayerMode::Hang);
        let mut manager = PlaybackManager::new(&workspace, player);
        let flag = Arc::new(AtomicBool::new(false));
        let raiser = {
            let flag = flag.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                flag.store(true, Ordering::Release);
            })
        };
        let err = manager
            .play(b"audio", spec(AudioFormat::Mp3), &flag)
            .expect_err("interrupted");
        raiser.join().expect("raiser");
        assert!(matches!(err, PlaybackError::Interrupted));
        assert_eq!(dir_entries(workspace.path()), 0);
    }

    #[test]
    fn staging_failure_is_reported() {
        let (_root, mut workspace) = workspace();
        let mut manager = PlaybackManager::new(&workspace, FakePlayer::new(PlayerMode::Succeed));
        workspace.cleanup().expect("remove dir");
        let flag = AtomicBool::new(false);
        assert!(matches!(
            manager.play(b"x", spec(AudioFormat::Mp3), &flag),
            Err(PlaybackError::Stage { .. })
        ));
    }

    #[test]
    fn workspace_cleanup_is_idempotent_and_runs_on_drop() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = {
            let workspace = TempWorkspace::create(Some(root.path())).expect("workspace");
            fs::write(workspace.path().join("leftover.wav"), b"x").expect("write");
            workspace.path().to_path_buf()
        };
        assert!(!dir.exists());

        let mut workspace = TempWorkspace::create(Some(root.path())).expect("workspace");
        workspace.cleanup().expect("first");
        workspace.cleanup().expect("second");
        assert!(!workspace.path().exists());
    }

    #[test]
    fn formats_map_to_a_playback_route() {
        assert_eq!(route(AudioFormat::Mp3), Some(Route::Decoder));
        assert_eq!(route(AudioFormat::Wav), Some(Route::Decoder));
        assert_eq!(route(AudioFormat::Pcm), Some(Route::RawPcm));
        assert_eq!(route(AudioFormat::Opus), None);
        assert!(!RodioPlayer::supports(AudioFormat::Opus));
        assert!(RodioPlayer::supports(AudioFormat::Pcm));
    }

    #[test]
    fn rodio_player_refuses_opus_before_opening_output() {
        let (_root, workspace) = workspace();
        let path = workspace.path().join("reply.opus");
        fs::write(&path, b"OggS").expect("write");
        let flag = AtomicBool::new(false);
        let err = RodioPlayer
            .play(&path, spec(AudioFormat::Opus), &flag)
            .expect_err("opus has no decoder");
        assert!(matches!(err, PlaybackError::Decode(msg) if msg.contains("opus")));
    }

    #[test]
    fn pcm_bytes_become_normalized_mono_samples() {
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x00, 0x80, 0x01];
        let samples = pcm_samples(&bytes);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 32_767.0 / 32_768.0).abs() < f32::EPSILON);
        assert_eq!(samples[2], -1.0);
    }

    #[test]
    fn manager_hands_the_format_and_rate_to_the_player() {
        let (_root, workspace) = workspace();
        let player = FakePlayer::new(PlayerMode::Succeed);
        let mut manager = PlaybackManager::new(&workspace, player.clone());
        let flag = AtomicBool::new(false);
        let pcm = AudioSpec {
            format: AudioFormat::Pcm,
            sample_rate: 24_000,
        };

        let artifact = manager.play(b"\x00\x00", pcm, &flag).expect("play");
        assert!(artifact.path.extension().is_some_and(|ext| ext == "pcm"));
        assert_eq!(player.specs(), vec![pcm]);
    }
}
