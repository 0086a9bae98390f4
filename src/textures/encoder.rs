//! Block encoder seam and the `wimgt` subprocess adapter.

use image::DynamicImage;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tracing::{debug, warn};

use super::{ColorNormalizer, EncodedBlock, GpuFormat, Stage, ToolContainer, ToolOutputError};
use crate::error::{ConvertError, IoContext, Result};
use crate::scratch::ScratchDir;

/// How long one encoder invocation may run before it is killed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the stderr reader once the encoder has exited.
const STDERR_GRACE: Duration = Duration::from_secs(1);

/// Compresses one image into a GPU texture payload.
pub trait BlockEncoder: Send + Sync {
    /// Encode `image` in `format`. `stage` names the sub-image in errors
    /// and may change how the encoder is driven.
    fn compress(&self, image: &DynamicImage, format: GpuFormat, stage: Stage) -> Result<EncodedBlock>;
}

/// Runs the external `wimgt` tool once per image.
///
/// Every call writes a canonical PNG and an output file into the shared
/// scratch directory under unique names, so calls may run concurrently.
pub struct WimgtEncoder {
    executable: PathBuf,
    container: ToolContainer,
    timeout: Option<Duration>,
    scratch: Arc<ScratchDir>,
    normalizer: Arc<dyn ColorNormalizer>,
}

impl WimgtEncoder {
    pub fn new(
        executable: impl Into<PathBuf>,
        scratch: Arc<ScratchDir>,
        normalizer: Arc<dyn ColorNormalizer>,
    ) -> Self {
        Self {
            executable: executable.into(),
            container: ToolContainer::default(),
            timeout: Some(DEFAULT_TIMEOUT),
            scratch,
            normalizer,
        }
    }

    pub fn with_container(mut self, container: ToolContainer) -> Self {
        self.container = container;
        self
    }

    /// `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn run(&self, stage: Stage, format: GpuFormat, source: &Path, dest: &Path) -> Result<()> {
        let transform = self.container.transform(format);
        debug!(
            "Running {} {} {} --transform {} --dest {}",
            self.executable.display(),
            stage.verb(),
            source.display(),
            transform,
            dest.display()
        );

        let mut child = Command::new(&self.executable)
            .arg(stage.verb())
            .arg(source)
            .args(["--transform", transform.as_str(), "--overwrite", "--strip", "--dest"])
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ConvertError::tool(
                    stage,
                    format!("failed to launch {}: {}", self.executable.display(), e),
                )
            })?;

        // Drained on a thread so a chatty tool can't block on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        let status = match self.timeout {
            Some(timeout) => wait_with_timeout(&mut child, timeout),
            None => child.wait().map(Some),
        }
        .map_err(|e| ConvertError::tool(stage, format!("failed waiting for encoder: {}", e)))?;

        match (status, self.timeout) {
            (None, Some(timeout)) => {
                // Anything the killed tool spawned may still hold the pipe open,
                // so the reader is left to finish on its own
                drop(stderr);
                Err(ConvertError::EncoderTimeout { stage, timeout })
            }
            (status, _) => {
                if let Some(buf) = stderr.and_then(|handle| join_within(handle, STDERR_GRACE)) {
                    for line in String::from_utf8_lossy(&buf).lines() {
                        if !line.trim().is_empty() {
                            debug!("[wimgt] {}", line);
                        }
                    }
                }
                if let Some(status) = status.filter(|s| !s.success()) {
                    // Output is validated regardless; the exit code alone is not trusted
                    warn!("Encoder exited with {} on {}", status, stage);
                }
                Ok(())
            }
        }
    }
}

impl BlockEncoder for WimgtEncoder {
    fn compress(&self, image: &DynamicImage, format: GpuFormat, stage: Stage) -> Result<EncodedBlock> {
        let dir = self.scratch.ensure()?;
        let prefix = format!("{}-", stage.file_stem());

        let source = self.normalizer.write_canonical(image, dir, &prefix)?;
        let dest = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(self.container.suffix())
            .tempfile_in(dir)
            .io_context(|| format!("Failed to create scratch file in {}", dir.display()))?
            .into_temp_path();

        self.run(stage, format, &source, &dest)?;

        let expected = format.encoded_size(image.width(), image.height());
        let extracted = fs::read(&dest)
            .map_err(ToolOutputError::Unreadable)
            .and_then(|data| self.container.extract(&data, expected));

        discard(source);

        match extracted {
            Ok(payload) => {
                discard(dest);
                debug!(
                    "Encoded {} {}x{}: {} bytes",
                    stage,
                    image.width(),
                    image.height(),
                    payload.len()
                );
                Ok(EncodedBlock::new(payload))
            }
            Err(source) => {
                match dest.keep() {
                    Ok(path) => warn!("Kept encoder output for {} at {}", stage, path.display()),
                    Err(e) => warn!("Could not keep encoder output for {}: {}", stage, e),
                }
                Err(ConvertError::InvalidToolOutput { stage, source })
            }
        }
    }
}

/// Poll `child` until it exits or `timeout` passes. On expiry the child is
/// killed and reaped and `None` is returned. A timeout too large to form a
/// deadline waits indefinitely.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let Some(deadline) = Instant::now().checked_add(timeout) else {
        return child.wait().map(Some);
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // May race with a natural exit; reaping below settles it either way
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Join `handle` if it finishes within `grace`, otherwise leave it running.
fn join_within(handle: JoinHandle<Vec<u8>>, grace: Duration) -> Option<Vec<u8>> {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            debug!("Encoder stderr still open after exit, not waiting for it");
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
    handle.join().ok()
}

fn discard(path: TempPath) {
    let shown = path.to_path_buf();
    if let Err(e) = path.close() {
        warn!("Failed to remove scratch file {}: {}", shown.display(), e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::textures::SrgbNormalizer;
    use image::{RgbImage, RgbaImage};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{tempdir, TempDir};

    /// Writes a TPL header plus 4 KiB of payload and logs its arguments.
    const GOOD_TOOL: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
dest="$8"
printf '\000\040\257\060\000\000\000\001' > "$dest"
head -c 56 /dev/zero >> "$dest"
head -c 4096 /dev/zero | tr '\000' '\132' >> "$dest"
"#;

    fn fake_tool(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("wimgt");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn encoder(tool_dir: &TempDir, script: &str) -> (WimgtEncoder, PathBuf) {
        let tool = fake_tool(tool_dir.path(), script);
        let scratch_root = tool_dir.path().join("scratch");
        let encoder = WimgtEncoder::new(
            tool,
            Arc::new(ScratchDir::new(&scratch_root)),
            Arc::new(SrgbNormalizer::new().unwrap()),
        );
        (encoder, scratch_root)
    }

    fn rgb(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(w, h))
    }

    #[test]
    fn test_compress_extracts_payload() {
        let dir = tempdir().unwrap();
        let (encoder, scratch) = encoder(&dir, GOOD_TOOL);

        let block = encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Texture).unwrap();
        assert_eq!(block.len(), 4096);
        assert!(block.as_bytes().iter().all(|&b| b == 0x5A));

        // Both scratch files are gone
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_invocation_arguments() {
        let dir = tempdir().unwrap();
        let (encoder, _) = encoder(&dir, GOOD_TOOL);

        encoder.compress(&rgb(8, 16), GpuFormat::Cmpr, Stage::Canvas).unwrap();
        encoder
            .compress(&DynamicImage::ImageRgba8(RgbaImage::new(8, 8)), GpuFormat::Cmpr, Stage::Mask)
            .unwrap();

        let log = fs::read_to_string(dir.path().join("calls.log")).unwrap();
        let calls: Vec<Vec<&str>> = log.lines().map(|l| l.split(' ').collect()).collect();
        assert_eq!(calls.len(), 2);

        assert_eq!(calls[0][0], "COPY");
        assert!(calls[0][1].ends_with(".png"));
        assert_eq!(&calls[0][2..7], &["--transform", "tpl.cmpr", "--overwrite", "--strip", "--dest"]);
        assert!(calls[0][7].ends_with(".tpl"));
        assert_eq!(calls[1][0], "ENCODE");
    }

    #[test]
    fn test_tex0_transform_name() {
        let dir = tempdir().unwrap();
        let (encoder, _) = encoder(&dir, GOOD_TOOL);
        let encoder = encoder.with_container(ToolContainer::Tex0);

        // The fake tool writes TPL regardless, so validation fails
        let err = encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Texture).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTool);

        let log = fs::read_to_string(dir.path().join("calls.log")).unwrap();
        assert!(log.contains("--transform tex.cmpr"));
    }

    #[test]
    fn test_bad_magic_keeps_output_and_names_stage() {
        let dir = tempdir().unwrap();
        let script = "#!/bin/sh\nprintf 'garbage' > \"$8\"\n";
        let (encoder, scratch) = encoder(&dir, script);

        let err = encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Mask).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTool);
        assert!(err.to_string().contains("mask plane"));

        let kept: Vec<_> = fs::read_dir(&scratch)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(fs::read(&kept[0]).unwrap(), b"garbage");
    }

    #[test]
    fn test_no_output_is_an_error() {
        let dir = tempdir().unwrap();
        let (encoder, _) = encoder(&dir, "#!/bin/sh\nexit 1\n");

        let err = encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Color).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::InvalidToolOutput {
                stage: Stage::Color,
                source: ToolOutputError::Empty
            }
        ));
    }

    #[test]
    fn test_short_payload_rejected() {
        let dir = tempdir().unwrap();
        let (encoder, _) = encoder(&dir, GOOD_TOOL);

        // 256x256 needs 32 KiB, the fake tool only writes 4 KiB
        let err = encoder.compress(&rgb(256, 256), GpuFormat::Cmpr, Stage::Texture).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::InvalidToolOutput {
                source: ToolOutputError::ShortPayload { len: 4096, expected: 32768 },
                ..
            }
        ));
        assert!(err.to_string().contains("expected at least 32768"));
    }

    #[test]
    fn test_timeout_kills_encoder() {
        let dir = tempdir().unwrap();
        let (encoder, _) = encoder(&dir, "#!/bin/sh\nexec sleep 30\n");
        let encoder = encoder.with_timeout(Some(Duration::from_millis(200)));

        let started = Instant::now();
        let err = encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Texture).unwrap_err();
        assert!(matches!(err, ConvertError::EncoderTimeout { stage: Stage::Texture, .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_with_lingering_grandchild() {
        let dir = tempdir().unwrap();
        // Without exec the shell forks sleep, which inherits stderr and outlives the kill
        let (encoder, _) = encoder(&dir, "#!/bin/sh\nsleep 20\n");
        let encoder = encoder.with_timeout(Some(Duration::from_millis(200)));

        let started = Instant::now();
        let err = encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Canvas).unwrap_err();
        assert!(matches!(err, ConvertError::EncoderTimeout { stage: Stage::Canvas, .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_background_child_does_not_hold_up_success() {
        let dir = tempdir().unwrap();
        let script = format!("{}(sleep 20) &\n", GOOD_TOOL);
        let (encoder, _) = encoder(&dir, &script);

        let started = Instant::now();
        let block = encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Texture).unwrap();
        assert_eq!(block.len(), 4096);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_huge_timeout_means_no_deadline() {
        let dir = tempdir().unwrap();
        let (encoder, _) = encoder(&dir, GOOD_TOOL);
        let encoder = encoder.with_timeout(Some(Duration::MAX));

        let block = encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Texture).unwrap();
        assert_eq!(block.len(), 4096);

        let encoder = encoder.with_timeout(Some(Duration::from_secs(u64::MAX)));
        encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Texture).unwrap();
    }

    #[test]
    fn test_missing_executable() {
        let dir = tempdir().unwrap();
        let encoder = WimgtEncoder::new(
            dir.path().join("does-not-exist"),
            Arc::new(ScratchDir::new(dir.path().join("scratch"))),
            Arc::new(SrgbNormalizer::new().unwrap()),
        );

        let err = encoder.compress(&rgb(8, 8), GpuFormat::Cmpr, Stage::Texture).unwrap_err();
        assert!(err.to_string().contains("failed to launch"));
    }
}
