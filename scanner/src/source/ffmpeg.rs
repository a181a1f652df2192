use image::RgbImage;
use particle_scan_common::frame::Frame;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::probe::{probe_video, VideoInfo};
use super::{FrameSource, SourceError};

/// Lines of ffmpeg diagnostics kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Decodes a video file by piping raw RGB24 frames out of an ffmpeg subprocess.
///
/// The child process is owned by this value. Its stderr is drained on a
/// helper thread so a chatty decoder never stalls the frame pipe. The exit
/// status is checked as soon as stdout ends, so a decoder failure surfaces
/// from `next_frame` rather than looking like a short video. `close` stops a
/// decoder that is still running; dropping without `close` does the same.
pub struct FfmpegSource {
    child: Option<Child>,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<Vec<String>>>,
    info: VideoInfo,
    frame_len: usize,
    next_index: u64,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path, ffmpeg: &str, ffprobe: &str) -> Result<Self, SourceError> {
        let info = probe_video(ffprobe, path)?;

        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args([
                "-map", "0:v:0",
                "-vsync", "passthrough",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "pipe:1",
            ]);

        info!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            frame_rate = info.frame_rate,
            frame_count = ?info.frame_count,
            rotation = info.rotation,
            "video opened"
        );

        Self::spawn(cmd, info)
    }

    /// Start a decoder that writes `info`-sized rgb24 frames to stdout.
    pub(crate) fn spawn(mut cmd: Command, info: VideoInfo) -> Result<Self, SourceError> {
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SourceError::Spawn(e.to_string()))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::Spawn("could not get stdio handles".into()));
        };

        let stderr = match thread::Builder::new()
            .name("ffmpeg-stderr".into())
            .spawn(move || drain_stderr(stderr))
        {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::Spawn(format!("stderr reader: {e}")));
            }
        };

        let frame_len = info.width as usize * info.height as usize * 3;

        Ok(Self {
            child: Some(child),
            stdout: BufReader::new(stdout),
            stderr: Some(stderr),
            info,
            frame_len,
            next_index: 0,
            finished: false,
        })
    }

    /// Release the decoder. If frames were left unread, ffmpeg is stopped.
    /// Decode failures have already been reported by `next_frame`.
    pub fn close(mut self) -> Result<(), SourceError> {
        if let Some(mut child) = self.child.take() {
            // Stop decoding frames nobody will read.
            let _ = child.kill();
            let _ = child.wait();
            self.join_stderr();
            debug!(frames_read = self.next_index, "ffmpeg stopped early");
        }
        Ok(())
    }

    /// Wait for ffmpeg after its stdout has ended and turn a failed exit into
    /// a decode error carrying the tail of its diagnostics.
    fn reap(&mut self) -> Result<(), SourceError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let diagnostics = self.join_stderr();
        if !status.success() {
            let message = diagnostics.join("\n");
            let message = message.trim();
            return Err(SourceError::Decode(if message.is_empty() {
                format!("ffmpeg exited with {status}")
            } else {
                message.to_string()
            }));
        }
        debug!(frames_read = self.next_index, "ffmpeg exited cleanly");
        Ok(())
    }

    fn join_stderr(&mut self) -> Vec<String> {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl FrameSource for FfmpegSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn frame_rate(&self) -> f64 {
        self.info.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        self.info.frame_count
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len];
        let filled = read_full(&mut self.stdout, &mut buf)?;
        if filled < self.frame_len {
            self.finished = true;
            if filled > 0 {
                warn!(
                    bytes = filled,
                    expected = self.frame_len,
                    frame_index = self.next_index,
                    "truncated trailing frame, ending stream"
                );
            }
            self.reap()?;
            return Ok(None);
        }

        let image = RgbImage::from_raw(self.info.width, self.info.height, buf)
            .ok_or_else(|| SourceError::Decode("frame buffer size mismatch".into()))?;
        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.join_stderr();
    }
}

/// Read ffmpeg's stderr to the end, logging each line and keeping the last
/// few for error reports.
fn drain_stderr(stderr: ChildStderr) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(stderr).split(b'\n') {
        let Ok(line) = line else { break };
        let line = String::from_utf8_lossy(&line).trim_end().to_string();
        if line.is_empty() {
            continue;
        }
        debug!(line = %line, "ffmpeg");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

/// Fill `buf` as far as the reader allows. Returns the number of bytes read,
/// which is short only at end of stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Check whether ffmpeg is available. Logs a warning if not found.
pub fn check_ffmpeg_available(ffmpeg: &str) {
    match Command::new(ffmpeg).arg("-version").output() {
        Ok(out) if out.status.success() => {
            debug!(ffmpeg, "ffmpeg is available");
        }
        Ok(_) => {
            warn!(ffmpeg, "ffmpeg returned non-zero for -version; decoding may fail");
        }
        Err(e) => {
            warn!(
                ffmpeg,
                error = %e,
                "ffmpeg not found; video decoding will fail. Install ffmpeg or set video.ffmpeg"
            );
        }
    }
}
