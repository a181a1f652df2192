use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use super::SourceError;

/// Stream properties read from ffprobe before decoding starts.
///
/// `width` and `height` are the size of the frames ffmpeg delivers, which is
/// the displayed size: ffmpeg applies rotation metadata while decoding, so a
/// quarter turn swaps the stored dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub frame_count: Option<u64>,
    /// Rotation metadata in degrees, normalized to `0..360`.
    pub rotation: u32,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    #[serde(default)]
    tags: ProbeTags,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

/// Older muxers store rotation as a `rotate` tag instead of a display matrix.
#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

impl ProbeStream {
    fn rotation(&self) -> u32 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|sd| sd.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .unwrap_or(0.0);
        (degrees.round() as i64).rem_euclid(360) as u32
    }
}

/// Run ffprobe on the first video stream of `path`.
pub fn probe_video(ffprobe: &str, path: &Path) -> Result<VideoInfo, SourceError> {
    let path_str = path.display().to_string();
    let output = Command::new(ffprobe)
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames\
                 :stream_side_data=rotation:stream_tags=rotate",
            "-of", "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| SourceError::Probe {
            path: path_str.clone(),
            reason: format!("could not run {ffprobe}: {e}"),
        })?;

    if !output.status.success() {
        return Err(SourceError::Probe {
            path: path_str,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let info = parse_probe_json(&output.stdout, &path_str)?;
    debug!(
        path = path_str,
        width = info.width,
        height = info.height,
        frame_rate = info.frame_rate,
        frame_count = ?info.frame_count,
        rotation = info.rotation,
        "probed video stream"
    );
    Ok(info)
}

fn parse_probe_json(json: &[u8], path: &str) -> Result<VideoInfo, SourceError> {
    let parsed: ProbeOutput = serde_json::from_slice(json).map_err(|e| SourceError::Probe {
        path: path.to_string(),
        reason: format!("unreadable ffprobe output: {e}"),
    })?;

    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::NoVideoStream(path.to_string()))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(SourceError::NoVideoStream(path.to_string()));
    };

    // avg_frame_rate is "0/0" for some containers; r_frame_rate is the fallback.
    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .filter(|fps| *fps > 0.0)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational))
        .unwrap_or(0.0);

    let frame_count = stream.nb_frames.as_deref().and_then(|n| n.parse().ok());

    let rotation = stream.rotation();
    let (width, height) = if rotation % 180 == 90 {
        (height, width)
    } else {
        (width, height)
    };

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        frame_count,
        rotation,
    })
}

/// Parse an ffprobe rational such as `30000/1001`. A zero denominator yields 0.0.
fn parse_rational(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            Some(if den == 0.0 { 0.0 } else { num / den })
        }
        None => s.trim().parse().ok(),
    }
}
