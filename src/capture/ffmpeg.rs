use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::{CaptureError, StreamAddress};

/// Arguments that make ffmpeg read one frame and emit it as PNG on stdout.
pub fn ffmpeg_args(address: &StreamAddress) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .into_iter()
        .map(String::from)
        .collect();

    match address {
        StreamAddress::Device(index) => {
            args.extend(["-f".into(), "v4l2".into(), "-i".into(), format!("/dev/video{index}")]);
        }
        StreamAddress::Stream(input) => {
            if input.to_ascii_lowercase().starts_with("rtsp://") {
                args.extend(["-rtsp_transport".into(), "tcp".into()]);
            }
            args.extend(["-i".into(), input.clone()]);
        }
        StreamAddress::Http(url) => {
            args.extend(["-i".into(), url.to_string()]);
        }
    }

    args.extend(
        ["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1"]
            .into_iter()
            .map(String::from),
    );
    args
}

/// Reads a single frame through an ffmpeg child process. The child is
/// killed when this future completes or is dropped, timeouts included.
pub async fn grab_frame(
    ffmpeg: &Path,
    address: &StreamAddress,
    timeout: Duration,
) -> Result<Vec<u8>, CaptureError> {
    let label = address.to_string();
    let child = Command::new(ffmpeg)
        .args(ffmpeg_args(address))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| CaptureError::Open {
            address: label.clone(),
            reason: format!("failed to spawn {}: {err}", ffmpeg.display()),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|err| CaptureError::Open {
            address: label.clone(),
            reason: format!("ffmpeg did not complete: {err}"),
        })?,
        Err(_) => {
            return Err(CaptureError::Timeout {
                address: label,
                timeout,
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no diagnostics")
            .trim()
            .to_string();
        return Err(CaptureError::Open {
            address: label,
            reason: format!("ffmpeg exited with {}: {reason}", output.status),
        });
    }

    if output.stdout.is_empty() {
        return Err(CaptureError::NoFrame { address: label });
    }

    Ok(output.stdout)
}
