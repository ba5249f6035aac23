//! Video codec probing.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{output_with_timeout, tokio_command};
use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// Codec name ffprobe reports for H.265.
const HEVC_CODEC: &str = "hevc";

/// Answers whether a video is H.265.
#[async_trait]
pub trait CodecProbe: Send + Sync {
    async fn is_h265(&self, path: &Path) -> Result<bool>;
}

/// Probe backed by `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CodecProbe for FfprobeProbe {
    async fn is_h265(&self, path: &Path) -> Result<bool> {
        let mut cmd = tokio_command(&self.program);
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path);

        let output = match output_with_timeout(&mut cmd, self.timeout).await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                return Err(Error::tool_timeout("ffprobe", self.timeout));
            }
            Err(e) => {
                return Err(Error::Probe(format!(
                    "failed to run {}: {}",
                    self.program, e
                )));
            }
        };

        if !output.status.success() {
            return Err(Error::Probe(format!(
                "ffprobe exited with {} for {}: {}",
                output.status,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let is_h265 = parse_is_h265(&output.stdout)?;
        debug!(path = %path.display(), is_h265, "Probed video codec");
        Ok(is_h265)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
}

/// Read `ffprobe -show_streams` JSON; true if any stream is HEVC.
pub fn parse_is_h265(json: &[u8]) -> Result<bool> {
    let output: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| Error::Probe(format!("invalid ffprobe output: {}", e)))?;
    Ok(output
        .streams
        .iter()
        .any(|s| s.codec_name.as_deref() == Some(HEVC_CODEC)))
}
