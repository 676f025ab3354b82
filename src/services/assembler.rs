use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{AppError, Result};

/// Narration pace used to derive the clip length from the script.
const WORDS_PER_SECOND: f64 = 2.5;
const MIN_DURATION_SECS: u64 = 15;
/// Shorts are capped at a minute.
const MAX_DURATION_SECS: u64 = 60;

/// Narrow interface to the video codec. The pipeline only ever needs
/// "turn this script into a playable asset and tell me where it is".
#[async_trait]
pub trait Assembler: Send + Sync {
    async fn assemble(&self, job_id: i64, title: &str, script: &str) -> Result<PathBuf>;
}

/// FFmpeg-backed assembler: renders a 1080x1920 title card whose length
/// derives deterministically from the script's word count.
pub struct FfmpegAssembler {
    output_dir: PathBuf,
}

impl FfmpegAssembler {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

/// Deterministic: the same script always yields the same duration.
fn clip_duration_secs(script: &str) -> u64 {
    let words = script.split_whitespace().count() as f64;
    ((words / WORDS_PER_SECOND).ceil() as u64).clamp(MIN_DURATION_SECS, MAX_DURATION_SECS)
}

#[async_trait]
impl Assembler for FfmpegAssembler {
    async fn assemble(&self, job_id: i64, title: &str, script: &str) -> Result<PathBuf> {
        let ffmpeg = which::which("ffmpeg")
            .map_err(|_| AppError::Assembly("ffmpeg not found on PATH".to_string()))?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output = self.output_dir.join(format!("short-{}.mp4", job_id));

        // drawtext reads the title from a file to sidestep shell quoting.
        let title_file = self.output_dir.join(format!("short-{}.title.txt", job_id));
        tokio::fs::write(&title_file, title).await?;

        let duration = clip_duration_secs(script);
        let filter = format!(
            "drawtext=textfile={}:fontcolor=white:fontsize=64:borderw=4:\
             x=(w-text_w)/2:y=(h-text_h)/2",
            title_file.display()
        );

        let result = Command::new(ffmpeg)
            .args(["-y", "-f", "lavfi", "-i"])
            .arg(format!("color=c=0x101020:s=1080x1920:d={}", duration))
            .args(["-vf", filter.as_str(), "-r", "30", "-pix_fmt", "yuv420p"])
            .arg(&output)
            .output()
            .await?;

        tokio::fs::remove_file(&title_file).await.ok();

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let reason = stderr.lines().last().unwrap_or("no stderr").to_string();
            return Err(AppError::Assembly(format!(
                "ffmpeg exited with {}: {}",
                result.status, reason
            )));
        }

        Ok(output)
    }
}
