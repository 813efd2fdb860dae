// src/recorder/sink_video.rs
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::EncodeError;

/// Output parameters shared by every encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub height: u32,
    pub bitrate_kbps: u32,
    pub fps: u32,
    pub encoder: PathBuf,
}

/// One bucket's worth of work for the encoder.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub key: String,
    /// Frames in capture order.
    pub images: Vec<PathBuf>,
    /// Where to write. The caller renames it into place on success.
    pub output: PathBuf,
    pub settings: VideoSettings,
}

pub trait VideoEncoder: Send {
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError>;
}

/// Drives an external ffmpeg binary through its concat demuxer, so frame
/// order is exactly the order of `EncodeJob::images`.
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self
    }

    fn concat_list(job: &EncodeJob) -> Result<String, EncodeError> {
        let frame = 1.0 / f64::from(job.settings.fps.max(1));
        let mut out = String::from("ffconcat version 1.0\n");
        for image in job.images.iter() {
            let abs = fs::canonicalize(image)
                .map_err(|e| EncodeError::io(format!("resolving {:?}", image), e))?;
            out.push_str(&format!(
                "file '{}'\nduration {:.6}\n",
                escape_concat_path(&abs),
                frame
            ));
        }
        // The demuxer ignores the duration of the final entry unless it is repeated.
        if let Some(last) = job.images.last() {
            let abs = fs::canonicalize(last)
                .map_err(|e| EncodeError::io(format!("resolving {:?}", last), e))?;
            out.push_str(&format!("file '{}'\n", escape_concat_path(&abs)));
        }
        Ok(out)
    }

    fn args(job: &EncodeJob, list: &Path) -> Vec<String> {
        let s = &job.settings;
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list.to_string_lossy().into_owned(),
            "-vf".into(),
            format!("scale=-2:{},format=yuv420p", s.height),
            "-r".into(),
            s.fps.to_string(),
            "-b:v".into(),
            format!("{}k", s.bitrate_kbps),
            "-movflags".into(),
            "+faststart".into(),
            "-f".into(),
            "mp4".into(),
            job.output.to_string_lossy().into_owned(),
        ]
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError> {
        if job.images.is_empty() {
            return Err(EncodeError::NoImages(job.key.clone()));
        }

        let list = job.output.with_extension("ffconcat");
        fs::write(&list, Self::concat_list(job)?)
            .map_err(|e| EncodeError::io(format!("writing {:?}", list), e))?;

        log::info!(
            "[ffmpeg] {} frames -> {} ({}p, {} kbps)",
            job.images.len(),
            job.output.display(),
            job.settings.height,
            job.settings.bitrate_kbps
        );

        let result = Command::new(&job.settings.encoder)
            .args(Self::args(job, &list))
            .output();
        let _ = fs::remove_file(&list);

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EncodeError::EncoderMissing(job.settings.encoder.clone()));
            }
            Err(source) => {
                return Err(EncodeError::Spawn {
                    encoder: job.settings.encoder.clone(),
                    source,
                });
            }
        };

        if !output.status.success() {
            return Err(EncodeError::Failed {
                key: job.key.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(dir: &Path, images: Vec<PathBuf>, encoder: &str) -> EncodeJob {
        EncodeJob {
            key: "2024-05-01".into(),
            images,
            output: dir.join("2024-05-01.mp4.partial"),
            settings: VideoSettings {
                height: 512,
                bitrate_kbps: 1024,
                fps: 2,
                encoder: PathBuf::from(encoder),
            },
        }
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(
            escape_concat_path(Path::new("/tmp/it's.png")),
            "/tmp/it'\\''s.png"
        );
    }

    #[test]
    fn test_concat_list_preserves_order() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("00000000_100000.png");
        let b = tmp.path().join("00000001_100001.png");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let list = FfmpegEncoder::concat_list(&job(tmp.path(), vec![b.clone(), a.clone()], "ffmpeg")).unwrap();
        let files: Vec<&str> = list.lines().filter(|l| l.starts_with("file ")).collect();
        assert_eq!(files.len(), 3);
        assert!(files[0].contains("00000001_100001.png"));
        assert!(files[1].contains("00000000_100000.png"));
        assert!(files[2].contains("00000000_100000.png"));
        assert!(list.contains("duration 0.500000"));
    }

    #[test]
    fn test_args_carry_settings() {
        let j = job(Path::new("/data/archive"), vec![], "ffmpeg");
        let args = FfmpegEncoder::args(&j, Path::new("/data/archive/list.ffconcat"));
        assert!(args.contains(&"scale=-2:512,format=yuv420p".to_string()));
        assert!(args.contains(&"1024k".to_string()));
        assert_eq!(args.last().unwrap(), "/data/archive/2024-05-01.mp4.partial");
    }

    #[test]
    fn test_missing_encoder_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let img = tmp.path().join("00000000_100000.png");
        fs::write(&img, b"a").unwrap();

        let j = job(tmp.path(), vec![img], "/nonexistent/bin/ffmpeg-screenlog");
        match FfmpegEncoder::new().encode(&j) {
            Err(EncodeError::EncoderMissing(p)) => assert_eq!(p, j.settings.encoder),
            other => panic!("expected EncoderMissing, got {other:?}"),
        }
        assert!(!j.output.with_extension("ffconcat").exists());
    }

    #[test]
    fn test_empty_job_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let j = job(tmp.path(), vec![], "ffmpeg");
        assert!(matches!(
            FfmpegEncoder::new().encode(&j),
            Err(EncodeError::NoImages(_))
        ));
    }
}
