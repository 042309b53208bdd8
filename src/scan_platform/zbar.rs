//! V4L2 + zbarcam platform implementation
//!
//! Devices come from sysfs (`/sys/class/video4linux`). Decoding runs
//! zbarcam as a child process in `--raw` mode, one stdout line per
//! decoded code, stderr carrying frame diagnostics.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::{DecodeEvent, DiscoveredDevice, OpenedStream, ScanPlatform, StreamLease};
use crate::error::{Error, Result};

/// How long a freshly spawned decoder must survive to count as granted
const GRANT_PROBATION_MS: u64 = 500;

pub struct ZbarPlatform {
    zbarcam_path: String,
    video_sys_dir: PathBuf,
}

impl ZbarPlatform {
    pub fn new(zbarcam_path: String, video_sys_dir: PathBuf) -> Self {
        Self {
            zbarcam_path,
            video_sys_dir,
        }
    }
}

#[async_trait]
impl ScanPlatform for ZbarPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        let mut entries = tokio::fs::read_dir(&self.video_sys_dir).await?;
        let mut nodes: Vec<(u32, DiscoveredDevice)> = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let Some(index) = name.strip_prefix("video").and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            let label = match tokio::fs::read_to_string(entry.path().join("name")).await {
                Ok(contents) => contents.trim().to_string(),
                Err(_) => name.to_string(),
            };
            nodes.push((
                index,
                DiscoveredDevice {
                    device_id: format!("/dev/video{index}"),
                    label,
                },
            ));
        }

        nodes.sort_by_key(|(index, _)| *index);
        let devices: Vec<DiscoveredDevice> = nodes.into_iter().map(|(_, d)| d).collect();
        tracing::debug!(count = devices.len(), "Enumerated V4L2 capture devices");
        Ok(devices)
    }

    async fn open_stream(&self, device_id: &str) -> Result<OpenedStream> {
        tracing::debug!(device_id = %device_id, zbarcam = %self.zbarcam_path, "Spawning decoder");

        let mut child = Command::new(&self.zbarcam_path)
            .args(["--raw", "--nodisplay"])
            .arg(device_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::Config(format!("zbarcam not found at '{}'", self.zbarcam_path))
                }
                std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(format!(
                    "cannot execute '{}': {e}",
                    self.zbarcam_path
                )),
                _ => Error::DecodeStream(format!("failed to spawn decoder: {e}")),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("decoder stdout not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("decoder stderr not piped".to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel();

        let out_tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        if out_tx
                            .send(DecodeEvent::Decoded {
                                text: text.to_string(),
                            })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "Decoder stdout read ended");
                        break;
                    }
                }
            }
            let _ = out_tx.send(DecodeEvent::Closed {
                reason: "decoder process exited".to_string(),
            });
        });

        let err_tx = tx;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let diagnostic = line.trim().to_string();
                if diagnostic.is_empty() {
                    continue;
                }
                if err_tx.send(DecodeEvent::FrameMiss { diagnostic }).is_err() {
                    return;
                }
            }
        });

        // A decoder that dies right away never had the device.
        match tokio::time::timeout(Duration::from_millis(GRANT_PROBATION_MS), child.wait()).await {
            Ok(Ok(status)) => {
                let mut detail = String::new();
                while let Ok(event) = rx.try_recv() {
                    if let DecodeEvent::FrameMiss { diagnostic } = event {
                        detail = diagnostic;
                    }
                }
                let reason = if detail.is_empty() {
                    format!("decoder exited at startup ({status})")
                } else {
                    format!("decoder exited at startup ({status}): {detail}")
                };
                tracing::warn!(device_id = %device_id, reason = %reason, "Camera acquisition refused");
                if reason.to_lowercase().contains("permission denied") {
                    Err(Error::PermissionDenied(reason))
                } else {
                    Err(Error::DecodeStream(reason))
                }
            }
            Ok(Err(e)) => Err(Error::Internal(format!("decoder wait failed: {e}"))),
            Err(_still_running) => {
                tracing::info!(device_id = %device_id, "Camera stream granted");
                Ok(OpenedStream {
                    lease: Box::new(ZbarLease {
                        device_id: device_id.to_string(),
                        child,
                    }),
                    events: rx,
                })
            }
        }
    }
}

/// Holds the decoder child; the device is free once the child is dead
struct ZbarLease {
    device_id: String,
    child: Child,
}

#[async_trait]
impl StreamLease for ZbarLease {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(device_id = %self.device_id, error = %e, "Decoder was already gone");
        }
        tracing::debug!(device_id = %self.device_id, "Camera stream released");
        Ok(())
    }
}
