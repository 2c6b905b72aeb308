//! Firmware transfer over SysEx.
//!
//! The sequence is OTA_BEGIN, a prepare wait, every OTA_DATA chunk with pacing
//! delays, a flash settle wait, then OTA_END. The sender never acknowledges a
//! chunk, so the pacing is all that keeps its buffers from overflowing. Any
//! failed write aborts the transfer; there is no resume.

use std::time::{Duration, Instant};

use nowde_metrics::metric_defs;
use nowde_protocol::Command;
use tracing::{debug, info};

use crate::config::OtaConfig;
use crate::workers::CancelToken;
use crate::{OtaError, OtaStep, TransportError};

/// Progress after a chunk has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaProgress {
    /// Bytes written so far.
    pub bytes_sent: usize,
    /// Size of the image.
    pub total_size: usize,
    /// Chunks written so far.
    pub chunks_sent: usize,
    /// Number of chunks in the image.
    pub chunk_count: usize,
}

impl OtaProgress {
    /// Completed whole percent.
    pub fn percent(&self) -> usize {
        if self.total_size == 0 {
            return 0;
        }
        self.bytes_sent * 100 / self.total_size
    }
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaReport {
    /// Bytes written.
    pub bytes_sent: usize,
    /// OTA_DATA frames written.
    pub chunks_sent: usize,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// A single firmware push.
#[derive(Debug, Clone)]
pub struct OtaTransfer {
    firmware: Vec<u8>,
    total_size: u32,
    config: OtaConfig,
    bytes_sent: usize,
}

impl OtaTransfer {
    /// Prepare a transfer. The image must be non-empty and fit a 32-bit size.
    pub fn new(firmware: Vec<u8>, config: OtaConfig) -> Result<Self, OtaError> {
        if firmware.is_empty() {
            return Err(OtaError::EmptyImage);
        }
        let total_size = u32::try_from(firmware.len()).map_err(|_| OtaError::TooLarge(firmware.len()))?;
        Ok(OtaTransfer {
            firmware,
            total_size,
            config,
            bytes_sent: 0,
        })
    }

    /// Size of the image in bytes.
    pub fn total_size(&self) -> usize {
        self.firmware.len()
    }

    /// Number of OTA_DATA frames the image needs.
    pub fn chunk_count(&self) -> usize {
        self.config.chunk_count(self.firmware.len())
    }

    /// Bytes written so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Lower bound on the duration of the transfer.
    pub fn estimated_duration(&self) -> Duration {
        self.config.estimated_duration(self.firmware.len())
    }

    /// Run the transfer, writing each command through `send`.
    ///
    /// `progress` is called after every chunk. Cancellation is honoured at
    /// every wait and between chunks.
    pub fn run<S, P>(&mut self, mut send: S, cancel: &CancelToken, mut progress: P) -> Result<OtaReport, OtaError>
    where
        S: FnMut(&Command) -> Result<(), TransportError>,
        P: FnMut(OtaProgress),
    {
        let started = Instant::now();
        let chunk_count = self.chunk_count();
        let total_size = self.firmware.len();
        self.bytes_sent = 0;

        info!("Starting firmware transfer: {} bytes in {} chunks", total_size, chunk_count);
        step(
            OtaStep::Begin,
            send(&Command::OtaBegin {
                total_size: self.total_size,
            }),
        )?;
        wait(cancel, Duration::from_millis(self.config.prepare_delay_ms), OtaStep::Prepare)?;

        let mut last_logged_decile = 0;
        for (index, chunk) in self.firmware.chunks(self.config.chunk_size()).enumerate() {
            let at = OtaStep::Data {
                chunk: index,
                of: chunk_count,
            };
            if cancel.is_cancelled() {
                return Err(OtaError::Cancelled { step: at });
            }
            step(at, send(&Command::OtaData { chunk: chunk.to_vec() }))?;
            self.bytes_sent += chunk.len();
            metrics::counter!(metric_defs::OTA_BYTES_SENT.name).increment(chunk.len() as u64);

            let report = OtaProgress {
                bytes_sent: self.bytes_sent,
                total_size,
                chunks_sent: index + 1,
                chunk_count,
            };
            let decile = report.percent() / 10;
            if decile > last_logged_decile {
                last_logged_decile = decile;
                debug!("Firmware transfer {}% ({}/{} bytes)", decile * 10, self.bytes_sent, total_size);
            }
            progress(report);

            wait(cancel, self.config.delay_after_chunk(index), at)?;
        }

        info!("Sent all {} bytes ({} chunks), waiting for flash write", self.bytes_sent, chunk_count);
        wait(
            cancel,
            Duration::from_millis(self.config.flash_settle_delay_ms),
            OtaStep::FlashSettle,
        )?;
        step(OtaStep::End, send(&Command::OtaEnd))?;

        let elapsed = started.elapsed();
        metrics::histogram!(metric_defs::OTA_DURATION.name).record(elapsed.as_secs_f64());
        info!("Firmware transfer complete in {:.1}s", elapsed.as_secs_f64());
        Ok(OtaReport {
            bytes_sent: self.bytes_sent,
            chunks_sent: chunk_count,
            elapsed,
        })
    }
}

fn step(at: OtaStep, result: Result<(), TransportError>) -> Result<(), OtaError> {
    result.map_err(|source| OtaError::Step { step: at, source })
}

fn wait(cancel: &CancelToken, duration: Duration, at: OtaStep) -> Result<(), OtaError> {
    if cancel.sleep(duration) {
        Err(OtaError::Cancelled { step: at })
    } else {
        Ok(())
    }
}
