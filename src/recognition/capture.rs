//! UDP audio capture
//!
//! Devices stream raw 16 kHz mono 16-bit little-endian PCM as UDP datagrams.
//! Capture is cut into fixed windows; each window is wrapped as WAV and sent
//! for recognition until one matches.

use super::{Recognition, RecognitionError, Recognizer};
use anyhow::Context;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::net::UdpSocket;
use tokio::time::Instant;

pub const SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_UDP_PORT: u16 = 6056;
pub const DEFAULT_CHUNK_SECONDS: u32 = 3;
pub const DEFAULT_MAX_SECONDS: u32 = 12;

const DATAGRAM_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub chunk_seconds: u32,
    pub max_seconds: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            chunk_seconds: DEFAULT_CHUNK_SECONDS,
            max_seconds: DEFAULT_MAX_SECONDS,
        }
    }
}

impl CaptureSettings {
    pub fn chunk_count(&self) -> u32 {
        let chunk = self.chunk_seconds.max(1);
        self.max_seconds.div_ceil(chunk).max(1)
    }
}

/// Wrap raw PCM (s16le, mono, 16 kHz) as an in-memory WAV file.
/// A trailing odd byte is dropped.
pub fn encode_wav(pcm: &[u8]) -> anyhow::Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec).context("start wav")?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .context("write wav sample")?;
        }
        writer.finalize().context("finalize wav")?;
    }
    Ok(cursor.into_inner())
}

/// Bind the capture socket on all interfaces.
pub async fn bind(port: u16) -> anyhow::Result<UdpSocket> {
    let addr = format!("0.0.0.0:{port}");
    let socket = UdpSocket::bind(&addr)
        .await
        .with_context(|| format!("bind udp {addr}"))?;
    tracing::info!(%addr, "audio capture listening");
    Ok(socket)
}

/// Collect datagrams for `window`.
pub async fn collect_window(socket: &UdpSocket, window: Duration) -> std::io::Result<Vec<u8>> {
    let deadline = Instant::now() + window;
    let mut pcm = Vec::new();
    let mut buf = [0u8; DATAGRAM_SIZE];

    loop {
        match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, _))) => pcm.extend_from_slice(&buf[..n]),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(pcm),
        }
    }
}

/// Capture and submit windows until one is recognized.
pub async fn listen_and_recognize(
    socket: &UdpSocket,
    recognizer: &dyn Recognizer,
    settings: CaptureSettings,
) -> Result<Recognition, RecognitionError> {
    let window = Duration::from_secs(u64::from(settings.chunk_seconds.max(1)));

    for chunk in 0..settings.chunk_count() {
        let captured_at = OffsetDateTime::now_utc();
        let pcm = collect_window(socket, window)
            .await
            .map_err(|e| RecognitionError::Transport(format!("udp receive: {e}")))?;

        if pcm.is_empty() {
            tracing::debug!(chunk, "no audio received in window");
            continue;
        }

        let wav = encode_wav(&pcm).map_err(|e| RecognitionError::Transport(format!("{e:#}")))?;
        tracing::info!(chunk, bytes = wav.len(), "submitting audio window");

        match recognizer.recognize(wav, captured_at).await {
            Ok(found) => return Ok(found),
            Err(RecognitionError::NoMatchFound) => {
                tracing::debug!(chunk, "no match, capturing next window");
            }
            Err(e) => return Err(e),
        }
    }

    Err(RecognitionError::NoMatchFound)
}
