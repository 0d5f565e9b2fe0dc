use std::path::Path;

use bytes::BufMut as _;
use tracing::debug;

use crate::Result;

/// Writes `bytes` to `path`, replacing whatever is there
///
/// The parent directory has to exist already.
pub async fn write_blob(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    tokio::fs::write(path, bytes).await?;
    debug!(path = %path.display(), len = bytes.len(), "wrote blob");
    Ok(())
}

/// Layout of raw, little-endian PCM samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// What the Live API sends back for `AUDIO` responses (`audio/pcm;rate=24000`)
    pub const LIVE_OUTPUT: Self = Self {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 16,
    };

    fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }

    fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::LIVE_OUTPUT
    }
}

const WAV_HEADER_LEN: usize = 44;

/// Prepends the canonical 44 byte RIFF/WAVE header to `pcm`
///
/// ```text
/// "RIFF" <len - 8> "WAVE"
/// "fmt " 16 <tag 1 = PCM> <channels> <rate> <byte rate> <block align> <bits>
/// "data" <pcm len> <pcm>
/// ```
fn wav(pcm: &[u8], format: PcmFormat) -> Result<Vec<u8>> {
    let data_len = u32::try_from(pcm.len())
        .ok()
        .filter(|len| *len <= u32::MAX - 36)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "PCM data too large for a WAV file",
            )
        })?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    out.put_slice(b"RIFF");
    out.put_u32_le(36 + data_len);
    out.put_slice(b"WAVE");

    out.put_slice(b"fmt ");
    out.put_u32_le(16);
    out.put_u16_le(1);
    out.put_u16_le(format.channels);
    out.put_u32_le(format.sample_rate);
    out.put_u32_le(format.byte_rate());
    out.put_u16_le(format.block_align());
    out.put_u16_le(format.bits_per_sample);

    out.put_slice(b"data");
    out.put_u32_le(data_len);
    out.put_slice(pcm);
    Ok(out)
}

/// Writes `pcm` to `path` as a playable WAV file
pub async fn write_wav(path: impl AsRef<Path>, pcm: &[u8], format: PcmFormat) -> Result<()> {
    write_blob(path, &wav(pcm, format)?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        write_blob(&path, &[1, 2, 3]).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.bin");

        let error = write_blob(&path, b"x").await.unwrap_err();
        assert!(matches!(error, crate::Error::Io(_)));
    }

    #[test]
    fn wav_header_describes_live_output() {
        let pcm = [0x01, 0x00, 0xff, 0x7f];
        let wav = wav(&pcm, PcmFormat::LIVE_OUTPUT).unwrap();

        assert_eq!(wav.len(), WAV_HEADER_LEN + pcm.len());
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 40);
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(u32::from_le_bytes(wav[16..20].try_into().unwrap()), 16);
        // PCM, mono
        assert_eq!(u16::from_le_bytes(wav[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 24_000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 48_000);
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(wav[34..36].try_into().unwrap()), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 4);
        assert_eq!(&wav[44..], pcm);
    }

    #[tokio::test]
    async fn writes_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.wav");

        write_wav(&path, &[0; 8], PcmFormat::default()).await.unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), WAV_HEADER_LEN + 8);
        assert_eq!(&written[..4], b"RIFF");
    }
}
