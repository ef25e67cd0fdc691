//! WAV container helpers.

/// Wrap raw 16-bit PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_len = pcm.len() * 2; // 2 bytes per i16 sample
    let byte_rate = sample_rate * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let file_size = 36 + data_len as u32;

    let mut wav = Vec::with_capacity(44 + data_len);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &sample in pcm {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

/// Parsed fields of a PCM WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavInfo {
    pub fn duration_ms(&self) -> u64 {
        let byte_rate =
            self.sample_rate as u64 * self.channels as u64 * self.bits_per_sample as u64 / 8;
        if byte_rate == 0 {
            return 0;
        }
        self.data_len as u64 * 1000 / byte_rate
    }
}

/// Parse the fmt and data chunks of a WAV payload. Returns `None` for
/// malformed or non-RIFF input.
pub fn parse_wav(data: &[u8]) -> Option<WavInfo> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return None;
    }

    let mut sample_rate = None;
    let mut channels = None;
    let mut bits_per_sample = None;
    let mut data_len = None;

    // Walk chunks: 4-byte id, 4-byte little-endian size, payload.
    let mut pos = 12;
    while pos + 8 <= data.len() {
        let id = &data[pos..pos + 4];
        let size = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
            as usize;
        let body = pos + 8;

        match id {
            b"fmt " if body + 16 <= data.len() => {
                channels = Some(u16::from_le_bytes([data[body + 2], data[body + 3]]));
                sample_rate = Some(u32::from_le_bytes([
                    data[body + 4],
                    data[body + 5],
                    data[body + 6],
                    data[body + 7],
                ]));
                bits_per_sample = Some(u16::from_le_bytes([data[body + 14], data[body + 15]]));
            }
            b"data" => {
                data_len = Some(size as u32);
            }
            _ => {}
        }

        // Chunks are word-aligned.
        pos = body + size + (size & 1);
    }

    Some(WavInfo {
        sample_rate: sample_rate?,
        channels: channels?,
        bits_per_sample: bits_per_sample?,
        data_len: data_len?,
    })
}
