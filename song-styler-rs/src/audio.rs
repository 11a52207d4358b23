//! Audio file discovery and decoding to mono PCM.

use crate::{Result, StylerError};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const SUPPORTED_EXTS: &[&str] = &[".wav", ".mp3", ".flac", ".ogg", ".m4a", ".webm"];

/// Mono samples in `[-1, 1]` at the source sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

pub fn read_audio_file(path: &Path) -> Result<DecodedAudio> {
    let bytes = std::fs::read(path)?;
    decode_audio(&bytes)
        .map_err(|e| StylerError::Decode(format!("{}: {}", path.display(), e)))
}

/// Decode any supported container. WAV goes through hound, the rest
/// (and WAV variants hound rejects) through symphonia.
pub fn decode_audio(bytes: &[u8]) -> Result<DecodedAudio> {
    if bytes.starts_with(b"RIFF") {
        match decode_wav(bytes) {
            Ok(audio) => return Ok(audio),
            Err(e) => debug!(error = %e, "hound rejected wav, falling back to symphonia"),
        }
    }
    decode_with_symphonia(bytes)
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let decode_err = |e: hound::Error| StylerError::Decode(e.to_string());
    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(decode_err)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(decode_err)?
        }
    };
    Ok(DecodedAudio {
        samples: downmix(&interleaved, spec.channels as usize),
        sample_rate: spec.sample_rate,
    })
}

fn decode_with_symphonia(bytes: &[u8]) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::default::{get_codecs, get_probe};

    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());
    let probed = get_probe()
        .format(
            &Default::default(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| StylerError::Decode(e.to_string()))?;
    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .cloned()
        .ok_or_else(|| StylerError::Decode("no decodable audio track".into()))?;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| StylerError::Decode(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track.id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend(downmix(buf.samples(), spec.channels.count()));
            }
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(_) => break,
        }
    }
    if samples.is_empty() || sample_rate == 0 {
        return Err(StylerError::Decode("no audio frames decoded".into()));
    }
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Recursively expand audio files from provided paths
pub fn expand_audio_files(inputs: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for p in inputs {
        if p.is_file() {
            if is_supported(&p) {
                out.push(p);
            }
        } else if p.is_dir() {
            for entry in WalkDir::new(&p).sort_by_file_name() {
                let e = entry.map_err(|e| StylerError::Other(e.to_string()))?;
                if e.file_type().is_file() && is_supported(e.path()) {
                    out.push(e.path().to_path_buf());
                }
            }
        } else {
            return Err(StylerError::Invalid(format!(
                "Path not found: {}",
                p.display()
            )));
        }
    }
    Ok(out)
}

fn is_supported(p: &Path) -> bool {
    p.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = format!(".{}", ext).to_lowercase();
            SUPPORTED_EXTS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
