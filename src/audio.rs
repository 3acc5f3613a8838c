//! Content-analysis collaborator: symphonia decode, stratum-dsp beat
//! tracking for tempo, and frame-based feature extraction for the rest.
//!
//! Every computed attribute is a scalar summary (a mean) of a per-frame
//! analysis over the decoded mono signal. Frames are 2048 samples with a
//! 512-sample hop and a Hann window; spectral features run on the magnitude
//! spectrum of each frame.

use std::f64::consts::PI;
use std::path::Path;

use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;
use tracing::debug;

use crate::resolve::ContentAnalyzer;

const FRAME_LEN: usize = 2048;
const HOP_LEN: usize = 512;
const N_MELS: usize = 26;
const N_MFCC: usize = 13;
const CHROMA_BINS: usize = 12;

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an audio file to mono f32 samples.
pub fn decode_to_samples(path: &Path) -> Result<(Vec<f32>, u32), String> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("failed to open audio file '{}': {e}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("failed to probe audio format: {e}"))?;

    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| "no audio track found in file".to_string())?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| "audio track has no sample rate".to_string())?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("failed to create decoder: {e}"))?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format_reader.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(format!("error reading packet: {e}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                debug!("decode warning: {e}");
                continue;
            }
            Err(e) => return Err(format!("decode error: {e}")),
        };

        let mono = decode_buffer_to_mono(&decoded);
        all_samples.extend_from_slice(&mono);
    }

    if all_samples.is_empty() {
        return Err("decoded zero audio samples".to_string());
    }

    Ok((all_samples, sample_rate))
}

/// Convert an AudioBufferRef to mono f32 samples by averaging channels.
fn decode_buffer_to_mono(buf: &AudioBufferRef) -> Vec<f32> {
    match buf {
        AudioBufferRef::F32(b) => mix_to_mono(b.planes().planes(), |&v| v),
        AudioBufferRef::F64(b) => mix_to_mono(b.planes().planes(), |&v| v as f32),
        AudioBufferRef::S8(b) => mix_to_mono(b.planes().planes(), |&v| v as f32 / 128.0),
        AudioBufferRef::S16(b) => mix_to_mono(b.planes().planes(), |&v| v as f32 / 32768.0),
        AudioBufferRef::S24(b) => {
            mix_to_mono(b.planes().planes(), |v| v.inner() as f32 / 8388608.0)
        }
        AudioBufferRef::S32(b) => mix_to_mono(b.planes().planes(), |&v| v as f32 / 2147483648.0),
        AudioBufferRef::U8(b) => mix_to_mono(b.planes().planes(), |&v| (v as f32 - 128.0) / 128.0),
        AudioBufferRef::U16(b) => {
            mix_to_mono(b.planes().planes(), |&v| (v as f32 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(b) => mix_to_mono(b.planes().planes(), |v| {
            (v.inner() as f32 - 8388608.0) / 8388608.0
        }),
        AudioBufferRef::U32(b) => mix_to_mono(b.planes().planes(), |&v| {
            (v as f64 - 2147483648.0) as f32 / 2147483648.0
        }),
    }
}

/// Mix multiple channels to mono by averaging, using a conversion function.
fn mix_to_mono<T, F>(planes: &[&[T]], convert: F) -> Vec<f32>
where
    F: Fn(&T) -> f32,
{
    if planes.is_empty() {
        return Vec::new();
    }
    let num_channels = planes.len();
    let num_frames = planes[0].len();

    if num_channels == 1 {
        return planes[0].iter().map(&convert).collect();
    }

    let scale = 1.0 / num_channels as f32;
    (0..num_frames)
        .map(|i| {
            let sum: f32 = planes.iter().map(|ch| convert(&ch[i])).sum();
            sum * scale
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Spectral plumbing
// ---------------------------------------------------------------------------

/// In-place iterative radix-2 FFT over interleaved (re, im) pairs.
fn fft(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    debug_assert!(n.is_power_of_two());

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let (w_re, w_im) = (angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let (mut cur_re, mut cur_im) = (1.0f64, 0.0f64);
            for k in 0..len / 2 {
                let even_re = re[start + k];
                let even_im = im[start + k];
                let odd_re = re[start + k + len / 2] * cur_re - im[start + k + len / 2] * cur_im;
                let odd_im = re[start + k + len / 2] * cur_im + im[start + k + len / 2] * cur_re;
                re[start + k] = even_re + odd_re;
                im[start + k] = even_im + odd_im;
                re[start + k + len / 2] = even_re - odd_re;
                im[start + k + len / 2] = even_im - odd_im;
                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len <<= 1;
    }
}

/// Magnitude spectrum (FRAME_LEN/2 + 1 bins) of one Hann-windowed frame.
fn magnitude_spectrum(frame: &[f32]) -> Vec<f64> {
    let n = FRAME_LEN;
    let mut re = vec![0.0f64; n];
    let mut im = vec![0.0f64; n];
    for (i, &s) in frame.iter().take(n).enumerate() {
        let window = 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos();
        re[i] = s as f64 * window;
    }
    fft(&mut re, &mut im);
    (0..=n / 2)
        .map(|k| (re[k] * re[k] + im[k] * im[k]).sqrt())
        .collect()
}

/// Iterate full frames of the signal at the standard hop.
fn frames(samples: &[f32]) -> impl Iterator<Item = &[f32]> {
    samples
        .windows(FRAME_LEN)
        .step_by(HOP_LEN)
        .filter(|w| w.len() == FRAME_LEN)
}

/// Per-frame magnitude spectra. Errors when the signal is shorter than one
/// frame.
fn spectra(samples: &[f32]) -> Result<Vec<Vec<f64>>, String> {
    let spectra: Vec<Vec<f64>> = frames(samples).map(magnitude_spectrum).collect();
    if spectra.is_empty() {
        return Err(format!(
            "signal too short for analysis ({} samples, need {FRAME_LEN})",
            samples.len()
        ));
    }
    Ok(spectra)
}

fn bin_frequency(bin: usize, sample_rate: u32) -> f64 {
    bin as f64 * sample_rate as f64 / FRAME_LEN as f64
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// Mean root-mean-square energy across frames.
fn rms_energy(samples: &[f32]) -> Result<f64, String> {
    let values: Vec<f64> = frames(samples)
        .map(|frame| {
            let sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sq / frame.len() as f64).sqrt()
        })
        .collect();
    if values.is_empty() {
        return Err("signal too short for RMS analysis".to_string());
    }
    Ok(mean(values.into_iter()))
}

/// Mean zero-crossing rate (crossings per sample) across frames.
fn zero_crossing_rate(samples: &[f32]) -> Result<f64, String> {
    let values: Vec<f64> = frames(samples)
        .map(|frame| {
            let crossings = frame
                .windows(2)
                .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
                .count();
            crossings as f64 / frame.len() as f64
        })
        .collect();
    if values.is_empty() {
        return Err("signal too short for ZCR analysis".to_string());
    }
    Ok(mean(values.into_iter()))
}

/// Mean spectral centroid in Hz.
fn spectral_centroid(samples: &[f32], sample_rate: u32) -> Result<f64, String> {
    let spectra = spectra(samples)?;
    Ok(mean(spectra.iter().map(|mags| {
        let total: f64 = mags.iter().sum();
        if total <= f64::EPSILON {
            return 0.0;
        }
        let weighted: f64 = mags
            .iter()
            .enumerate()
            .map(|(bin, &m)| bin_frequency(bin, sample_rate) * m)
            .sum();
        weighted / total
    })))
}

/// Per-frame onset envelope: positive spectral flux against the previous
/// frame, zero for the first.
fn onset_envelope(spectra: &[Vec<f64>]) -> Vec<f64> {
    let mut envelope = Vec::with_capacity(spectra.len());
    envelope.push(0.0);
    for pair in spectra.windows(2) {
        let flux: f64 = pair[0]
            .iter()
            .zip(pair[1].iter())
            .map(|(&prev, &cur)| (cur - prev).max(0.0))
            .sum();
        envelope.push(flux / pair[0].len() as f64);
    }
    envelope
}

/// Mean onset strength.
fn onset_strength(samples: &[f32]) -> Result<f64, String> {
    let spectra = spectra(samples)?;
    Ok(mean(onset_envelope(&spectra).into_iter()))
}

/// Mean spectral contrast: per-frame, per-band difference between the log
/// of the strongest and weakest quintile of bin magnitudes.
fn spectral_contrast(samples: &[f32], sample_rate: u32) -> Result<f64, String> {
    const BAND_EDGES_HZ: &[f64] = &[0.0, 200.0, 400.0, 800.0, 1600.0, 3200.0];
    let spectra = spectra(samples)?;
    let nyquist = sample_rate as f64 / 2.0;

    let mut band_values = Vec::new();
    for mags in &spectra {
        for (i, &low) in BAND_EDGES_HZ.iter().enumerate() {
            let high = BAND_EDGES_HZ.get(i + 1).copied().unwrap_or(nyquist);
            let mut band: Vec<f64> = mags
                .iter()
                .enumerate()
                .filter(|(bin, _)| {
                    let f = bin_frequency(*bin, sample_rate);
                    f >= low && f < high
                })
                .map(|(_, &m)| m)
                .collect();
            if band.len() < 4 {
                continue;
            }
            band.sort_by(|a, b| a.total_cmp(b));
            let quintile = (band.len() / 5).max(1);
            let valley = mean(band.iter().take(quintile).copied()) + 1e-10;
            let peak = mean(band.iter().rev().take(quintile).copied()) + 1e-10;
            band_values.push(peak.ln() - valley.ln());
        }
    }
    if band_values.is_empty() {
        return Err("signal too short for contrast analysis".to_string());
    }
    Ok(mean(band_values.into_iter()))
}

/// Per-frame 12-bin chroma vectors, each normalized by its peak.
fn chroma_frames(spectra: &[Vec<f64>], sample_rate: u32) -> Vec<[f64; CHROMA_BINS]> {
    spectra
        .iter()
        .map(|mags| {
            let mut chroma = [0.0f64; CHROMA_BINS];
            for (bin, &m) in mags.iter().enumerate().skip(1) {
                let freq = bin_frequency(bin, sample_rate);
                if freq < 27.5 || freq > 4200.0 {
                    continue;
                }
                let midi = 69.0 + 12.0 * (freq / 440.0).log2();
                let class = (midi.round() as i64).rem_euclid(12) as usize;
                chroma[class] += m;
            }
            let peak = chroma.iter().cloned().fold(0.0f64, f64::max);
            if peak > f64::EPSILON {
                for value in &mut chroma {
                    *value /= peak;
                }
            }
            chroma
        })
        .collect()
}

/// Mean of the normalized chroma representation.
fn chroma_mean(samples: &[f32], sample_rate: u32) -> Result<f64, String> {
    let spectra = spectra(samples)?;
    let chroma = chroma_frames(&spectra, sample_rate);
    Ok(mean(chroma.iter().flat_map(|c| c.iter().copied())))
}

/// Mean of the 6-dimensional tonal centroid (Tonnetz) projection of the
/// chroma frames: fifths, minor-third and major-third circles.
fn tonnetz_mean(samples: &[f32], sample_rate: u32) -> Result<f64, String> {
    let spectra = spectra(samples)?;
    let chroma = chroma_frames(&spectra, sample_rate);

    let mut values = Vec::with_capacity(chroma.len() * 6);
    for frame in &chroma {
        let norm: f64 = frame.iter().sum::<f64>().max(f64::EPSILON);
        // (interval in semitones, radius) per circle pair.
        for &(interval, radius) in &[(7.0, 1.0), (3.0, 1.0), (4.0, 0.5)] {
            let mut sin_sum = 0.0;
            let mut cos_sum = 0.0;
            for (class, &energy) in frame.iter().enumerate() {
                let angle = class as f64 * interval * 2.0 * PI / 12.0;
                sin_sum += energy * angle.sin();
                cos_sum += energy * angle.cos();
            }
            values.push(radius * sin_sum / norm);
            values.push(radius * cos_sum / norm);
        }
    }
    Ok(mean(values.into_iter()))
}

/// Tempo estimate in BPM via stratum-dsp beat tracking over the decoded
/// signal.
fn tempo_estimate(samples: &[f32], sample_rate: u32) -> Result<f64, String> {
    if samples.len() < FRAME_LEN {
        return Err(format!(
            "signal too short for tempo analysis ({} samples, need {FRAME_LEN})",
            samples.len()
        ));
    }
    let config = stratum_dsp::AnalysisConfig::default();
    let result = stratum_dsp::analyze_audio(samples, sample_rate, config)
        .map_err(|e| format!("tempo analysis error: {e}"))?;
    let bpm = result.bpm as f64;
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(format!("beat tracker produced no usable tempo ({bpm})"));
    }
    Ok(bpm)
}

/// Triangular mel filterbank energies, log-compressed, per frame.
fn mel_energies(mags: &[f64], sample_rate: u32) -> [f64; N_MELS] {
    let hz_to_mel = |hz: f64| 2595.0 * (1.0 + hz / 700.0).log10();
    let mel_to_hz = |mel: f64| 700.0 * (10f64.powf(mel / 2595.0) - 1.0);

    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let centers: Vec<f64> = (0..N_MELS + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (N_MELS + 1) as f64))
        .collect();

    let mut energies = [0.0f64; N_MELS];
    for (m, energy) in energies.iter_mut().enumerate() {
        let (lo, mid, hi) = (centers[m], centers[m + 1], centers[m + 2]);
        let mut acc = 0.0;
        for (bin, &mag) in mags.iter().enumerate() {
            let f = bin_frequency(bin, sample_rate);
            let weight = if f >= lo && f <= mid && mid > lo {
                (f - lo) / (mid - lo)
            } else if f > mid && f <= hi && hi > mid {
                (hi - f) / (hi - mid)
            } else {
                0.0
            };
            acc += weight * mag * mag;
        }
        *energy = (acc + 1e-10).ln();
    }
    energies
}

/// Per-frame MFCC vectors (DCT-II of the log mel energies).
fn mfcc_frames(spectra: &[Vec<f64>], sample_rate: u32) -> Vec<[f64; N_MFCC]> {
    spectra
        .iter()
        .map(|mags| {
            let mel = mel_energies(mags, sample_rate);
            let mut coeffs = [0.0f64; N_MFCC];
            for (k, coeff) in coeffs.iter_mut().enumerate() {
                *coeff = mel
                    .iter()
                    .enumerate()
                    .map(|(n, &e)| e * (PI * k as f64 * (n as f64 + 0.5) / N_MELS as f64).cos())
                    .sum();
            }
            coeffs
        })
        .collect()
}

/// Mean over the full MFCC matrix.
fn mfcc_mean(samples: &[f32], sample_rate: u32) -> Result<f64, String> {
    let spectra = spectra(samples)?;
    let mfccs = mfcc_frames(&spectra, sample_rate);
    Ok(mean(mfccs.iter().flat_map(|c| c.iter().copied())))
}

/// Mean of the frame-to-frame MFCC deltas.
fn mfcc_delta_mean(samples: &[f32], sample_rate: u32) -> Result<f64, String> {
    let spectra = spectra(samples)?;
    let mfccs = mfcc_frames(&spectra, sample_rate);
    if mfccs.len() < 2 {
        return Err("signal too short for delta analysis".to_string());
    }
    Ok(mean(mfccs.windows(2).flat_map(|pair| {
        pair[1]
            .iter()
            .zip(pair[0].iter())
            .map(|(&cur, &prev)| cur - prev)
            .collect::<Vec<f64>>()
    })))
}

/// Mean of per-frame first-order polynomial fits (intercept and slope of
/// magnitude against frequency).
fn poly_features_mean(samples: &[f32], sample_rate: u32) -> Result<f64, String> {
    let spectra = spectra(samples)?;
    let mut values = Vec::with_capacity(spectra.len() * 2);
    for mags in &spectra {
        let n = mags.len() as f64;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_xx = 0.0;
        for (bin, &m) in mags.iter().enumerate() {
            let x = bin_frequency(bin, sample_rate);
            sum_x += x;
            sum_y += m;
            sum_xy += x * m;
            sum_xx += x * x;
        }
        let denom = n * sum_xx - sum_x * sum_x;
        if denom.abs() < f64::EPSILON {
            continue;
        }
        let slope = (n * sum_xy - sum_x * sum_y) / denom;
        let intercept = (sum_y - slope * sum_x) / n;
        values.push(slope);
        values.push(intercept);
    }
    if values.is_empty() {
        return Err("signal too short for polynomial analysis".to_string());
    }
    Ok(mean(values.into_iter()))
}

/// Compute the named feature over a decoded signal.
pub fn compute_feature(samples: &[f32], sample_rate: u32, key: &str) -> Result<f64, String> {
    match key {
        "energy_local" => rms_energy(samples),
        "brightness" => spectral_centroid(samples, sample_rate),
        "percussiveness_zcr" => zero_crossing_rate(samples),
        "percussiveness_onset" => onset_strength(samples),
        "contrast" => spectral_contrast(samples, sample_rate),
        "style_and_key_similarity" => tonnetz_mean(samples, sample_rate),
        "bpm" | "beats_per_minute" => tempo_estimate(samples, sample_rate),
        "music_genre" => mfcc_mean(samples, sample_rate),
        "harmonic_content_key" => chroma_mean(samples, sample_rate),
        "timbral_changes" => poly_features_mean(samples, sample_rate),
        "dynamic_changes" => mfcc_delta_mean(samples, sample_rate),
        other => Err(format!("no analyzer feature for attribute '{other}'")),
    }
}

/// The decode-then-analyze collaborator used by the real pipeline.
pub struct LocalAnalyzer;

impl ContentAnalyzer for LocalAnalyzer {
    fn feature(&self, path: &Path, key: &str) -> Result<f64, String> {
        let (samples, sample_rate) = decode_to_samples(path)?;
        compute_feature(&samples, sample_rate, key)
    }
}
