use exif::Rational;

/// Denominators for the degrees, minutes and seconds components.
const DENOMINATORS: [u32; 3] = [1, 1, 100];

/// Latitude or longitude magnitude as EXIF degrees/minutes/seconds rationals.
///
/// Seconds are stored x100 and truncated, so decoding is within one hundredth
/// of an arc-second of the encoded value. The sign lives in the separate
/// hemisphere reference, never here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsRational {
    pub degrees: u32,
    pub minutes: u32,
    pub centiseconds: u32,
}

impl GpsRational {
    /// Split `|value|` into whole degrees, whole minutes and truncated centiseconds.
    pub fn encode(value: f64) -> Self {
        let value = value.abs();
        let degrees = value.trunc();
        let minutes_f = (value - degrees) * 60.0;
        let minutes = minutes_f.trunc();
        let centiseconds = ((minutes_f - minutes) * 60.0 * 100.0).trunc();
        Self {
            degrees: degrees as u32,
            minutes: minutes as u32,
            centiseconds: centiseconds as u32,
        }
    }

    /// The three `(numerator, denominator)` pairs in EXIF order.
    pub fn pairs(&self) -> [(u32, u32); 3] {
        [
            (self.degrees, DENOMINATORS[0]),
            (self.minutes, DENOMINATORS[1]),
            (self.centiseconds, DENOMINATORS[2]),
        ]
    }

    pub fn rationals(&self) -> Vec<Rational> {
        self.pairs()
            .iter()
            .map(|&(num, denom)| Rational { num, denom })
            .collect()
    }

    /// 24-byte little-endian layout: three (numerator, denominator) u32 pairs.
    pub fn to_le_bytes(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        for (i, (num, denom)) in self.pairs().into_iter().enumerate() {
            out[i * 8..i * 8 + 4].copy_from_slice(&num.to_le_bytes());
            out[i * 8 + 4..i * 8 + 8].copy_from_slice(&denom.to_le_bytes());
        }
        out
    }

    /// Magnitude in decimal degrees.
    pub fn to_degrees(&self) -> f64 {
        decode_rationals(&self.rationals()).unwrap_or_default()
    }
}

/// Decode a degrees/minutes/seconds rational triplet back to decimal degrees.
pub fn decode_rationals(values: &[Rational]) -> Option<f64> {
    let [d, m, s] = values else {
        return None;
    };
    if d.denom == 0 || m.denom == 0 || s.denom == 0 {
        return None;
    }
    Some(d.to_f64() + m.to_f64() / 60.0 + s.to_f64() / 3600.0)
}

/// Hemisphere reference byte: `positive` for `value >= 0`, otherwise `negative`.
pub fn hemisphere(value: f64, positive: u8, negative: u8) -> u8 {
    if value >= 0.0 {
        positive
    } else {
        negative
    }
}

/// Single-rational altitude in whole metres.
///
/// Only the magnitude is stored. No `GPSAltitudeRef` entry is written, so an
/// altitude below sea level reads back as the same height above it.
pub fn encode_altitude(value: f64) -> Rational {
    Rational {
        num: value.abs().trunc() as u32,
        denom: 1,
    }
}
