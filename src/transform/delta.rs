//! k-th order finite differencing.
//!
//! The predictor for element `i` comes from the previous *original* values
//! (`u1` = v[i-1], `u2` = v[i-2], `u3` = v[i-3], all zero before the start):
//!
//! | Level | Predictor |
//! |-------|-----------|
//! | 1 | `u1` |
//! | 2 | `2·u1 − u2` |
//! | 3 | `3·u1 − 3·u2 + u3` |
//!
//! Encode stores `v[i] − p`; decode rebuilds `v[i] = d[i] + p` in increasing
//! index order from already reconstructed values.

use super::{DeltaLevel, ElementWidth, TransformError};

#[derive(Default)]
struct History {
    u1: u64,
    u2: u64,
    u3: u64,
}

impl History {
    #[inline]
    fn predict(&self, level: DeltaLevel) -> u64 {
        match level {
            DeltaLevel::Raw    => 0,
            DeltaLevel::Level1 => self.u1,
            DeltaLevel::Level2 => self.u1.wrapping_mul(2).wrapping_sub(self.u2),
            DeltaLevel::Level3 => self.u1.wrapping_mul(3)
                .wrapping_sub(self.u2.wrapping_mul(3))
                .wrapping_add(self.u3),
        }
    }

    #[inline]
    fn push(&mut self, value: u64) {
        self.u3 = self.u2;
        self.u2 = self.u1;
        self.u1 = value;
    }
}

pub(super) fn encode(data: &[u8], width: ElementWidth, level: DeltaLevel) -> Result<Vec<u8>, TransformError> {
    width.check_aligned(data)?;
    let mask = width.mask();
    let mut out = Vec::with_capacity(data.len());
    let mut history = History::default();
    for element in data.chunks_exact(width.bytes()) {
        let value = width.read(element);
        let delta = value.wrapping_sub(history.predict(level)) & mask;
        history.push(value);
        width.write(delta, &mut out);
    }
    Ok(out)
}

pub(super) fn decode(data: &[u8], width: ElementWidth, level: DeltaLevel) -> Result<Vec<u8>, TransformError> {
    width.check_aligned(data)?;
    let mask = width.mask();
    let mut out = Vec::with_capacity(data.len());
    let mut history = History::default();
    for element in data.chunks_exact(width.bytes()) {
        let value = width.read(element).wrapping_add(history.predict(level)) & mask;
        history.push(value);
        width.write(value, &mut out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp16() -> Vec<u8> {
        (0u16..=255).flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn ramp_round_trips_at_every_level() {
        let ramp = ramp16();
        for level in [DeltaLevel::Level1, DeltaLevel::Level2, DeltaLevel::Level3] {
            let encoded = encode(&ramp, ElementWidth::Bits16, level).unwrap();
            assert_eq!(decode(&encoded, ElementWidth::Bits16, level).unwrap(), ramp, "{level:?}");
        }
    }

    #[test]
    fn first_order_of_ramp_is_ones() {
        let encoded = encode(&ramp16(), ElementWidth::Bits16, DeltaLevel::Level1).unwrap();
        let values: Vec<u16> = encoded.chunks(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
        assert_eq!(values[0], 0);
        assert!(values[1..].iter().all(|&d| d == 1));
    }

    #[test]
    fn second_order_of_ramp_is_flat_after_warmup() {
        let encoded = encode(&ramp16(), ElementWidth::Bits16, DeltaLevel::Level2).unwrap();
        let values: Vec<u16> = encoded.chunks(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
        // v0 = 0, v1 = 1 - 2*0 + 0
        assert_eq!(&values[..2], &[0, 1]);
        assert!(values[2..].iter().all(|&d| d == 0));
    }

    #[test]
    fn third_order_matches_binomial_recurrence() {
        let input: Vec<u16> = vec![5, 9, 20, 41, 30, 2, 65535, 7];
        let bytes: Vec<u8> = input.iter().flat_map(|v| v.to_be_bytes()).collect();
        let encoded = encode(&bytes, ElementWidth::Bits16, DeltaLevel::Level3).unwrap();
        let d: Vec<i64> = encoded.chunks(2).map(|c| u16::from_be_bytes([c[0], c[1]]) as i64).collect();

        let mut v = [0i64; 3];
        for (i, &expected) in input.iter().enumerate() {
            let next = (3 * v[0] - 3 * v[1] + v[2] + d[i]).rem_euclid(1 << 16);
            assert_eq!(next, expected as i64);
            v = [next, v[0], v[1]];
        }
    }

    #[test]
    fn wraps_at_eight_bits() {
        let data = [250u8, 3, 255, 0];
        let encoded = encode(&data, ElementWidth::Bits8, DeltaLevel::Level2).unwrap();
        assert_eq!(decode(&encoded, ElementWidth::Bits8, DeltaLevel::Level2).unwrap(), data);
    }

    #[test]
    fn rejects_misaligned_input() {
        assert_eq!(
            decode(&[1, 2, 3], ElementWidth::Bits16, DeltaLevel::Level1),
            Err(TransformError::Misaligned { len: 3, width: 2 })
        );
    }
}
