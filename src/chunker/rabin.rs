//! Rabin fingerprint chunker: a polynomial rolling hash over a sliding
//! window, with lookup tables generated once at construction time.

use super::{ChunkEvent, Chunker, EmitFn, InstanceConstants};
use crate::error::{ChunkerError, ConfigError};
use crate::limits::MAX_LEAF_PAYLOAD_SIZE;

/// Degree the configured polynomial must have: the largest prime smaller
/// than `64 - 8`.
const DEG_TARGET: u32 = 53;
const DEG_SHIFT: u32 = DEG_TARGET - 8;

/// The IPFS-default Rabin polynomial (degree 53).
pub const DEFAULT_POLYNOMIAL: u64 = 17_437_180_132_763_653;

fn deg(pol: u64) -> i32 {
    if pol == 0 {
        -1
    } else {
        63 - pol.leading_zeros() as i32
    }
}

fn modulus(mut numerator: u64, denominator: u64) -> u64 {
    if numerator == 0 {
        return 0;
    }
    let denom_deg = deg(denominator);
    loop {
        let diff = deg(numerator) - denom_deg;
        if diff < 0 {
            break;
        }
        numerator ^= denominator << diff as u32;
    }
    numerator
}

fn generate_lookup_tables(pol: u64, window_size: usize) -> Result<([u64; 256], [u64; 256]), ConfigError> {
    if deg(pol) != DEG_TARGET as i32 {
        return Err(ConfigError::single(format!(
            "polynomial '{pol}' has degree {}, but degree {DEG_TARGET} is required",
            deg(pol)
        )));
    }
    if window_size < 8 {
        return Err(ConfigError::single("rabin window_size must be at least 8 bytes"));
    }

    let mut out_table = [0u64; 256];
    for b in 0u64..256 {
        let mut h = modulus(b, pol);
        for _ in 0..window_size - 1 {
            h = modulus(h << 8, pol);
        }
        out_table[b as usize] = h;
    }

    let mut mod_table = [0u64; 256];
    for b in 0u64..256 {
        mod_table[b as usize] = modulus(b << DEG_TARGET, pol) | (b << DEG_TARGET);
    }

    Ok((out_table, mod_table))
}

#[derive(Debug, Clone)]
pub struct RabinConfig {
    pub polynomial: u64,
    pub target: u64,
    pub mask_bits: u32,
    pub window_size: usize,
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for RabinConfig {
    fn default() -> Self {
        Self {
            polynomial: DEFAULT_POLYNOMIAL,
            target: 0,
            mask_bits: 18,
            window_size: 16,
            min_size: 87_381,
            max_size: 393_216,
        }
    }
}

impl RabinConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();
        if !(5..=22).contains(&self.mask_bits) {
            errs.push("rabin mask_bits must be within [5,22]".to_string());
        }
        if self.min_size >= self.max_size {
            errs.push("rabin min_size must be smaller than max_size".to_string());
        }
        if self.max_size > MAX_LEAF_PAYLOAD_SIZE {
            errs.push("rabin max_size exceeds the maximum leaf payload size".to_string());
        }
        if self.min_size < self.window_size {
            errs.push("rabin min_size must be at least window_size".to_string());
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(errs))
        }
    }
}

pub struct RabinChunker {
    cfg: RabinConfig,
    mask: u64,
    init_state: u64,
    min_sans_preheat: usize,
    out_table: [u64; 256],
    mod_table: [u64; 256],
}

impl RabinChunker {
    pub fn new(cfg: RabinConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let (out_table, mod_table) = generate_lookup_tables(cfg.polynomial, cfg.window_size)?;
        let init_state = ((out_table[0] << 8) | 1) ^ mod_table[(out_table[0] >> DEG_SHIFT) as usize];
        let mask = (1u64 << cfg.mask_bits) - 1;
        let min_sans_preheat = cfg.min_size - cfg.window_size;
        Ok(Self { cfg, mask, init_state, min_sans_preheat, out_table, mod_table })
    }
}

impl Chunker for RabinChunker {
    fn split(
        &mut self,
        buf: &[u8],
        must_consume_all: bool,
        emit: &mut EmitFn,
    ) -> Result<usize, ChunkerError> {
        let post_buf_idx = buf.len();
        let mut cur_idx = 0usize;

        loop {
            let last_idx = cur_idx;
            let mut next_round_max = last_idx + self.cfg.max_size;

            if next_round_max > post_buf_idx {
                if !must_consume_all {
                    return Ok(last_idx);
                }
                next_round_max = post_buf_idx;
            }

            if cur_idx + self.cfg.min_size >= post_buf_idx {
                if must_consume_all && post_buf_idx != cur_idx {
                    emit(ChunkEvent { size: post_buf_idx - cur_idx, meta: None })?;
                    cur_idx = post_buf_idx;
                }
                return Ok(cur_idx);
            }

            let mut state = self.init_state;
            cur_idx += self.min_sans_preheat;
            for i in 1..=self.cfg.window_size {
                state ^= if i == self.cfg.window_size { self.out_table[1] } else { self.out_table[0] };
                state = (state << 8) | buf[cur_idx] as u64 ^ self.mod_table[(state >> DEG_SHIFT) as usize];
                cur_idx += 1;
            }

            while cur_idx < next_round_max && (state & self.mask) != self.cfg.target {
                state ^= self.out_table[buf[cur_idx - self.cfg.window_size] as usize];
                state = (state << 8) | buf[cur_idx] as u64 ^ self.mod_table[(state >> DEG_SHIFT) as usize];
                cur_idx += 1;
            }

            emit(ChunkEvent { size: cur_idx - last_idx, meta: None })?;
        }
    }

    fn constants(&self) -> InstanceConstants {
        InstanceConstants { min_chunk_size: self.cfg.min_size, max_chunk_size: self.cfg.max_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_degree_polynomial() {
        let mut cfg = RabinConfig::default();
        cfg.polynomial = 12345;
        assert!(RabinChunker::new(cfg).is_err());
    }

    #[test]
    fn default_polynomial_has_expected_degree() {
        assert_eq!(deg(DEFAULT_POLYNOMIAL), DEG_TARGET as i32);
    }

    #[test]
    fn fully_consumed_input_sums_to_input_length() {
        let data: Vec<u8> = (0u8..=255).cycle().take(500_000).collect();
        let mut cfg = RabinConfig::default();
        cfg.min_size = 1024;
        cfg.max_size = 16384;
        let mut c = RabinChunker::new(cfg).unwrap();
        let mut sizes = Vec::new();
        let consumed = c
            .split(&data, true, &mut |ev| {
                sizes.push(ev.size);
                Ok(())
            })
            .unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(sizes.iter().sum::<usize>(), data.len());
    }

    #[test]
    fn zeros_dont_cut_within_min_size() {
        // 64 KiB of zeros, defaults scaled up: rabin needs entropy in the
        // rolling state to find a cut, an all-zero window under min_size
        // never diverges from the fixed initial state.
        let data = vec![0u8; 64 * 1024];
        let mut cfg = RabinConfig::default();
        cfg.min_size = 128 * 1024;
        cfg.max_size = 256 * 1024;
        let mut c = RabinChunker::new(cfg).unwrap();
        let mut sizes = Vec::new();
        let consumed = c
            .split(&data, true, &mut |ev| {
                sizes.push(ev.size);
                Ok(())
            })
            .unwrap();
        assert_eq!(sizes, vec![data.len()]);
        assert_eq!(consumed, data.len());
    }
}
