//! Token-bag SimHash fingerprinting.
//!
//! A 64-bit fingerprint is computed from a weighted token bag: each token
//! hashes to 64 bits (FNV-1a) and votes +1/−1 per bit position; the final
//! bit is set where the vote is positive. Near-duplicate symbols land at a
//! small Hamming distance, which is the similarity metric downstream.
//!
//! The fingerprint is split into four non-overlapping 16-bit bands used as
//! bucket keys for candidate generation: two fingerprints within Hamming
//! distance 3 of each other are guaranteed to agree on at least one band.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit SimHash plus its four band keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub value: u64,
    pub bands: [u16; 4],
}

impl Fingerprint {
    /// Compute the SimHash of a token bag. Blank tokens are ignored.
    /// Deterministic and pure; an empty bag yields fingerprint 0 with all
    /// bands 0.
    pub fn of_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut weights = [0i32; 64];

        for token in tokens {
            let token = token.as_ref();
            if token.trim().is_empty() {
                continue;
            }
            let hash = fnv1a_64(token.as_bytes());
            for (bit, weight) in weights.iter_mut().enumerate() {
                if hash >> bit & 1 == 1 {
                    *weight += 1;
                } else {
                    *weight -= 1;
                }
            }
        }

        let mut value = 0u64;
        for (bit, weight) in weights.iter().enumerate() {
            if *weight > 0 {
                value |= 1 << bit;
            }
        }

        Self::from_value(value)
    }

    /// Rebuild a fingerprint (with bands) from a stored 64-bit value.
    pub fn from_value(value: u64) -> Self {
        let bands = [
            (value & 0xffff) as u16,
            (value >> 16 & 0xffff) as u16,
            (value >> 32 & 0xffff) as u16,
            (value >> 48 & 0xffff) as u16,
        ];
        Self { value, bands }
    }

    /// Hamming distance to another fingerprint, in [0, 64].
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.value ^ other.value).count_ones()
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        let fp = Fingerprint::of_tokens(Vec::<String>::new());
        assert_eq!(fp.value, 0);
        assert_eq!(fp.bands, [0, 0, 0, 0]);
    }

    #[test]
    fn blank_tokens_are_ignored() {
        let fp = Fingerprint::of_tokens(["", "  ", "\t"]);
        assert_eq!(fp.value, 0);
    }

    #[test]
    fn deterministic_across_calls() {
        let tokens = ["parse", "http", "response", "token"];
        let a = Fingerprint::of_tokens(tokens);
        let b = Fingerprint::of_tokens(tokens);
        assert_eq!(a, b);
    }

    #[test]
    fn bands_cover_the_fingerprint() {
        let fp = Fingerprint::of_tokens(["alpha", "beta", "gamma"]);
        let rebuilt = u64::from(fp.bands[0])
            | u64::from(fp.bands[1]) << 16
            | u64::from(fp.bands[2]) << 32
            | u64::from(fp.bands[3]) << 48;
        assert_eq!(rebuilt, fp.value);
    }

    #[test]
    fn distance_is_symmetric_and_bounded() {
        let a = Fingerprint::of_tokens(["user", "service", "login"]);
        let b = Fingerprint::of_tokens(["user", "service", "logout"]);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert!(a.distance(&b) <= 64);
        assert_eq!(a.distance(&a), 0);
    }

    #[test]
    fn single_token_change_stays_close() {
        // Two bags differing by one token out of sixty stay much closer
        // than unrelated fingerprints (expected distance ~32).
        let base: Vec<String> = (0..60).map(|i| format!("token{i}")).collect();
        let mut changed = base.clone();
        changed[59] = "different".to_string();

        let a = Fingerprint::of_tokens(&base);
        let b = Fingerprint::of_tokens(&changed);
        assert!(
            a.distance(&b) <= 12,
            "distance {} exceeds similarity budget",
            a.distance(&b)
        );
    }

    #[test]
    fn fnv_matches_reference_vectors() {
        // Published FNV-1a 64 test vectors.
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171f73967e8);
    }
}
