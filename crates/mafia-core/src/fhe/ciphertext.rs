//! Ciphertexts, plaintexts and homomorphic evaluation

use super::{b64, decode_point, encode_point, PublicKey, POINT_LEN};
use crate::{Error, Result};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[cfg(feature = "multi-thread")]
use rayon::prelude::*;

/// Bytes used by the slot-count header
const HEADER_LEN: usize = 4;

/// One encrypted slot `(c1, c2) = (r·G, m·G + r·PK)`
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub c1: ProjectivePoint,
    pub c2: ProjectivePoint,
}

/// Encrypted vector
///
/// Carries nothing but its slots: a one-hot vector and an all-zero vector of
/// the same length serialize to the same number of bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Ciphertext {
    slots: Vec<Slot>,
}

impl Ciphertext {
    pub(crate) fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Number of encrypted slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Byte length of the wire encoding for `slots` slots
    pub fn encoded_len(slots: usize) -> usize {
        HEADER_LEN + slots * 2 * POINT_LEN
    }

    /// Fixed-width binary encoding: `u32` slot count then `(c1, c2)` pairs
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::encoded_len(self.slots.len()));
        out.extend_from_slice(&(self.slots.len() as u32).to_be_bytes());
        for slot in &self.slots {
            out.extend_from_slice(&encode_point(&slot.c1));
            out.extend_from_slice(&encode_point(&slot.c2));
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Deserialization("ciphertext header truncated".into()));
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);
        let count = u32::from_be_bytes(header) as usize;

        if bytes.len() != Self::encoded_len(count) {
            return Err(Error::Deserialization(format!(
                "ciphertext with {} slots must be {} bytes, got {}",
                count,
                Self::encoded_len(count),
                bytes.len()
            )));
        }

        let slots = bytes[HEADER_LEN..]
            .chunks(2 * POINT_LEN)
            .map(|pair| {
                Ok(Slot {
                    c1: decode_point(&pair[..POINT_LEN])?,
                    c2: decode_point(&pair[POINT_LEN..])?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { slots })
    }

    /// Short digest for log correlation
    pub fn fingerprint(&self) -> String {
        hex::encode(&blake3::hash(&self.to_bytes()).as_bytes()[..6])
    }

    fn check_len(&self, other: usize) -> Result<()> {
        if self.slots.len() != other {
            return Err(Error::Shape {
                expected: self.slots.len(),
                actual: other,
            });
        }
        Ok(())
    }

    /// EvalAdd: slot-wise sum of two ciphertexts
    pub fn add(&self, other: &Ciphertext) -> Result<Ciphertext> {
        self.check_len(other.len())?;
        let slots = self
            .slots
            .iter()
            .zip(&other.slots)
            .map(|(a, b)| Slot {
                c1: a.c1 + b.c1,
                c2: a.c2 + b.c2,
            })
            .collect();
        Ok(Ciphertext { slots })
    }

    /// EvalMult by a plaintext vector, slot-wise
    pub fn mul_plain(&self, weights: &[u64]) -> Result<Ciphertext> {
        self.check_len(weights.len())?;
        let slots = self
            .slots
            .iter()
            .zip(weights)
            .map(|(slot, w)| {
                let w = Scalar::from(*w);
                Slot {
                    c1: slot.c1 * w,
                    c2: slot.c2 * w,
                }
            })
            .collect();
        Ok(Ciphertext { slots })
    }

    /// EvalSum: fold all slots into a single-slot ciphertext
    pub fn sum_slots(&self) -> Ciphertext {
        let slot = self.slots.iter().fold(
            Slot {
                c1: ProjectivePoint::IDENTITY,
                c2: ProjectivePoint::IDENTITY,
            },
            |acc, s| Slot {
                c1: acc.c1 + s.c1,
                c2: acc.c2 + s.c2,
            },
        );
        Ciphertext { slots: vec![slot] }
    }

    /// Dot product with a constant vector
    pub fn inner_product(&self, weights: &[u64]) -> Result<Ciphertext> {
        Ok(self.mul_plain(weights)?.sum_slots())
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext(len={}, fp={})", self.len(), self.fingerprint())
    }
}

impl Serialize for Ciphertext {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&b64::encode(&self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for Ciphertext {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = b64::decode(&s).map_err(serde::de::Error::custom)?;
        Ciphertext::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Encrypt a plaintext vector slot by slot under `key`
pub fn encrypt<R: RngCore + CryptoRng>(
    key: &PublicKey,
    values: &[u64],
    rng: &mut R,
) -> Ciphertext {
    // Sample sequentially so a seeded rng stays reproducible under rayon.
    let nonces: Vec<Scalar> = values.iter().map(|_| Scalar::random(&mut *rng)).collect();
    let pk = *key.point();

    let encrypt_slot = |(m, r): (&u64, &Scalar)| Slot {
        c1: ProjectivePoint::GENERATOR * r,
        c2: ProjectivePoint::GENERATOR * Scalar::from(*m) + pk * r,
    };

    #[cfg(feature = "multi-thread")]
    let slots = values.par_iter().zip(nonces.par_iter()).map(encrypt_slot).collect();
    #[cfg(not(feature = "multi-thread"))]
    let slots = values.iter().zip(nonces.iter()).map(encrypt_slot).collect();

    Ciphertext { slots }
}

/// Decrypted vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plaintext(pub Vec<u64>);

impl Plaintext {
    pub fn values(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every slot is zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhe::keygen_lead;
    use rand::rngs::OsRng;

    #[test]
    fn test_encoded_len_is_shape_only() {
        let pair = keygen_lead(&mut OsRng);
        let one_hot = encrypt(&pair.public, &[0, 0, 1, 0], &mut OsRng);
        let zero = encrypt(&pair.public, &[0, 0, 0, 0], &mut OsRng);

        assert_eq!(one_hot.to_bytes().len(), zero.to_bytes().len());
        assert_eq!(one_hot.to_bytes().len(), Ciphertext::encoded_len(4));
    }

    #[test]
    fn test_bytes_roundtrip_and_truncation() {
        let pair = keygen_lead(&mut OsRng);
        let ct = encrypt(&pair.public, &[3, 1], &mut OsRng);
        let bytes = ct.to_bytes();

        assert_eq!(Ciphertext::from_bytes(&bytes).unwrap(), ct);
        assert!(Ciphertext::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(Ciphertext::from_bytes(&[0, 0]).is_err());
    }

    #[test]
    fn test_add_rejects_shape_mismatch() {
        let pair = keygen_lead(&mut OsRng);
        let a = encrypt(&pair.public, &[1, 0, 0], &mut OsRng);
        let b = encrypt(&pair.public, &[1, 0], &mut OsRng);

        assert!(matches!(
            a.add(&b),
            Err(Error::Shape {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_inner_product_keeps_single_slot() {
        let pair = keygen_lead(&mut OsRng);
        let ct = encrypt(&pair.public, &[0, 1, 0, 0], &mut OsRng);
        let probe = ct.inner_product(&[0, 1, 0, 0]).unwrap();
        assert_eq!(probe.len(), 1);
    }
}
