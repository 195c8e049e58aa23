//! Homomorphic encryption capability
//!
//! Threshold additively-homomorphic encryption over secp256k1 ("lifted"
//! ElGamal). Every slot of a vector is encrypted independently as
//! `(r·G, m·G + r·PK)`, so ciphertexts support slot-wise addition and
//! multiplication by plaintext constants, which is all the role, vote and
//! investigation circuits need.
//!
//! Decryption is strictly N-of-N: the joint secret is the sum of every
//! party's secret share and is never reconstructed. Each party publishes a
//! partial share, exactly one of them carrying the `c2` correction term
//! (the *lead* share), and fusing subtracts the remaining shares before a
//! bounded discrete-log lookup recovers the small plaintext.
//!
//! Wire encodings are fixed width: a point is always [`POINT_LEN`] bytes
//! (identity is all zeroes), so a ciphertext's byte length depends only on
//! its slot count.

mod ciphertext;
mod eval_key;
mod keys;
mod share;

pub use ciphertext::{encrypt, Ciphertext, Plaintext};
pub use eval_key::{
    eval_mult_keygen, merge_mult_keys, multi_key_switch_gen, multi_mult_eval_key, JointMultKey,
    KeySwitchMaterial, MultKeyShare,
};
pub use keys::{keygen_join, keygen_lead, KeyPair, KeyTag, PublicKey, SecretKeyShare};
pub use share::{combine_shares, decode_slots, decrypt_share, PartialShare, ShareKind};

use crate::{Error, Result};
use k256::{
    elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint},
    AffinePoint, EncodedPoint, ProjectivePoint,
};

/// Length of a fixed-width encoded point
pub const POINT_LEN: usize = 33;

/// Encode a point as exactly [`POINT_LEN`] bytes
pub(crate) fn encode_point(point: &ProjectivePoint) -> [u8; POINT_LEN] {
    let mut out = [0u8; POINT_LEN];
    if *point == ProjectivePoint::IDENTITY {
        return out;
    }
    let encoded = point.to_affine().to_encoded_point(true);
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Decode a fixed-width point produced by [`encode_point`]
pub(crate) fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    if bytes.len() != POINT_LEN {
        return Err(Error::Deserialization(format!(
            "point must be {} bytes, got {}",
            POINT_LEN,
            bytes.len()
        )));
    }
    if bytes.iter().all(|b| *b == 0) {
        return Ok(ProjectivePoint::IDENTITY);
    }

    let encoded =
        EncodedPoint::from_bytes(bytes).map_err(|e| Error::Deserialization(e.to_string()))?;
    let affine_opt = AffinePoint::from_encoded_point(&encoded);
    let affine: AffinePoint = Option::<AffinePoint>::from(affine_opt)
        .ok_or_else(|| Error::Deserialization("point is not on the curve".into()))?;
    Ok(ProjectivePoint::from(affine))
}

pub(crate) fn encode_points(points: &[ProjectivePoint]) -> Vec<u8> {
    let mut out = Vec::with_capacity(points.len() * POINT_LEN);
    for point in points {
        out.extend_from_slice(&encode_point(point));
    }
    out
}

pub(crate) fn decode_points(bytes: &[u8]) -> Result<Vec<ProjectivePoint>> {
    if bytes.len() % POINT_LEN != 0 {
        return Err(Error::Deserialization(format!(
            "point list length {} is not a multiple of {}",
            bytes.len(),
            POINT_LEN
        )));
    }
    bytes.chunks(POINT_LEN).map(decode_point).collect()
}

/// Base64 helpers shared by the serde impls in this module
pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(s)
    }

    /// `#[serde(with = "points")]` for point lists carried as one base64 string
    pub mod points {
        use k256::ProjectivePoint;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(points: &[ProjectivePoint], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&super::encode(&crate::fhe::encode_points(points)))
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<ProjectivePoint>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            let bytes = super::decode(&s).map_err(serde::de::Error::custom)?;
            crate::fhe::decode_points(&bytes).map_err(serde::de::Error::custom)
        }
    }

    /// `#[serde(with = "point")]` for a single point
    pub mod point {
        use k256::ProjectivePoint;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(point: &ProjectivePoint, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&super::encode(&crate::fhe::encode_point(point)))
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<ProjectivePoint, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            let bytes = super::decode(&s).map_err(serde::de::Error::custom)?;
            crate::fhe::decode_point(&bytes).map_err(serde::de::Error::custom)
        }
    }
}
