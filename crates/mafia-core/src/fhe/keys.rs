//! Key material for the threshold scheme

use super::b64;
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A party's secret key share
///
/// Deliberately neither `Clone` nor `Serialize`: the share stays inside the
/// process that generated it and is wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKeyShare(Scalar);

impl SecretKeyShare {
    fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(Scalar::random(rng))
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        &self.0
    }

    /// Public counterpart `x·G`
    pub fn public_share(&self) -> PublicKey {
        PublicKey(ProjectivePoint::GENERATOR * self.0)
    }
}

impl fmt::Debug for SecretKeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKeyShare(<redacted>)")
    }
}

/// Public key (a running DKG key or the final joint key)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "b64::point")] pub(crate) ProjectivePoint);

impl PublicKey {
    pub(crate) fn point(&self) -> &ProjectivePoint {
        &self.0
    }

    /// Fixed-width encoding
    pub fn to_bytes(&self) -> [u8; super::POINT_LEN] {
        super::encode_point(&self.0)
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        super::decode_point(bytes).map(Self)
    }

    /// Tag binding evaluation keys to this public key
    pub fn key_tag(&self) -> KeyTag {
        let digest = blake3::hash(&self.to_bytes());
        KeyTag(hex::encode(&digest.as_bytes()[..8]))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

/// Identifier binding evaluation key material to one joint public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyTag(pub String);

impl fmt::Display for KeyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of one DKG key round
#[derive(Debug)]
pub struct KeyPair {
    /// This party's secret share
    pub secret: SecretKeyShare,
    /// This party's own public share `x_i·G`
    pub public_share: PublicKey,
    /// Running public key handed to the next party in join order
    pub public: PublicKey,
}

/// Lead party: generate the first keypair of the chain
pub fn keygen_lead<R: RngCore + CryptoRng>(rng: &mut R) -> KeyPair {
    let secret = SecretKeyShare::random(rng);
    let public_share = secret.public_share();
    KeyPair {
        public: public_share.clone(),
        public_share,
        secret,
    }
}

/// Joining party: extend the running public key with a fresh share
pub fn keygen_join<R: RngCore + CryptoRng>(previous: &PublicKey, rng: &mut R) -> KeyPair {
    let secret = SecretKeyShare::random(rng);
    let public_share = secret.public_share();
    let public = PublicKey(previous.0 + public_share.0);
    KeyPair {
        secret,
        public_share,
        public,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_chain_sums_public_shares() {
        let lead = keygen_lead(&mut OsRng);
        let second = keygen_join(&lead.public, &mut OsRng);
        let third = keygen_join(&second.public, &mut OsRng);

        let sum = lead.public_share.0 + second.public_share.0 + third.public_share.0;
        assert_eq!(third.public.0, sum);
    }

    #[test]
    fn test_public_key_serde() {
        let pair = keygen_lead(&mut OsRng);
        let json = serde_json::to_string(&pair.public).unwrap();
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair.public);
        assert_eq!(back.key_tag(), pair.public.key_tag());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let pair = keygen_lead(&mut OsRng);
        assert_eq!(format!("{:?}", pair.secret), "SecretKeyShare(<redacted>)");
    }
}
