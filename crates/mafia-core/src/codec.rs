//! Vector codec
//!
//! Every protocol-visible vector is built here, so real and dummy payloads
//! go through the same encryption path and come out with the same shape.

use crate::fhe::{encrypt, Ciphertext, Plaintext, PublicKey};
use crate::{Error, Result, Role, ROLE_KINDS};
use rand_core::{CryptoRng, RngCore};

/// Builds encrypted one-hot and zero vectors under the joint public key
pub struct VectorCodec<'a> {
    key: &'a PublicKey,
}

impl<'a> VectorCodec<'a> {
    pub fn new(key: &'a PublicKey) -> Self {
        Self { key }
    }

    /// `1` at `index`, `0` elsewhere
    pub fn one_hot<R: RngCore + CryptoRng>(
        &self,
        length: usize,
        index: usize,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if index >= length {
            return Err(Error::InvalidTarget(format!(
                "one-hot index {} outside vector of length {}",
                index, length
            )));
        }
        let mut values = vec![0u64; length];
        values[index] = 1;
        Ok(encrypt(self.key, &values, rng))
    }

    /// All-zero vector, indistinguishable in shape from [`Self::one_hot`]
    pub fn zero<R: RngCore + CryptoRng>(&self, length: usize, rng: &mut R) -> Ciphertext {
        encrypt(self.key, &vec![0u64; length], rng)
    }

    /// One-hot for an optional choice; abstaining encodes as zeroes
    pub fn choice<R: RngCore + CryptoRng>(
        &self,
        length: usize,
        choice: Option<usize>,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        match choice {
            Some(index) => self.one_hot(length, index, rng),
            None => Ok(self.zero(length, rng)),
        }
    }

    /// Role vector of length [`ROLE_KINDS`]
    pub fn role_vector<R: RngCore + CryptoRng>(&self, role: Role, rng: &mut R) -> Ciphertext {
        let mut values = vec![0u64; ROLE_KINDS];
        values[role.index()] = 1;
        encrypt(self.key, &values, rng)
    }
}

/// `Some(index)` for a one-hot plaintext, `None` for all zeroes
pub fn decode_one_hot(plain: &Plaintext) -> Result<Option<usize>> {
    let mut hot = None;
    for (i, v) in plain.values().iter().enumerate() {
        match (*v, hot) {
            (0, _) => {}
            (1, None) => hot = Some(i),
            _ => {
                return Err(Error::Crypto(format!(
                    "plaintext {:?} is not one-hot",
                    plain.values()
                )))
            }
        }
    }
    Ok(hot)
}

/// Map a recovered role plaintext back to its role
pub fn decode_role(plain: &Plaintext) -> Result<Role> {
    if plain.len() != ROLE_KINDS {
        return Err(Error::Shape {
            expected: ROLE_KINDS,
            actual: plain.len(),
        });
    }
    match decode_one_hot(plain)? {
        Some(index) => Role::from_index(index),
        None => Err(Error::Crypto("role vector decrypted to all zeroes".into())),
    }
}
