//! Type-tag derivation and the discriminator → decoder table used for log events.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use super::binary_reader::BinaryReaderError;
use super::constants::event_log::DISCRIMINATOR_LEN;

pub type Discriminator = [u8; DISCRIMINATOR_LEN];

/// Decodes the payload that follows a discriminator into the registry's value type.
pub type DecodeFn<T> = fn(&[u8]) -> Result<T, BinaryReaderError>;

/// `sha256("<namespace>:<name>")[..8]`
pub fn discriminator(namespace: &str, name: &str) -> Discriminator {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let hash = hasher.finalize();

    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    out
}

/// Lookup key used by the registry: standard base64 of the raw tag bytes.
pub fn discriminator_key(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Built once at startup and shared by reference; never mutated while decoding.
pub struct DiscriminatorRegistry<T> {
    namespace: &'static str,
    names: FxHashMap<String, &'static str>,
    decoders: FxHashMap<&'static str, DecodeFn<T>>,
}

impl<T> DiscriminatorRegistry<T> {
    pub fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            names: FxHashMap::default(),
            decoders: FxHashMap::default(),
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Registers `name` and returns its discriminator. Re-registering replaces the decoder.
    pub fn register(&mut self, name: &'static str, decoder: DecodeFn<T>) -> Discriminator {
        let disc = discriminator(self.namespace, name);
        self.names.insert(discriminator_key(&disc), name);
        self.decoders.insert(name, decoder);
        disc
    }

    pub fn name_for_key(&self, key: &str) -> Option<&'static str> {
        self.names.get(key).copied()
    }

    pub fn decoder(&self, name: &str) -> Option<DecodeFn<T>> {
        self.decoders.get(name).copied()
    }

    /// `None` when the tag is unknown; `Some(Err)` when the payload does not fit the layout.
    pub fn decode(
        &self,
        tag: &[u8],
        payload: &[u8],
    ) -> Option<(&'static str, Result<T, BinaryReaderError>)> {
        let name = self.name_for_key(&discriminator_key(tag))?;
        let decoder = self.decoder(name)?;
        Some((name, decoder(payload)))
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}
