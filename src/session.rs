//! Session entry point: one encrypt, decrypt or keygen run against the stores.
//!
//! All terminal interaction lives in the binary; all persistence lives in the
//! store backends. A session only moves bytes between them and the pipeline.

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::error::Error;
use crate::pipeline::{AuthorityKeys, Onion};
use crate::store::{EnvelopeStore, FileStore, KeyStore, LayerCountStore, StoreError};
use crate::wrap::{KeyWrapProvider, DEFAULT_MODULUS_BITS};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Crypto(#[from] Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// Replacing the keys would orphan the stored envelope.
    #[error("an envelope is already stored; its keys cannot be regenerated")]
    EnvelopeExists,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Generate keys for N authorities, seal the plaintext, persist everything.
    Encrypt,
    /// Seal the plaintext to the keys and N already in the store.
    EncryptStored,
    /// Load N, the envelope and the private keys, and open it.
    Decrypt,
    /// Generate and persist keys for N authorities only.
    Keygen,
}

/// Everything a session needs, passed in explicitly.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub mode: Mode,
    /// Number of authorities. Ignored by `Decrypt` and `EncryptStored`,
    /// which read the stored N.
    pub authority_count: u32,
    /// Input for `Encrypt`.
    pub plaintext: Vec<u8>,
    pub key_store_path: PathBuf,
    pub modulus_bits: usize,
}

impl SessionConfig {
    pub fn encrypt(
        authority_count: u32,
        plaintext: impl Into<Vec<u8>>,
        key_store_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mode: Mode::Encrypt,
            authority_count,
            plaintext: plaintext.into(),
            key_store_path: key_store_path.into(),
            modulus_bits: DEFAULT_MODULUS_BITS,
        }
    }

    pub fn encrypt_stored(
        plaintext: impl Into<Vec<u8>>,
        key_store_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mode: Mode::EncryptStored,
            authority_count: 0,
            plaintext: plaintext.into(),
            key_store_path: key_store_path.into(),
            modulus_bits: DEFAULT_MODULUS_BITS,
        }
    }

    pub fn decrypt(key_store_path: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::Decrypt,
            authority_count: 0,
            plaintext: Vec::new(),
            key_store_path: key_store_path.into(),
            modulus_bits: DEFAULT_MODULUS_BITS,
        }
    }

    pub fn keygen(authority_count: u32, key_store_path: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::Keygen,
            authority_count,
            plaintext: Vec::new(),
            key_store_path: key_store_path.into(),
            modulus_bits: DEFAULT_MODULUS_BITS,
        }
    }

    pub fn with_modulus_bits(mut self, bits: usize) -> Self {
        self.modulus_bits = bits;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Encrypted { authorities: u32, envelope_len: usize },
    Decrypted { plaintext: Vec<u8> },
    Generated { authorities: u32 },
}

/// Pipeline plus the three stores a session reads and writes.
pub struct Session<'a, W = crate::wrap::RsaOaepProvider> {
    onion: Onion<W>,
    keys: &'a dyn KeyStore,
    counts: &'a dyn LayerCountStore,
    envelopes: &'a dyn EnvelopeStore,
}

impl<'a, W: KeyWrapProvider + Sync> Session<'a, W> {
    pub fn new(
        onion: Onion<W>,
        keys: &'a dyn KeyStore,
        counts: &'a dyn LayerCountStore,
        envelopes: &'a dyn EnvelopeStore,
    ) -> Self {
        Self {
            onion,
            keys,
            counts,
            envelopes,
        }
    }

    /// Seals `plaintext` to `n` freshly generated authorities.
    ///
    /// Nothing is persisted unless every layer sealed.
    pub fn encrypt(&self, plaintext: &[u8], n: u32) -> Result<Outcome, SessionError> {
        let authorities = self.onion.generate_authorities(n as usize)?;
        let chain: Vec<_> = authorities.iter().map(AuthorityKeys::public).collect();
        let envelope = self.onion.seal(plaintext, &chain, n as usize)?;

        self.persist_keys(&authorities)?;
        self.envelopes.save_envelope(&envelope)?;
        self.counts.save_layer_count(n)?;

        info!(
            authorities = n,
            plaintext = plaintext.len(),
            envelope = envelope.len(),
            "envelope sealed"
        );
        Ok(Outcome::Encrypted {
            authorities: n,
            envelope_len: envelope.len(),
        })
    }

    /// Seals `plaintext` to the stored N and public keys, e.g. those left by
    /// [`Session::keygen`]. Only the envelope is written.
    pub fn encrypt_stored(&self, plaintext: &[u8]) -> Result<Outcome, SessionError> {
        let n = self.counts.load_layer_count()?;
        let chain = self.keys.public_chain(n)?;
        let envelope = self.onion.seal(plaintext, &chain, n as usize)?;
        self.envelopes.save_envelope(&envelope)?;

        info!(
            authorities = n,
            plaintext = plaintext.len(),
            envelope = envelope.len(),
            "envelope sealed with stored keys"
        );
        Ok(Outcome::Encrypted {
            authorities: n,
            envelope_len: envelope.len(),
        })
    }

    /// Opens the stored envelope with the stored N and private keys.
    pub fn decrypt(&self) -> Result<Outcome, SessionError> {
        let n = self.counts.load_layer_count()?;
        let envelope = self.envelopes.load_envelope()?;
        let chain = self.keys.secret_chain(n)?;
        let plaintext = self.onion.open(&envelope, &chain, n as usize)?;

        info!(
            authorities = n,
            envelope = envelope.len(),
            plaintext = plaintext.len(),
            "envelope opened"
        );
        Ok(Outcome::Decrypted { plaintext })
    }

    /// Generates and stores keys for `n` authorities, plus N itself.
    ///
    /// Refuses to run while an envelope is stored: its keys are fixed once
    /// it exists.
    pub fn keygen(&self, n: u32) -> Result<Outcome, SessionError> {
        match self.envelopes.load_envelope() {
            Ok(_) => return Err(SessionError::EnvelopeExists),
            Err(StoreError::MissingEnvelope) => {}
            Err(e) => return Err(e.into()),
        }

        let authorities = self.onion.generate_authorities(n as usize)?;
        self.persist_keys(&authorities)?;
        self.counts.save_layer_count(n)?;

        info!(authorities = n, "keys generated");
        Ok(Outcome::Generated { authorities: n })
    }

    fn persist_keys(&self, authorities: &[AuthorityKeys]) -> Result<(), StoreError> {
        authorities.iter().try_for_each(|keys| self.keys.put(keys))
    }
}

/// Runs one session against the directory at `config.key_store_path`.
///
/// A decrypt session also writes the recovered plaintext to `decrypted.txt`.
pub fn run(config: &SessionConfig) -> Result<Outcome, SessionError> {
    let onion = Onion::with_modulus_bits(config.modulus_bits)?;
    let store = FileStore::new(&config.key_store_path)?;
    let session = Session::new(onion, &store, &store, &store);

    match config.mode {
        Mode::Encrypt => {
            if config.authority_count == 0 {
                return Err(SessionError::InvalidConfig(
                    "authority count must be at least 1".into(),
                ));
            }
            session.encrypt(&config.plaintext, config.authority_count)
        }
        Mode::EncryptStored => session.encrypt_stored(&config.plaintext),
        Mode::Decrypt => {
            let outcome = session.decrypt()?;
            if let Outcome::Decrypted { plaintext } = &outcome {
                store.write_atomic(&store.decrypted_path(), plaintext)?;
            }
            Ok(outcome)
        }
        Mode::Keygen => {
            if config.authority_count == 0 {
                return Err(SessionError::InvalidConfig(
                    "authority count must be at least 1".into(),
                ));
            }
            session.keygen(config.authority_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::wrap::MIN_MODULUS_BITS;

    fn onion() -> Onion {
        Onion::with_modulus_bits(MIN_MODULUS_BITS).unwrap()
    }

    #[test]
    fn memory_session_roundtrip() {
        let store = InMemoryStore::new();
        let session = Session::new(onion(), &store, &store, &store);

        let sealed = session.encrypt(b"attack at dawn", 3).unwrap();
        assert!(matches!(sealed, Outcome::Encrypted { authorities: 3, .. }));
        assert_eq!(store.load_layer_count().unwrap(), 3);

        assert_eq!(
            session.decrypt().unwrap(),
            Outcome::Decrypted { plaintext: b"attack at dawn".to_vec() }
        );
    }

    #[test]
    fn failed_encrypt_persists_nothing() {
        let store = InMemoryStore::new();
        let session = Session::new(onion(), &store, &store, &store);

        assert!(matches!(
            session.encrypt(b"x", 0),
            Err(SessionError::Crypto(Error::NoAuthorities))
        ));
        assert!(store.load_envelope().is_err());
        assert!(store.load_layer_count().is_err());
        assert!(store.public_key(1).is_err());
    }

    #[test]
    fn wrong_layer_count_fails_decrypt() {
        let store = InMemoryStore::new();
        let session = Session::new(onion(), &store, &store, &store);
        session.encrypt(b"payload", 2).unwrap();

        store.save_layer_count(1).unwrap();
        assert!(matches!(session.decrypt(), Err(SessionError::Crypto(_))));

        store.save_layer_count(3).unwrap();
        assert!(matches!(
            session.decrypt(),
            Err(SessionError::Store(StoreError::MissingKey(3)))
        ));
    }

    #[test]
    fn file_session_writes_key_store_layout() {
        let tmp = tempfile::tempdir().unwrap();

        let config = SessionConfig::encrypt(2, "hello authorities", tmp.path())
            .with_modulus_bits(MIN_MODULUS_BITS);
        run(&config).unwrap();
        let expected = [
            "public_1.pem",
            "private_1.pem",
            "public_2.pem",
            "private_2.pem",
            "config.json",
            "encrypted.txt",
        ];
        for name in expected {
            assert!(tmp.path().join(name).exists(), "{name} missing");
        }

        let config = SessionConfig::decrypt(tmp.path()).with_modulus_bits(MIN_MODULUS_BITS);
        let outcome = run(&config).unwrap();
        assert_eq!(
            outcome,
            Outcome::Decrypted {
                plaintext: b"hello authorities".to_vec()
            }
        );
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("decrypted.txt")).unwrap(),
            "hello authorities"
        );
    }

    #[test]
    fn zero_authorities_is_invalid_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig::encrypt(0, "x", tmp.path());
        assert!(matches!(run(&config), Err(SessionError::InvalidConfig(_))));
        let config = SessionConfig::keygen(0, tmp.path());
        assert!(matches!(run(&config), Err(SessionError::InvalidConfig(_))));
    }

    #[test]
    fn keygen_then_missing_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig::keygen(1, tmp.path()).with_modulus_bits(MIN_MODULUS_BITS);
        assert_eq!(run(&config).unwrap(), Outcome::Generated { authorities: 1 });

        let config = SessionConfig::decrypt(tmp.path());
        assert!(matches!(
            run(&config),
            Err(SessionError::Store(StoreError::MissingEnvelope))
        ));
    }

    #[test]
    fn keygen_refuses_to_orphan_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig::encrypt(2, "keep me", tmp.path())
            .with_modulus_bits(MIN_MODULUS_BITS);
        run(&config).unwrap();
        let public_before = std::fs::read(tmp.path().join("public_1.pem")).unwrap();

        let config = SessionConfig::keygen(2, tmp.path()).with_modulus_bits(MIN_MODULUS_BITS);
        assert!(matches!(run(&config), Err(SessionError::EnvelopeExists)));
        assert_eq!(
            std::fs::read(tmp.path().join("public_1.pem")).unwrap(),
            public_before
        );

        let outcome = run(&SessionConfig::decrypt(tmp.path())).unwrap();
        assert_eq!(
            outcome,
            Outcome::Decrypted {
                plaintext: b"keep me".to_vec()
            }
        );
    }

    #[test]
    fn keygen_then_encrypt_with_stored_keys() {
        let store = InMemoryStore::new();
        let session = Session::new(onion(), &store, &store, &store);
        session.keygen(3).unwrap();
        let public = store.public_key(2).unwrap();

        let sealed = session.encrypt_stored(b"pre-provisioned").unwrap();
        assert!(matches!(sealed, Outcome::Encrypted { authorities: 3, .. }));
        assert_eq!(store.public_key(2).unwrap(), public);
        assert_eq!(
            session.decrypt().unwrap(),
            Outcome::Decrypted {
                plaintext: b"pre-provisioned".to_vec()
            }
        );
    }

    #[test]
    fn encrypt_stored_needs_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig::encrypt_stored("x", tmp.path());
        assert!(matches!(
            run(&config),
            Err(SessionError::Store(StoreError::MissingLayerCount))
        ));
        assert!(!tmp.path().join("encrypted.txt").exists());
    }
}
