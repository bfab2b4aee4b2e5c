//! Collaborators the pipeline consumes: key source, key store, layer-count
//! store and envelope store, with in-memory and directory backends.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::Error;
use crate::pipeline::{Authority, AuthorityKeys};
use crate::wrap::{KeyWrapProvider, PublicKey, SecretKey};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid key material for authority {index}: {source}")]
    Pem {
        index: u32,
        #[source]
        source: Error,
    },

    #[error("envelope is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("no key stored for authority {0}")]
    MissingKey(u32),

    #[error("no layer count stored")]
    MissingLayerCount,

    #[error("no envelope stored")]
    MissingEnvelope,

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Source of fresh keypairs, one call per authority.
pub trait KeySource {
    fn generate_keypair(&self) -> Result<(PublicKey, SecretKey), Error>;
}

impl<W: KeyWrapProvider> KeySource for W {
    fn generate_keypair(&self) -> Result<(PublicKey, SecretKey), Error> {
        self.keygen()
    }
}

/// Key material addressable by authority index.
pub trait KeyStore: Send + Sync {
    fn put(&self, keys: &AuthorityKeys) -> Result<(), StoreError>;
    fn public_key(&self, index: u32) -> Result<PublicKey, StoreError>;
    fn secret_key(&self, index: u32) -> Result<SecretKey, StoreError>;

    /// Public keys of authorities `1..=n`, ascending.
    fn public_chain(&self, n: u32) -> Result<Vec<Authority<PublicKey>>, StoreError> {
        (1..=n)
            .map(|i| Ok(Authority::new(i, self.public_key(i)?)))
            .collect()
    }

    /// Private keys of authorities `1..=n`, ascending.
    fn secret_chain(&self, n: u32) -> Result<Vec<Authority<SecretKey>>, StoreError> {
        (1..=n)
            .map(|i| Ok(Authority::new(i, self.secret_key(i)?)))
            .collect()
    }
}

/// Out-of-band home of N.
pub trait LayerCountStore: Send + Sync {
    fn save_layer_count(&self, n: u32) -> Result<(), StoreError>;
    fn load_layer_count(&self) -> Result<u32, StoreError>;
}

/// Whole-blob envelope persistence.
pub trait EnvelopeStore: Send + Sync {
    fn save_envelope(&self, envelope: &[u8]) -> Result<(), StoreError>;
    fn load_envelope(&self) -> Result<Vec<u8>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-memory storage (for testing and ephemeral use).
#[derive(Default)]
pub struct InMemoryStore {
    keys: RwLock<HashMap<u32, (PublicKey, SecretKey)>>,
    layer_count: RwLock<Option<u32>>,
    envelope: RwLock<Option<Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for InMemoryStore {
    fn put(&self, keys: &AuthorityKeys) -> Result<(), StoreError> {
        let mut map = self.keys.write().map_err(|_| StoreError::Poisoned)?;
        map.insert(keys.index, (keys.public.clone(), keys.secret.clone()));
        Ok(())
    }

    fn public_key(&self, index: u32) -> Result<PublicKey, StoreError> {
        let map = self.keys.read().map_err(|_| StoreError::Poisoned)?;
        map.get(&index)
            .map(|(pk, _)| pk.clone())
            .ok_or(StoreError::MissingKey(index))
    }

    fn secret_key(&self, index: u32) -> Result<SecretKey, StoreError> {
        let map = self.keys.read().map_err(|_| StoreError::Poisoned)?;
        map.get(&index)
            .map(|(_, sk)| sk.clone())
            .ok_or(StoreError::MissingKey(index))
    }
}

impl LayerCountStore for InMemoryStore {
    fn save_layer_count(&self, n: u32) -> Result<(), StoreError> {
        *self.layer_count.write().map_err(|_| StoreError::Poisoned)? = Some(n);
        Ok(())
    }

    fn load_layer_count(&self) -> Result<u32, StoreError> {
        self.layer_count
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .ok_or(StoreError::MissingLayerCount)
    }
}

impl EnvelopeStore for InMemoryStore {
    fn save_envelope(&self, envelope: &[u8]) -> Result<(), StoreError> {
        *self.envelope.write().map_err(|_| StoreError::Poisoned)? = Some(envelope.to_vec());
        Ok(())
    }

    fn load_envelope(&self) -> Result<Vec<u8>, StoreError> {
        self.envelope
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .clone()
            .ok_or(StoreError::MissingEnvelope)
    }
}

// ---------------------------------------------------------------------------
// Directory backend
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "config.json";
pub const ENVELOPE_FILE: &str = "encrypted.txt";
pub const DECRYPTED_FILE: &str = "decrypted.txt";

/// Persisted layer count, `{"n": N}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub n: u32,
}

/// Directory-backed storage.
///
/// Directory layout:
/// ```text
/// dir/
///   public_{i}.pem     SPKI PEM
///   private_{i}.pem    PKCS#8 PEM (mode 600 on unix)
///   config.json        {"n": N}
///   encrypted.txt      base64 envelope
/// ```
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn public_key_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("public_{index}.pem"))
    }

    pub fn secret_key_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("private_{index}.pem"))
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn envelope_path(&self) -> PathBuf {
        self.dir.join(ENVELOPE_FILE)
    }

    pub fn decrypted_path(&self) -> PathBuf {
        self.dir.join(DECRYPTED_FILE)
    }

    /// Atomic write: write to temp, then rename.
    pub fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        self.write_via_temp(path, data, false)
    }

    fn write_via_temp(&self, path: &Path, data: &[u8], secret: bool) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).map_err(|e| StoreError::io(&tmp, e))?;
        if secret {
            self.restrict(&tmp)?;
        }
        fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
        Ok(())
    }

    fn read_optional(&self, path: &Path) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    #[cfg(unix)]
    fn restrict(&self, path: &Path) -> Result<(), StoreError> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| StoreError::io(path, e))
    }

    #[cfg(not(unix))]
    fn restrict(&self, _path: &Path) -> Result<(), StoreError> {
        Ok(())
    }
}

impl KeyStore for FileStore {
    fn put(&self, keys: &AuthorityKeys) -> Result<(), StoreError> {
        let pem_err = |source| StoreError::Pem {
            index: keys.index,
            source,
        };
        let public_pem = keys.public.to_pem().map_err(pem_err)?;
        let secret_pem = keys.secret.to_pem().map_err(pem_err)?;

        let pk_path = self.public_key_path(keys.index);
        let sk_path = self.secret_key_path(keys.index);
        self.write_atomic(&pk_path, public_pem.as_bytes())?;
        self.write_via_temp(&sk_path, secret_pem.as_bytes(), true)?;

        debug!(authority = keys.index, path = %pk_path.display(), "stored keypair");
        Ok(())
    }

    fn public_key(&self, index: u32) -> Result<PublicKey, StoreError> {
        let pem = self
            .read_optional(&self.public_key_path(index))?
            .ok_or(StoreError::MissingKey(index))?;
        PublicKey::from_pem(&pem).map_err(|source| StoreError::Pem { index, source })
    }

    fn secret_key(&self, index: u32) -> Result<SecretKey, StoreError> {
        let pem = zeroize::Zeroizing::new(
            self.read_optional(&self.secret_key_path(index))?
                .ok_or(StoreError::MissingKey(index))?,
        );
        SecretKey::from_pem(&pem).map_err(|source| StoreError::Pem { index, source })
    }
}

impl LayerCountStore for FileStore {
    fn save_layer_count(&self, n: u32) -> Result<(), StoreError> {
        let path = self.config_path();
        let json = serde_json::to_string(&LayerConfig { n }).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        self.write_atomic(&path, json.as_bytes())
    }

    fn load_layer_count(&self) -> Result<u32, StoreError> {
        let path = self.config_path();
        let data = self
            .read_optional(&path)?
            .ok_or(StoreError::MissingLayerCount)?;
        let config: LayerConfig =
            serde_json::from_str(&data).map_err(|source| StoreError::Json { path, source })?;
        Ok(config.n)
    }
}

impl EnvelopeStore for FileStore {
    fn save_envelope(&self, envelope: &[u8]) -> Result<(), StoreError> {
        self.write_atomic(&self.envelope_path(), BASE64.encode(envelope).as_bytes())
    }

    fn load_envelope(&self) -> Result<Vec<u8>, StoreError> {
        let data = self
            .read_optional(&self.envelope_path())?
            .ok_or(StoreError::MissingEnvelope)?;
        Ok(BASE64.decode(data.trim())?)
    }
}
