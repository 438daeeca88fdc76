//! Cryptographic materials providers.
//!
//! A provider hands out the keys used for one item: an AES-256-GCM content
//! key and a signing key. What it needs to find those keys again on read is
//! recorded in the item's material description.
//!
//! The KMS provider uses the envelope pattern:
//! 1. GenerateDataKey returns a plaintext + wrapped data key per item
//! 2. The plaintext key encrypts and signs the item locally
//! 3. The wrapped key is stored in the material description

use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{map_kms_error, Error, Result};
use crate::structures::EncryptionContext;

/// Length of each AES-256 key.
pub const KEY_LEN: usize = 32;

pub const DESC_PROVIDER: &str = "amzn-ddb-provider";
pub const DESC_WRAPPED_KEY: &str = "amzn-ddb-wrapped-key";
pub const DESC_KMS_KEY_ID: &str = "amzn-ddb-kms-key-id";

/// Material description stored alongside an encrypted item.
pub type MaterialDescription = BTreeMap<String, String>;

/// Keys for one item. Never logged.
#[derive(Clone)]
pub struct CryptographicMaterials {
    encryption_key: [u8; KEY_LEN],
    signing_key: [u8; KEY_LEN],
    material_description: MaterialDescription,
}

impl fmt::Debug for CryptographicMaterials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptographicMaterials")
            .field("material_description", &self.material_description)
            .finish_non_exhaustive()
    }
}

impl CryptographicMaterials {
    pub fn new(
        encryption_key: [u8; KEY_LEN],
        signing_key: [u8; KEY_LEN],
        material_description: MaterialDescription,
    ) -> Self {
        Self {
            encryption_key,
            signing_key,
            material_description,
        }
    }

    pub fn encryption_key(&self) -> &[u8; KEY_LEN] {
        &self.encryption_key
    }

    pub fn signing_key(&self) -> &[u8; KEY_LEN] {
        &self.signing_key
    }

    pub fn material_description(&self) -> &MaterialDescription {
        &self.material_description
    }
}

/// Source of keys for item encryption. Shared across requests.
#[async_trait]
pub trait CryptographicMaterialsProvider: Send + Sync + fmt::Debug {
    /// Keys for encrypting a new item.
    async fn encryption_materials(
        &self,
        context: &EncryptionContext,
    ) -> Result<CryptographicMaterials>;

    /// Keys for an item written with `description`.
    async fn decryption_materials(
        &self,
        context: &EncryptionContext,
        description: &MaterialDescription,
    ) -> Result<CryptographicMaterials>;
}

fn key_from_slice(bytes: &[u8], what: &str) -> Result<[u8; KEY_LEN]> {
    bytes.try_into().map_err(|_| {
        Error::Configuration(format!(
            "{} must be {} bytes, got {}",
            what,
            KEY_LEN,
            bytes.len()
        ))
    })
}

/// Provider backed by a fixed pair of keys.
pub struct RawMaterialsProvider {
    encryption_key: [u8; KEY_LEN],
    signing_key: [u8; KEY_LEN],
}

impl fmt::Debug for RawMaterialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMaterialsProvider").finish_non_exhaustive()
    }
}

impl RawMaterialsProvider {
    pub fn new(encryption_key: &[u8], signing_key: &[u8]) -> Result<Self> {
        Ok(Self {
            encryption_key: key_from_slice(encryption_key, "encryption key")?,
            signing_key: key_from_slice(signing_key, "signing key")?,
        })
    }

    /// Provider with fresh random keys from the OS RNG.
    pub fn generate() -> Self {
        let mut encryption_key = [0u8; KEY_LEN];
        let mut signing_key = [0u8; KEY_LEN];
        encryption_key.copy_from_slice(&Aes256Gcm::generate_key(OsRng));
        signing_key.copy_from_slice(&Aes256Gcm::generate_key(OsRng));
        Self {
            encryption_key,
            signing_key,
        }
    }

    fn materials(&self) -> CryptographicMaterials {
        CryptographicMaterials::new(
            self.encryption_key,
            self.signing_key,
            BTreeMap::from([(DESC_PROVIDER.to_string(), "raw".to_string())]),
        )
    }
}

#[async_trait]
impl CryptographicMaterialsProvider for RawMaterialsProvider {
    async fn encryption_materials(
        &self,
        _context: &EncryptionContext,
    ) -> Result<CryptographicMaterials> {
        Ok(self.materials())
    }

    async fn decryption_materials(
        &self,
        _context: &EncryptionContext,
        description: &MaterialDescription,
    ) -> Result<CryptographicMaterials> {
        match description.get(DESC_PROVIDER).map(String::as_str) {
            Some("raw") => Ok(self.materials()),
            other => Err(Error::Decryption(format!(
                "item was not written by a raw provider (provider: {:?})",
                other
            ))),
        }
    }
}

/// Provider that wraps a per-item data key with AWS KMS.
#[derive(Debug, Clone)]
pub struct KmsMaterialsProvider {
    client: aws_sdk_kms::Client,
    key_id: String,
}

impl KmsMaterialsProvider {
    pub fn new(client: aws_sdk_kms::Client, key_id: impl Into<String>) -> Result<Self> {
        let key_id = key_id.into();
        if key_id.trim().is_empty() {
            return Err(Error::Configuration("KMS key id must not be empty".to_string()));
        }
        Ok(Self { client, key_id })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn split_data_key(
        plaintext: &[u8],
        description: MaterialDescription,
    ) -> Result<CryptographicMaterials> {
        if plaintext.len() != KEY_LEN * 2 {
            return Err(Error::Decryption(format!(
                "KMS data key has unexpected length {}",
                plaintext.len()
            )));
        }
        let (enc, sig) = plaintext.split_at(KEY_LEN);
        Ok(CryptographicMaterials::new(
            key_from_slice(enc, "data key")?,
            key_from_slice(sig, "data key")?,
            description,
        ))
    }
}

#[async_trait]
impl CryptographicMaterialsProvider for KmsMaterialsProvider {
    async fn encryption_materials(
        &self,
        context: &EncryptionContext,
    ) -> Result<CryptographicMaterials> {
        let mut req = self
            .client
            .generate_data_key()
            .key_id(&self.key_id)
            .number_of_bytes((KEY_LEN * 2) as i32);
        for (k, v) in context.to_string_map() {
            req = req.encryption_context(k, v);
        }

        let output = req.send().await.map_err(|e| map_kms_error(e, false))?;

        let plaintext = output
            .plaintext()
            .ok_or_else(|| Error::Encryption("No plaintext data key returned from KMS".to_string()))?;
        let wrapped = output
            .ciphertext_blob()
            .ok_or_else(|| Error::Encryption("No wrapped data key returned from KMS".to_string()))?;

        let description = BTreeMap::from([
            (DESC_PROVIDER.to_string(), "aws-kms".to_string()),
            (DESC_KMS_KEY_ID.to_string(), self.key_id.clone()),
            (DESC_WRAPPED_KEY.to_string(), BASE64.encode(wrapped.as_ref())),
        ]);

        Self::split_data_key(plaintext.as_ref(), description)
            .map_err(|e| Error::Encryption(e.to_string()))
    }

    async fn decryption_materials(
        &self,
        context: &EncryptionContext,
        description: &MaterialDescription,
    ) -> Result<CryptographicMaterials> {
        let wrapped = description
            .get(DESC_WRAPPED_KEY)
            .ok_or_else(|| Error::Decryption("material description has no wrapped key".to_string()))?;
        let wrapped = BASE64
            .decode(wrapped)
            .map_err(|e| Error::Decryption(format!("Invalid base64 in wrapped key: {}", e)))?;

        let mut req = self
            .client
            .decrypt()
            .key_id(&self.key_id)
            .ciphertext_blob(Blob::new(wrapped));
        for (k, v) in context.to_string_map() {
            req = req.encryption_context(k, v);
        }

        let output = req.send().await.map_err(|e| map_kms_error(e, true))?;
        let plaintext = output
            .plaintext()
            .ok_or_else(|| Error::Decryption("No plaintext returned from KMS".to_string()))?;

        Self::split_data_key(plaintext.as_ref(), description.clone())
    }
}
