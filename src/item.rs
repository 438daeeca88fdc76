//! Item encryption and decryption.
//!
//! `EncryptAndSign` attributes are replaced by `B(nonce || AES-256-GCM(codec(value)))`
//! with the attribute name as associated data. Every signed attribute, plus
//! the encryption context and material description, is covered by a GMAC
//! stored in [`SIGNATURE_ATTRIBUTE`]. The material description itself is
//! stored as JSON in [`MATERIAL_DESCRIPTION_ATTRIBUTE`].

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;

use crate::codec;
use crate::crypto_config::CryptoConfig;
use crate::errors::{Error, Result};
use crate::materials::MaterialDescription;
use crate::structures::{CryptoAction, EncryptionContext, Item};

pub const MATERIAL_DESCRIPTION_ATTRIBUTE: &str = "*amzn-ddb-map-desc*";
pub const SIGNATURE_ATTRIBUTE: &str = "*amzn-ddb-map-sig*";

const NONCE_LEN: usize = 12;

fn is_reserved(name: &str) -> bool {
    name == MATERIAL_DESCRIPTION_ATTRIBUTE || name == SIGNATURE_ATTRIBUTE
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|e| Error::Configuration(format!("invalid key: {}", e)))
}

/// Encrypt and sign `item` according to `config`.
pub async fn encrypt_item(mut item: Item, config: &CryptoConfig) -> Result<Item> {
    if let Some(name) = item.keys().find(|name| is_reserved(name)) {
        return Err(Error::Encryption(format!(
            "reserved attribute name '{}' found in item",
            name
        )));
    }
    if let Some(key) = config
        .encryption_context
        .key_names()
        .find(|key| !item.contains_key(*key))
    {
        return Err(Error::MissingAttribute(format!(
            "item is missing key attribute '{}'",
            key
        )));
    }
    if config.attribute_actions.take_no_actions() {
        return Ok(item);
    }

    let mut context = config.with_item(&item).encryption_context;
    let materials = config
        .materials_provider
        .encryption_materials(&context)
        .await?;
    context.material_description = materials.material_description().clone();

    let content_cipher = cipher(materials.encryption_key())?;
    for (name, value) in item.iter_mut() {
        if config.attribute_actions.action(name) != CryptoAction::EncryptAndSign {
            continue;
        }
        let plaintext = codec::serialize(value)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = content_cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: &plaintext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|_| Error::Encryption(format!("failed to encrypt attribute '{}'", name)))?;

        let mut stored = nonce.to_vec();
        stored.extend_from_slice(&ciphertext);
        *value = AttributeValue::B(Blob::new(stored));
    }

    let description = serde_json::to_string(materials.material_description())
        .map_err(|e| Error::Encryption(format!("invalid material description: {}", e)))?;
    let signature = sign(&item, config, &context, materials.signing_key())?;

    item.insert(
        MATERIAL_DESCRIPTION_ATTRIBUTE.to_string(),
        AttributeValue::S(description),
    );
    item.insert(
        SIGNATURE_ATTRIBUTE.to_string(),
        AttributeValue::B(Blob::new(signature)),
    );
    Ok(item)
}

/// Verify and decrypt `item` according to `config`.
pub async fn decrypt_item(mut item: Item, config: &CryptoConfig) -> Result<Item> {
    let description = item.remove(MATERIAL_DESCRIPTION_ATTRIBUTE);
    let signature = item.remove(SIGNATURE_ATTRIBUTE);

    let (description, signature) = match (description, signature) {
        (None, None) if config.attribute_actions.take_no_actions() => return Ok(item),
        (Some(AttributeValue::S(d)), Some(AttributeValue::B(s))) => (d, s),
        (None, None) => {
            return Err(Error::ItemIntegrity(
                "item is missing its signature and material description".to_string(),
            ));
        }
        _ => {
            return Err(Error::ItemIntegrity(
                "material description or signature is missing or malformed".to_string(),
            ));
        }
    };

    let description: MaterialDescription = serde_json::from_str(&description)
        .map_err(|e| Error::ItemIntegrity(format!("invalid material description: {}", e)))?;

    let mut context = config.with_item(&item).encryption_context;
    let materials = config
        .materials_provider
        .decryption_materials(&context, &description)
        .await?;
    context.material_description = description;

    verify(&item, config, &context, materials.signing_key(), signature.as_ref())?;

    let content_cipher = cipher(materials.encryption_key())?;
    for (name, value) in item.iter_mut() {
        if config.attribute_actions.action(name) != CryptoAction::EncryptAndSign {
            continue;
        }
        let AttributeValue::B(stored) = value else {
            return Err(Error::Decryption(format!(
                "encrypted attribute '{}' is not binary",
                name
            )));
        };
        let stored = stored.as_ref();
        if stored.len() < NONCE_LEN {
            return Err(Error::Decryption(format!(
                "encrypted attribute '{}' is truncated",
                name
            )));
        }
        let (nonce, ciphertext) = stored.split_at(NONCE_LEN);
        let plaintext = content_cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|_| Error::Decryption(format!("failed to decrypt attribute '{}'", name)))?;
        *value = codec::deserialize(&plaintext)?;
    }

    Ok(item)
}

fn push_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Bytes covered by the item signature.
fn canonical_signing_input(
    item: &Item,
    config: &CryptoConfig,
    context: &EncryptionContext,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for field in [
        &context.table_name,
        &context.partition_key_name,
        &context.sort_key_name,
    ] {
        push_field(&mut out, field.as_deref().unwrap_or_default().as_bytes());
    }
    for (name, value) in &context.attributes {
        push_field(&mut out, name.as_bytes());
        push_field(&mut out, &codec::serialize_canonical(value)?);
    }
    for (key, value) in &context.material_description {
        push_field(&mut out, key.as_bytes());
        push_field(&mut out, value.as_bytes());
    }

    let mut signed: Vec<(&String, CryptoAction)> = item
        .keys()
        .map(|name| (name, config.attribute_actions.action(name)))
        .filter(|(_, action)| *action != CryptoAction::DoNothing)
        .collect();
    signed.sort_unstable_by(|a, b| a.0.cmp(b.0));

    for (name, action) in signed {
        push_field(&mut out, name.as_bytes());
        out.push(action.as_byte());
        push_field(&mut out, &codec::serialize_canonical(&item[name])?);
    }
    Ok(out)
}

fn sign(
    item: &Item,
    config: &CryptoConfig,
    context: &EncryptionContext,
    signing_key: &[u8],
) -> Result<Vec<u8>> {
    let input = canonical_signing_input(item, config, context)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let tag = cipher(signing_key)?
        .encrypt(
            &nonce,
            Payload {
                msg: &[],
                aad: &input,
            },
        )
        .map_err(|_| Error::Encryption("failed to sign item".to_string()))?;

    let mut signature = nonce.to_vec();
    signature.extend_from_slice(&tag);
    Ok(signature)
}

fn verify(
    item: &Item,
    config: &CryptoConfig,
    context: &EncryptionContext,
    signing_key: &[u8],
    signature: &[u8],
) -> Result<()> {
    if signature.len() <= NONCE_LEN {
        return Err(Error::ItemIntegrity("signature is truncated".to_string()));
    }
    let input = canonical_signing_input(item, config, context)?;
    let (nonce, tag) = signature.split_at(NONCE_LEN);
    cipher(signing_key)?
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: tag,
                aad: &input,
            },
        )
        .map(|_| ())
        .map_err(|_| Error::ItemIntegrity("signature does not match item".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::{CryptographicMaterialsProvider, RawMaterialsProvider};
    use crate::structures::{AttributeActions, TableIndex, TableInfo};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn s(v: &str) -> AttributeValue {
        AttributeValue::S(v.to_string())
    }

    fn n(v: &str) -> AttributeValue {
        AttributeValue::N(v.to_string())
    }

    fn orders_config(provider: Arc<dyn CryptographicMaterialsProvider>) -> CryptoConfig {
        let info = TableInfo::new("Orders", TableIndex::new("OrderId", None));
        let actions = AttributeActions::new().with_attribute_action("Status", CryptoAction::SignOnly);
        CryptoConfig::for_table(provider, &actions, &info).unwrap()
    }

    fn order() -> Item {
        HashMap::from([
            ("OrderId".to_string(), s("123")),
            ("Total".to_string(), n("42")),
            ("Status".to_string(), s("shipped")),
            (
                "Lines".to_string(),
                AttributeValue::L(vec![s("a"), AttributeValue::Bool(true)]),
            ),
        ])
    }

    #[tokio::test]
    async fn test_round_trip_mixed_actions() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));

        let encrypted = encrypt_item(order(), &config).await.unwrap();
        assert_eq!(encrypted["OrderId"], s("123"));
        assert_eq!(encrypted["Status"], s("shipped"));
        assert!(matches!(encrypted["Total"], AttributeValue::B(_)));
        assert!(encrypted.contains_key(SIGNATURE_ATTRIBUTE));
        assert!(encrypted.contains_key(MATERIAL_DESCRIPTION_ATTRIBUTE));

        let decrypted = decrypt_item(encrypted, &config).await.unwrap();
        assert_eq!(decrypted, order());
    }

    #[tokio::test]
    async fn test_tampered_sign_only_attribute_fails_integrity() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let mut encrypted = encrypt_item(order(), &config).await.unwrap();
        encrypted.insert("Status".to_string(), s("refunded"));

        let err = decrypt_item(encrypted, &config).await.unwrap_err();
        assert!(matches!(err, Error::ItemIntegrity(_)));
    }

    #[tokio::test]
    async fn test_item_moved_to_other_key_fails_integrity() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let mut encrypted = encrypt_item(order(), &config).await.unwrap();
        encrypted.insert("OrderId".to_string(), s("999"));

        let err = decrypt_item(encrypted, &config).await.unwrap_err();
        assert!(matches!(err, Error::ItemIntegrity(_)));
    }

    #[tokio::test]
    async fn test_wrong_key_fails_integrity() {
        let writer = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let reader = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let encrypted = encrypt_item(order(), &writer).await.unwrap();

        let err = decrypt_item(encrypted, &reader).await.unwrap_err();
        assert!(matches!(err, Error::ItemIntegrity(_)));
    }

    #[tokio::test]
    async fn test_missing_signature_fails_integrity() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let err = decrypt_item(order(), &config).await.unwrap_err();
        assert!(matches!(err, Error::ItemIntegrity(_)));
    }

    #[tokio::test]
    async fn test_item_stripped_of_protected_attributes_fails_integrity() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let mut encrypted = encrypt_item(order(), &config).await.unwrap();
        encrypted.retain(|name, _| name == "OrderId");

        let err = decrypt_item(encrypted, &config).await.unwrap_err();
        assert!(matches!(err, Error::ItemIntegrity(_)));
    }

    #[tokio::test]
    async fn test_key_only_item_is_still_signed() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let item = HashMap::from([("OrderId".to_string(), s("123"))]);

        let encrypted = encrypt_item(item.clone(), &config).await.unwrap();
        assert!(encrypted.contains_key(SIGNATURE_ATTRIBUTE));
        assert_eq!(decrypt_item(encrypted, &config).await.unwrap(), item);
    }

    #[tokio::test]
    async fn test_set_order_survives_round_trip() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let mut item = order();
        item.insert(
            "Tags".to_string(),
            AttributeValue::Ss(vec!["b".to_string(), "a".to_string()]),
        );
        item.insert(
            "Flags".to_string(),
            AttributeValue::Ss(vec!["z".to_string(), "y".to_string()]),
        );
        let config = CryptoConfig {
            attribute_actions: config
                .attribute_actions
                .clone()
                .with_attribute_action("Flags", CryptoAction::SignOnly),
            ..config
        };

        let encrypted = encrypt_item(item.clone(), &config).await.unwrap();
        assert_eq!(decrypt_item(encrypted, &config).await.unwrap(), item);
    }

    #[tokio::test]
    async fn test_sign_only_set_read_back_reordered_still_verifies() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let config = CryptoConfig {
            attribute_actions: config
                .attribute_actions
                .clone()
                .with_attribute_action("Flags", CryptoAction::SignOnly),
            ..config
        };
        let mut item = order();
        item.insert(
            "Flags".to_string(),
            AttributeValue::Ss(vec!["z".to_string(), "y".to_string()]),
        );

        let mut encrypted = encrypt_item(item, &config).await.unwrap();
        encrypted.insert(
            "Flags".to_string(),
            AttributeValue::Ss(vec!["y".to_string(), "z".to_string()]),
        );
        assert!(decrypt_item(encrypted, &config).await.is_ok());
    }

    #[tokio::test]
    async fn test_unprotected_item_passes_through() {
        let provider: Arc<dyn CryptographicMaterialsProvider> =
            Arc::new(RawMaterialsProvider::generate());
        let config = CryptoConfig::new(
            provider,
            EncryptionContext::for_table("Orders"),
            AttributeActions::new().with_default_action(CryptoAction::DoNothing),
        );

        let encrypted = encrypt_item(order(), &config).await.unwrap();
        assert_eq!(encrypted, order());
        assert_eq!(decrypt_item(encrypted, &config).await.unwrap(), order());
    }

    #[tokio::test]
    async fn test_item_without_key_attribute_is_rejected() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let mut item = order();
        item.remove("OrderId");

        let err = encrypt_item(item, &config).await.unwrap_err();
        assert!(matches!(err, Error::MissingAttribute(_)));
    }

    #[tokio::test]
    async fn test_reserved_attribute_is_rejected() {
        let config = orders_config(Arc::new(RawMaterialsProvider::generate()));
        let mut item = order();
        item.insert(SIGNATURE_ATTRIBUTE.to_string(), s("x"));

        let err = encrypt_item(item, &config).await.unwrap_err();
        assert!(matches!(err, Error::Encryption(_)));
    }
}
