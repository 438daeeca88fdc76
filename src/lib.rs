//! Client-side item encryption for DynamoDB.
//!
//! [`EncryptedResource`] wraps a DynamoDB client. Batch writes are encrypted
//! and signed before they are sent, and batch reads are verified and
//! decrypted after they come back. Primary and secondary index key
//! attributes are discovered through DescribeTable and always stay in
//! plaintext, so the table can still route and index on them.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dynamodb_encryption::{client, EncryptedResource, KmsMaterialsProvider};
//!
//! # async fn demo() -> dynamodb_encryption::Result<()> {
//! let config = client::AwsConfig::from_env();
//! let dynamodb = client::build_dynamodb_client(&config).await?;
//! let kms = client::build_kms_client(&config, None).await?;
//! let provider = Arc::new(KmsMaterialsProvider::new(kms, "alias/orders")?);
//! let resource = EncryptedResource::new(dynamodb, provider);
//! let orders = resource.table("Orders", Default::default()).await?;
//! # let _ = orders;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod blocking;
pub mod client;
pub mod codec;
pub mod collection;
pub mod crypto_config;
pub mod errors;
pub mod item;
pub mod logging;
pub mod materials;
pub mod resource;
pub mod structures;
pub mod table;
pub mod table_info;

#[cfg(test)]
pub(crate) mod testing;

pub use api::DynamoDbApi;
pub use collection::{EncryptedTablesCollection, TableCollectionQuery};
pub use crypto_config::{resolve, CryptoConfig};
pub use errors::{Error, Result};
pub use item::{decrypt_item, encrypt_item};
pub use materials::{CryptographicMaterialsProvider, KmsMaterialsProvider, RawMaterialsProvider};
pub use resource::{EncryptedResource, TableOverrides};
pub use structures::{
    AttributeActions, CryptoAction, EncryptionContext, Item, TableIndex, TableInfo,
};
pub use table::EncryptedTable;
pub use table_info::TableInfoCache;
