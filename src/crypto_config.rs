//! Resolution of the per-operation crypto configuration.

use std::sync::Arc;

use crate::api::DynamoDbApi;
use crate::errors::Result;
use crate::materials::CryptographicMaterialsProvider;
use crate::structures::{AttributeActions, EncryptionContext, Item, TableInfo};
use crate::table_info::TableInfoCache;

/// Everything needed to encrypt or decrypt items for one operation.
#[derive(Debug, Clone)]
pub struct CryptoConfig {
    pub materials_provider: Arc<dyn CryptographicMaterialsProvider>,
    pub encryption_context: EncryptionContext,
    pub attribute_actions: AttributeActions,
}

impl CryptoConfig {
    pub fn new(
        materials_provider: Arc<dyn CryptographicMaterialsProvider>,
        encryption_context: EncryptionContext,
        attribute_actions: AttributeActions,
    ) -> Self {
        Self {
            materials_provider,
            encryption_context,
            attribute_actions,
        }
    }

    /// Config for a table with a known schema; index keys are left unprotected.
    pub fn for_table(
        materials_provider: Arc<dyn CryptographicMaterialsProvider>,
        attribute_actions: &AttributeActions,
        table_info: &TableInfo,
    ) -> Result<Self> {
        let attribute_actions = attribute_actions.with_index_keys(table_info.protected_index_keys()?);
        Ok(Self {
            materials_provider,
            encryption_context: table_info.encryption_context_values().into(),
            attribute_actions,
        })
    }

    /// Copy of this config with the item's key values bound into the context.
    pub fn with_item(&self, item: &Item) -> Self {
        let mut config = self.clone();
        let keys: Vec<String> = self
            .encryption_context
            .key_names()
            .map(str::to_string)
            .collect();
        for key in keys {
            if let Some(value) = item.get(&key) {
                config.encryption_context.attributes.insert(key, value.clone());
            }
        }
        config
    }
}

/// Config for one table: the caller's override if given, otherwise the
/// defaults merged with the table's schema.
///
/// An override is used verbatim, without excluding index keys. A caller who
/// supplies one is responsible for leaving key attributes unencrypted.
pub async fn resolve<C: DynamoDbApi>(
    table_name: &str,
    materials_provider: &Arc<dyn CryptographicMaterialsProvider>,
    attribute_actions: &AttributeActions,
    table_info_cache: &TableInfoCache<C>,
    override_config: Option<&CryptoConfig>,
) -> Result<CryptoConfig> {
    if let Some(config) = override_config {
        return Ok(config.clone());
    }

    let table_info = table_info_cache.table_info(table_name).await?;
    tracing::debug!(table = table_name, "resolved crypto config from table schema");
    CryptoConfig::for_table(Arc::clone(materials_provider), attribute_actions, &table_info)
}
