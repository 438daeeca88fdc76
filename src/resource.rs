//! Resource-level facade over every table reachable through one client.
//!
//! `batch_get_item` and `batch_write_item` accept an optional
//! [`CryptoConfig`] override. When supplied, it is used verbatim for every
//! table in the call: no schema lookup happens and index keys are NOT
//! excluded automatically, so the caller must leave key attributes
//! unprotected in the override.

use aws_sdk_dynamodb::operation::batch_get_item::{BatchGetItemInput, BatchGetItemOutput};
use aws_sdk_dynamodb::operation::batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput};
use std::sync::Arc;

use crate::api::DynamoDbApi;
use crate::collection::EncryptedTablesCollection;
use crate::crypto_config::{resolve, CryptoConfig};
use crate::errors::Result;
use crate::item::encrypt_item;
use crate::materials::CryptographicMaterialsProvider;
use crate::structures::AttributeActions;
use crate::table::{decrypt_all, validate_keys_and_attributes, EncryptedTable};
use crate::table_info::TableInfoCache;

/// Per-table overrides for [`EncryptedResource::table`].
#[derive(Debug, Clone, Default)]
pub struct TableOverrides {
    pub materials_provider: Option<Arc<dyn CryptographicMaterialsProvider>>,
    pub attribute_actions: Option<AttributeActions>,
    pub auto_refresh_table_indexes: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct EncryptedResource<C> {
    client: C,
    materials_provider: Arc<dyn CryptographicMaterialsProvider>,
    attribute_actions: AttributeActions,
    auto_refresh_table_indexes: bool,
    table_info_cache: Arc<TableInfoCache<C>>,
    tables: EncryptedTablesCollection<C>,
}

impl<C: DynamoDbApi> EncryptedResource<C> {
    /// Resource with default actions (encrypt and sign everything but keys)
    /// and auto refresh of table indexes enabled.
    pub fn new(client: C, materials_provider: Arc<dyn CryptographicMaterialsProvider>) -> Self {
        Self::with_options(client, materials_provider, AttributeActions::new(), true)
    }

    pub fn with_options(
        client: C,
        materials_provider: Arc<dyn CryptographicMaterialsProvider>,
        attribute_actions: AttributeActions,
        auto_refresh_table_indexes: bool,
    ) -> Self {
        let table_info_cache = Arc::new(TableInfoCache::new(
            client.clone(),
            auto_refresh_table_indexes,
        ));
        let tables = EncryptedTablesCollection::new(
            client.clone(),
            Arc::clone(&materials_provider),
            attribute_actions.clone(),
            Arc::clone(&table_info_cache),
        );
        Self {
            client,
            materials_provider,
            attribute_actions,
            auto_refresh_table_indexes,
            table_info_cache,
            tables,
        }
    }

    /// The raw client, for operations this facade does not wrap.
    pub fn inner(&self) -> &C {
        &self.client
    }

    pub fn tables(&self) -> &EncryptedTablesCollection<C> {
        &self.tables
    }

    pub fn table_info_cache(&self) -> &TableInfoCache<C> {
        &self.table_info_cache
    }

    pub fn attribute_actions(&self) -> &AttributeActions {
        &self.attribute_actions
    }

    async fn crypto_config(
        &self,
        table_name: &str,
        override_config: Option<&CryptoConfig>,
    ) -> Result<CryptoConfig> {
        resolve(
            table_name,
            &self.materials_provider,
            &self.attribute_actions,
            &self.table_info_cache,
            override_config,
        )
        .await
    }

    /// Batch get, decrypting every returned item.
    ///
    /// All read specs are validated before the request is sent. Unprocessed
    /// keys and consumed capacity are returned as received.
    pub async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
        crypto_config: Option<CryptoConfig>,
    ) -> Result<BatchGetItemOutput> {
        if let Some(request_items) = &input.request_items {
            for spec in request_items.values() {
                validate_keys_and_attributes(spec)?;
            }
        }

        let mut output = self.client.batch_get_item(input).await?;

        if let Some(responses) = output.responses.as_mut() {
            for (table_name, items) in responses.iter_mut() {
                let config = self
                    .crypto_config(table_name, crypto_config.as_ref())
                    .await?;
                tracing::debug!(table = %table_name, items = items.len(), "decrypting batch get items");
                decrypt_all(items, &config).await?;
            }
        }
        Ok(output)
    }

    /// Batch write, encrypting every put request.
    ///
    /// Delete requests are forwarded untouched. The whole batch is
    /// transformed before anything is sent.
    pub async fn batch_write_item(
        &self,
        mut input: BatchWriteItemInput,
        crypto_config: Option<CryptoConfig>,
    ) -> Result<BatchWriteItemOutput> {
        if let Some(request_items) = input.request_items.as_mut() {
            for (table_name, requests) in request_items.iter_mut() {
                let config = self
                    .crypto_config(table_name, crypto_config.as_ref())
                    .await?;
                tracing::debug!(table = %table_name, requests = requests.len(), "encrypting batch write requests");

                for request in requests.iter_mut() {
                    if let Some(put) = request.put_request.as_mut() {
                        let item = std::mem::take(&mut put.item);
                        put.item = encrypt_item(item, &config).await?;
                    }
                }
            }
        }

        self.client.batch_write_item(input).await
    }

    /// Encrypted facade for one table, using `overrides` where given and
    /// this resource's defaults otherwise.
    pub async fn table(&self, name: &str, overrides: TableOverrides) -> Result<EncryptedTable<C>> {
        let table_info = self.table_info_cache.table_info(name).await?;
        let materials_provider = overrides
            .materials_provider
            .unwrap_or_else(|| Arc::clone(&self.materials_provider));
        let attribute_actions = overrides
            .attribute_actions
            .as_ref()
            .unwrap_or(&self.attribute_actions);

        EncryptedTable::new(
            self.client.clone(),
            materials_provider,
            attribute_actions,
            table_info,
            overrides
                .auto_refresh_table_indexes
                .unwrap_or(self.auto_refresh_table_indexes),
        )
    }
}
