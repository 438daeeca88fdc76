//! Single-table facade that encrypts on write and decrypts on read.

use aws_sdk_dynamodb::operation::delete_item::{DeleteItemInput, DeleteItemOutput};
use aws_sdk_dynamodb::operation::get_item::{GetItemInput, GetItemOutput};
use aws_sdk_dynamodb::operation::put_item::{PutItemInput, PutItemOutput};
use aws_sdk_dynamodb::operation::query::{QueryInput, QueryOutput};
use aws_sdk_dynamodb::operation::scan::{ScanInput, ScanOutput};
use aws_sdk_dynamodb::types::{KeysAndAttributes, Select};
use std::sync::Arc;

use crate::api::DynamoDbApi;
use crate::crypto_config::CryptoConfig;
use crate::errors::{Error, Result};
use crate::item::{decrypt_item, encrypt_item};
use crate::materials::CryptographicMaterialsProvider;
use crate::structures::{AttributeActions, Item, TableInfo};

/// Reject read options that would drop the signature attributes.
pub fn validate_get_arguments(
    attributes_to_get: Option<&[String]>,
    projection_expression: Option<&str>,
    select: Option<&Select>,
) -> Result<()> {
    if attributes_to_get.is_some_and(|a| !a.is_empty()) {
        return Err(Error::Validation(
            "AttributesToGet cannot be used on encrypted tables".to_string(),
        ));
    }
    if projection_expression.is_some() {
        return Err(Error::Validation(
            "ProjectionExpression cannot be used on encrypted tables".to_string(),
        ));
    }
    if matches!(
        select,
        Some(Select::SpecificAttributes) | Some(Select::AllProjectedAttributes)
    ) {
        return Err(Error::Validation(format!(
            "Select {:?} cannot be used on encrypted tables",
            select
        )));
    }
    Ok(())
}

pub(crate) fn validate_keys_and_attributes(spec: &KeysAndAttributes) -> Result<()> {
    validate_get_arguments(
        spec.attributes_to_get.as_deref(),
        spec.projection_expression.as_deref(),
        None,
    )
}

/// Decrypt every item in place, keeping order.
pub(crate) async fn decrypt_all(items: &mut [Item], config: &CryptoConfig) -> Result<()> {
    for item in items.iter_mut() {
        let raw = std::mem::take(item);
        *item = decrypt_item(raw, config).await?;
    }
    Ok(())
}

/// Encrypted view of one table.
#[derive(Debug, Clone)]
pub struct EncryptedTable<C> {
    client: C,
    table_info: Arc<TableInfo>,
    /// Actions as configured, before index keys were excluded.
    attribute_actions: AttributeActions,
    auto_refresh_table_indexes: bool,
    crypto_config: CryptoConfig,
}

impl<C: DynamoDbApi> EncryptedTable<C> {
    pub fn new(
        client: C,
        materials_provider: Arc<dyn CryptographicMaterialsProvider>,
        attribute_actions: &AttributeActions,
        table_info: Arc<TableInfo>,
        auto_refresh_table_indexes: bool,
    ) -> Result<Self> {
        let crypto_config =
            CryptoConfig::for_table(materials_provider, attribute_actions, &table_info)?;
        Ok(Self {
            client,
            table_info,
            attribute_actions: attribute_actions.clone(),
            auto_refresh_table_indexes,
            crypto_config,
        })
    }

    pub fn name(&self) -> &str {
        &self.table_info.name
    }

    pub fn table_info(&self) -> &TableInfo {
        &self.table_info
    }

    pub fn auto_refresh_table_indexes(&self) -> bool {
        self.auto_refresh_table_indexes
    }

    pub fn crypto_config(&self) -> &CryptoConfig {
        &self.crypto_config
    }

    /// The raw client, for operations this facade does not wrap.
    pub fn inner(&self) -> &C {
        &self.client
    }

    /// Describe the table again and rebuild the crypto config.
    ///
    /// A no-op when auto refresh is disabled.
    pub async fn refresh_table_info(&mut self) -> Result<()> {
        if !self.auto_refresh_table_indexes {
            return Ok(());
        }
        let description = self.client.describe_table(self.name()).await?;
        let info = TableInfo::from_description(self.name(), &description)?;
        self.crypto_config = CryptoConfig::for_table(
            Arc::clone(&self.crypto_config.materials_provider),
            &self.attribute_actions,
            &info,
        )?;
        self.table_info = Arc::new(info);
        Ok(())
    }

    fn targets_this_table(&self, table_name: Option<&str>) -> Result<()> {
        match table_name {
            Some(name) if name != self.name() => Err(Error::Validation(format!(
                "request targets table '{}' but this facade wraps '{}'",
                name,
                self.name()
            ))),
            _ => Ok(()),
        }
    }

    pub async fn put_item(&self, mut input: PutItemInput) -> Result<PutItemOutput> {
        self.targets_this_table(input.table_name.as_deref())?;
        let item = input
            .item
            .take()
            .ok_or_else(|| Error::Validation("put_item requires an item".to_string()))?;
        input.item = Some(encrypt_item(item, &self.crypto_config).await?);
        input.table_name = Some(self.name().to_string());
        self.client.put_item(input).await
    }

    pub async fn get_item(&self, mut input: GetItemInput) -> Result<GetItemOutput> {
        self.targets_this_table(input.table_name.as_deref())?;
        validate_get_arguments(
            input.attributes_to_get.as_deref(),
            input.projection_expression.as_deref(),
            None,
        )?;
        input.table_name = Some(self.name().to_string());

        let mut output = self.client.get_item(input).await?;
        if let Some(item) = output.item.take() {
            output.item = Some(decrypt_item(item, &self.crypto_config).await?);
        }
        Ok(output)
    }

    /// Passed through untouched: items are addressed by key, which is never encrypted.
    pub async fn delete_item(&self, mut input: DeleteItemInput) -> Result<DeleteItemOutput> {
        self.targets_this_table(input.table_name.as_deref())?;
        input.table_name = Some(self.name().to_string());
        self.client.delete_item(input).await
    }

    pub async fn query(&self, mut input: QueryInput) -> Result<QueryOutput> {
        self.targets_this_table(input.table_name.as_deref())?;
        validate_get_arguments(
            input.attributes_to_get.as_deref(),
            input.projection_expression.as_deref(),
            input.select.as_ref(),
        )?;
        input.table_name = Some(self.name().to_string());

        let mut output = self.client.query(input).await?;
        if let Some(items) = output.items.as_mut() {
            decrypt_all(items, &self.crypto_config).await?;
        }
        Ok(output)
    }

    pub async fn scan(&self, mut input: ScanInput) -> Result<ScanOutput> {
        self.targets_this_table(input.table_name.as_deref())?;
        validate_get_arguments(
            input.attributes_to_get.as_deref(),
            input.projection_expression.as_deref(),
            input.select.as_ref(),
        )?;
        input.table_name = Some(self.name().to_string());

        let mut output = self.client.scan(input).await?;
        if let Some(items) = output.items.as_mut() {
            decrypt_all(items, &self.crypto_config).await?;
        }
        Ok(output)
    }
}
