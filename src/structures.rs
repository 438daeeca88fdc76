//! Value types shared by the encryption layer: attribute actions, table
//! schema snapshots and encryption contexts.

use aws_sdk_dynamodb::types::{AttributeValue, KeySchemaElement, KeyType, TableDescription};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::{Error, Result};

/// A DynamoDB item as the SDK represents it.
pub type Item = HashMap<String, AttributeValue>;

/// Protection applied to a single attribute.
///
/// Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CryptoAction {
    DoNothing,
    SignOnly,
    EncryptAndSign,
}

impl CryptoAction {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            CryptoAction::DoNothing => 0,
            CryptoAction::SignOnly => 1,
            CryptoAction::EncryptAndSign => 2,
        }
    }
}

/// Per-attribute protection policy.
///
/// This is an immutable value: every adjustment returns a new instance so a
/// default shared across tables and requests is never changed underneath
/// its other users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeActions {
    default_action: CryptoAction,
    attribute_actions: BTreeMap<String, CryptoAction>,
}

impl Default for AttributeActions {
    fn default() -> Self {
        Self {
            default_action: CryptoAction::EncryptAndSign,
            attribute_actions: BTreeMap::new(),
        }
    }
}

impl AttributeActions {
    /// Encrypt and sign everything not listed otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_action(mut self, action: CryptoAction) -> Self {
        self.default_action = action;
        self
    }

    pub fn with_attribute_action(mut self, name: impl Into<String>, action: CryptoAction) -> Self {
        self.attribute_actions.insert(name.into(), action);
        self
    }

    pub fn default_action(&self) -> CryptoAction {
        self.default_action
    }

    /// Action for `name`, falling back to the default action.
    pub fn action(&self, name: &str) -> CryptoAction {
        self.attribute_actions
            .get(name)
            .copied()
            .unwrap_or(self.default_action)
    }

    /// Explicitly configured actions, excluding the default.
    pub fn attribute_actions(&self) -> &BTreeMap<String, CryptoAction> {
        &self.attribute_actions
    }

    /// New actions with every index key forced to `DoNothing`.
    ///
    /// Key attributes must stay readable by the store, so this overrides both
    /// the default and any explicit entry for those names.
    pub fn with_index_keys<I, S>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut adjusted = self.clone();
        for key in keys {
            let key = key.as_ref();
            if let Some(explicit) = self.attribute_actions.get(key)
                && *explicit != CryptoAction::DoNothing
            {
                tracing::warn!(
                    attribute = key,
                    action = ?explicit,
                    "overriding configured action on index key attribute"
                );
            }
            adjusted
                .attribute_actions
                .insert(key.to_string(), CryptoAction::DoNothing);
        }
        adjusted
    }

    /// True when no attribute can ever be signed or encrypted.
    ///
    /// Only then may items skip the signature. Deciding per item would let
    /// an item stripped of its protected attributes pass as authentic.
    pub fn take_no_actions(&self) -> bool {
        self.default_action == CryptoAction::DoNothing
            && self
                .attribute_actions
                .values()
                .all(|action| *action == CryptoAction::DoNothing)
    }
}

/// Key attributes of one table index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIndex {
    pub partition: String,
    pub sort: Option<String>,
}

impl TableIndex {
    pub fn new(partition: impl Into<String>, sort: Option<String>) -> Self {
        Self {
            partition: partition.into(),
            sort,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.partition.as_str()).chain(self.sort.as_deref())
    }

    fn from_key_schema(schema: &[KeySchemaElement]) -> Option<Self> {
        let mut partition = None;
        let mut sort = None;
        for element in schema {
            match element.key_type() {
                KeyType::Hash => partition = Some(element.attribute_name().to_string()),
                KeyType::Range => sort = Some(element.attribute_name().to_string()),
                _ => {}
            }
        }
        partition.map(|partition| TableIndex { partition, sort })
    }
}

/// Snapshot of a table's key schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub primary_index: Option<TableIndex>,
    pub secondary_indexes: Vec<TableIndex>,
}

/// Context seed values derived from a table's schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptionContextValues {
    pub table_name: Option<String>,
    pub partition_key_name: Option<String>,
    pub sort_key_name: Option<String>,
}

impl TableInfo {
    /// Table whose indexes have not been discovered yet.
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_index: None,
            secondary_indexes: Vec::new(),
        }
    }

    pub fn new(name: impl Into<String>, primary_index: TableIndex) -> Self {
        Self {
            name: name.into(),
            primary_index: Some(primary_index),
            secondary_indexes: Vec::new(),
        }
    }

    pub fn with_secondary_index(mut self, index: TableIndex) -> Self {
        self.secondary_indexes.push(index);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.primary_index.is_some()
    }

    /// Build from a DescribeTable result.
    pub fn from_description(name: &str, description: &TableDescription) -> Result<Self> {
        let primary_index =
            TableIndex::from_key_schema(description.key_schema.as_deref().unwrap_or_default())
                .ok_or_else(|| Error::TableInfoUnavailable {
                    table: name.to_string(),
                    reason: "table description has no HASH key".to_string(),
                })?;

        let global = description
            .global_secondary_indexes
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|gsi| TableIndex::from_key_schema(gsi.key_schema.as_deref().unwrap_or_default()));
        let local = description
            .local_secondary_indexes
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|lsi| TableIndex::from_key_schema(lsi.key_schema.as_deref().unwrap_or_default()));

        Ok(Self {
            name: description.table_name.clone().unwrap_or_else(|| name.to_string()),
            primary_index: Some(primary_index),
            secondary_indexes: global.chain(local).collect(),
        })
    }

    /// Every primary and secondary key attribute name.
    ///
    /// Fails when the primary index is unknown: treating that as "no keys"
    /// would let a key attribute be encrypted.
    pub fn protected_index_keys(&self) -> Result<BTreeSet<String>> {
        let primary = self
            .primary_index
            .as_ref()
            .ok_or_else(|| Error::TableInfoUnavailable {
                table: self.name.clone(),
                reason: "primary index is unknown".to_string(),
            })?;

        Ok(primary
            .attributes()
            .chain(self.secondary_indexes.iter().flat_map(TableIndex::attributes))
            .map(str::to_string)
            .collect())
    }

    pub fn encryption_context_values(&self) -> EncryptionContextValues {
        EncryptionContextValues {
            table_name: Some(self.name.clone()),
            partition_key_name: self.primary_index.as_ref().map(|i| i.partition.clone()),
            sort_key_name: self.primary_index.as_ref().and_then(|i| i.sort.clone()),
        }
    }
}

/// Non-secret data bound to every ciphertext and signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncryptionContext {
    pub table_name: Option<String>,
    pub partition_key_name: Option<String>,
    pub sort_key_name: Option<String>,
    /// Primary key values of the item being processed.
    pub attributes: BTreeMap<String, AttributeValue>,
    pub material_description: BTreeMap<String, String>,
}

impl From<EncryptionContextValues> for EncryptionContext {
    fn from(values: EncryptionContextValues) -> Self {
        Self {
            table_name: values.table_name,
            partition_key_name: values.partition_key_name,
            sort_key_name: values.sort_key_name,
            ..Default::default()
        }
    }
}

impl EncryptionContext {
    pub fn for_table(table_name: impl Into<String>) -> Self {
        Self {
            table_name: Some(table_name.into()),
            ..Default::default()
        }
    }

    /// Key attribute names this context knows about.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.partition_key_name
            .as_deref()
            .into_iter()
            .chain(self.sort_key_name.as_deref())
    }

    /// Flat string form, used as the KMS encryption context.
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(table) = &self.table_name {
            out.insert("aws-ddb-table-name".to_string(), table.clone());
        }
        if let Some(pk) = &self.partition_key_name {
            out.insert("aws-ddb-partition-key".to_string(), pk.clone());
        }
        if let Some(sk) = &self.sort_key_name {
            out.insert("aws-ddb-sort-key".to_string(), sk.clone());
        }
        for (name, value) in &self.attributes {
            let rendered = match value {
                AttributeValue::S(s) | AttributeValue::N(s) => s.clone(),
                AttributeValue::B(b) => {
                    use base64::Engine;
                    base64::engine::general_purpose::STANDARD.encode(b.as_ref())
                }
                other => format!("{:?}", other),
            };
            out.insert(format!("aws-ddb-attr-{}", name), rendered);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableInfo {
        TableInfo::new("Orders", TableIndex::new("OrderId", Some("CreatedAt".to_string())))
            .with_secondary_index(TableIndex::new("CustomerId", None))
    }

    #[test]
    fn test_protected_index_keys_include_secondary() {
        let keys = orders().protected_index_keys().unwrap();
        let expected: BTreeSet<String> = ["OrderId", "CreatedAt", "CustomerId"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_unresolved_table_has_no_keys() {
        let err = TableInfo::unresolved("Orders").protected_index_keys().unwrap_err();
        assert!(matches!(err, Error::TableInfoUnavailable { .. }));
    }

    #[test]
    fn test_take_no_actions_looks_at_whole_config() {
        let nothing = AttributeActions::new().with_default_action(CryptoAction::DoNothing);
        assert!(nothing.take_no_actions());
        assert!(!nothing
            .clone()
            .with_attribute_action("Notes", CryptoAction::SignOnly)
            .take_no_actions());
        // Index key adjustment alone leaves a protecting default in place.
        assert!(!AttributeActions::new().with_index_keys(["OrderId"]).take_no_actions());
    }

    #[test]
    fn test_with_index_keys_leaves_original_alone() {
        let defaults = AttributeActions::new()
            .with_attribute_action("OrderId", CryptoAction::EncryptAndSign)
            .with_attribute_action("Notes", CryptoAction::SignOnly);
        let snapshot = defaults.clone();

        let adjusted = defaults.with_index_keys(["OrderId", "CustomerId"]);

        assert_eq!(defaults, snapshot);
        assert_eq!(adjusted.action("OrderId"), CryptoAction::DoNothing);
        assert_eq!(adjusted.action("CustomerId"), CryptoAction::DoNothing);
        assert_eq!(adjusted.action("Notes"), CryptoAction::SignOnly);
        assert_eq!(adjusted.action("Total"), CryptoAction::EncryptAndSign);
    }

    #[test]
    fn test_from_description_reads_all_indexes() {
        use aws_sdk_dynamodb::types::{
            GlobalSecondaryIndexDescription, LocalSecondaryIndexDescription,
        };

        let key = |name: &str, key_type: KeyType| {
            KeySchemaElement::builder()
                .attribute_name(name)
                .key_type(key_type)
                .build()
                .unwrap()
        };
        let description = TableDescription::builder()
            .table_name("Orders")
            .key_schema(key("OrderId", KeyType::Hash))
            .global_secondary_indexes(
                GlobalSecondaryIndexDescription::builder()
                    .key_schema(key("CustomerId", KeyType::Hash))
                    .key_schema(key("Placed", KeyType::Range))
                    .build(),
            )
            .local_secondary_indexes(
                LocalSecondaryIndexDescription::builder()
                    .key_schema(key("OrderId", KeyType::Hash))
                    .key_schema(key("Status", KeyType::Range))
                    .build(),
            )
            .build();

        let info = TableInfo::from_description("Orders", &description).unwrap();
        assert_eq!(info.primary_index, Some(TableIndex::new("OrderId", None)));
        let keys = info.protected_index_keys().unwrap();
        for name in ["OrderId", "CustomerId", "Placed", "Status"] {
            assert!(keys.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_context_values_from_schema() {
        let values = orders().encryption_context_values();
        assert_eq!(values.table_name.as_deref(), Some("Orders"));
        assert_eq!(values.partition_key_name.as_deref(), Some("OrderId"));
        assert_eq!(values.sort_key_name.as_deref(), Some("CreatedAt"));
    }
}
