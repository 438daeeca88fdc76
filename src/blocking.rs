//! Blocking wrappers over the async facades.
//!
//! Each call runs to completion on a global shared Tokio runtime, so a
//! synchronous caller sees plain request/response semantics. Do not call
//! these from inside an async context.

use aws_sdk_dynamodb::operation::batch_get_item::{BatchGetItemInput, BatchGetItemOutput};
use aws_sdk_dynamodb::operation::batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput};
use futures::{Stream, StreamExt};
use once_cell::sync::Lazy;
use std::pin::Pin;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::api::DynamoDbApi;
use crate::collection::TableCollectionQuery;
use crate::crypto_config::CryptoConfig;
use crate::errors::{Error, Result};
use crate::resource::{EncryptedResource, TableOverrides};
use crate::table::EncryptedTable;

/// Global shared Tokio runtime, created on first use.
static RUNTIME: Lazy<std::result::Result<Arc<Runtime>, String>> =
    Lazy::new(|| Runtime::new().map(Arc::new).map_err(|e| e.to_string()));

fn runtime() -> Result<Arc<Runtime>> {
    (*RUNTIME).clone().map_err(|e| {
        Error::Configuration(format!("Failed to create global Tokio runtime: {}", e))
    })
}

/// Synchronous view of an [`EncryptedResource`].
#[derive(Debug, Clone)]
pub struct BlockingEncryptedResource<C> {
    inner: EncryptedResource<C>,
    runtime: Arc<Runtime>,
}

type TableStream<C> = Pin<Box<dyn Stream<Item = Result<EncryptedTable<C>>> + Send>>;

/// Iterator that drives a lazy table stream one item at a time.
pub struct BlockingTables<C> {
    stream: TableStream<C>,
    runtime: Arc<Runtime>,
}

impl<C> Iterator for BlockingTables<C> {
    type Item = Result<EncryptedTable<C>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}

impl<C: DynamoDbApi> BlockingEncryptedResource<C> {
    pub fn new(inner: EncryptedResource<C>) -> Result<Self> {
        Ok(Self {
            inner,
            runtime: runtime()?,
        })
    }

    /// The async resource this wraps.
    pub fn inner(&self) -> &EncryptedResource<C> {
        &self.inner
    }

    pub fn batch_get_item(
        &self,
        input: BatchGetItemInput,
        crypto_config: Option<CryptoConfig>,
    ) -> Result<BatchGetItemOutput> {
        self.runtime
            .block_on(self.inner.batch_get_item(input, crypto_config))
    }

    pub fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
        crypto_config: Option<CryptoConfig>,
    ) -> Result<BatchWriteItemOutput> {
        self.runtime
            .block_on(self.inner.batch_write_item(input, crypto_config))
    }

    pub fn table(&self, name: &str, overrides: TableOverrides) -> Result<EncryptedTable<C>> {
        self.runtime.block_on(self.inner.table(name, overrides))
    }

    fn iterate(&self, stream: TableStream<C>) -> BlockingTables<C> {
        BlockingTables {
            stream,
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn all_tables(&self) -> BlockingTables<C> {
        self.iterate(Box::pin(self.inner.tables().all()))
    }

    pub fn filter_tables(&self, query: TableCollectionQuery) -> BlockingTables<C> {
        self.iterate(Box::pin(self.inner.tables().filter(query)))
    }

    pub fn limit_tables(&self, count: usize) -> BlockingTables<C> {
        self.iterate(Box::pin(self.inner.tables().limit(count)))
    }

    pub fn page_size_tables(&self, count: i32) -> BlockingTables<C> {
        self.iterate(Box::pin(self.inner.tables().page_size(count)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::RawMaterialsProvider;
    use crate::testing::FakeDynamoDb;
    use aws_sdk_dynamodb::types::{AttributeValue, KeysAndAttributes, PutRequest, WriteRequest};
    use std::collections::HashMap;

    fn blocking(fake: &FakeDynamoDb) -> BlockingEncryptedResource<FakeDynamoDb> {
        let resource =
            EncryptedResource::new(fake.clone(), Arc::new(RawMaterialsProvider::generate()));
        BlockingEncryptedResource::new(resource).unwrap()
    }

    #[test]
    fn test_blocking_round_trip() {
        let fake = FakeDynamoDb::new().with_table("Orders", "OrderId", None);
        let resource = blocking(&fake);
        let item = HashMap::from([
            ("OrderId".to_string(), AttributeValue::S("123".to_string())),
            ("Total".to_string(), AttributeValue::N("42".to_string())),
        ]);
        let key = HashMap::from([("OrderId".to_string(), AttributeValue::S("123".to_string()))]);

        resource
            .batch_write_item(
                BatchWriteItemInput::builder()
                    .request_items(
                        "Orders",
                        vec![WriteRequest::builder()
                            .put_request(
                                PutRequest::builder()
                                    .set_item(Some(item.clone()))
                                    .build()
                                    .unwrap(),
                            )
                            .build()],
                    )
                    .build()
                    .unwrap(),
                None,
            )
            .unwrap();

        let output = resource
            .batch_get_item(
                BatchGetItemInput::builder()
                    .request_items(
                        "Orders",
                        KeysAndAttributes::builder().keys(key).build().unwrap(),
                    )
                    .build()
                    .unwrap(),
                None,
            )
            .unwrap();
        assert_eq!(output.responses.unwrap()["Orders"], vec![item]);
    }

    #[test]
    fn test_blocking_table_iteration_restarts() {
        let fake = FakeDynamoDb::new()
            .with_table("A", "Id", None)
            .with_table("B", "Id", None);
        let resource = blocking(&fake);

        let first: Vec<String> = resource
            .all_tables()
            .map(|t| t.unwrap().name().to_string())
            .collect();
        let second = resource.page_size_tables(1).count();

        assert_eq!(first, vec!["A", "B"]);
        assert_eq!(second, 2);
        assert_eq!(fake.list_calls(), 3);
    }
}
