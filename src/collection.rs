//! Table collection that yields encrypted table facades.
//!
//! Every call starts a fresh `ListTables` enumeration. Nothing is cached
//! between calls, and a stream ends exactly when the underlying listing
//! (or the requested limit) ends.

use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::api::DynamoDbApi;
use crate::errors::Result;
use crate::materials::CryptographicMaterialsProvider;
use crate::structures::AttributeActions;
use crate::table::EncryptedTable;
use crate::table_info::TableInfoCache;

/// Options for enumerating tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCollectionQuery {
    /// Forwarded to ListTables unchanged.
    pub exclusive_start_table_name: Option<String>,
    /// Total number of tables to yield.
    pub limit: Option<usize>,
    /// Tables requested per ListTables call.
    pub page_size: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct EncryptedTablesCollection<C> {
    client: C,
    materials_provider: Arc<dyn CryptographicMaterialsProvider>,
    attribute_actions: AttributeActions,
    table_info_cache: Arc<TableInfoCache<C>>,
}

struct Enumeration<C> {
    collection: EncryptedTablesCollection<C>,
    page_size: Option<i32>,
    remaining: Option<usize>,
    buffered: VecDeque<String>,
    next_start: Option<String>,
    exhausted: bool,
}

impl<C: DynamoDbApi> Enumeration<C> {
    async fn next_table(&mut self) -> Option<Result<EncryptedTable<C>>> {
        if self.remaining == Some(0) {
            return None;
        }
        while self.buffered.is_empty() {
            if self.exhausted {
                return None;
            }
            let page = match self
                .collection
                .client
                .list_tables(self.next_start.take(), self.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            };
            tracing::debug!(
                tables = page.table_names.as_ref().map_or(0, Vec::len),
                "listed table page"
            );
            self.buffered.extend(page.table_names.unwrap_or_default());
            self.next_start = page.last_evaluated_table_name;
            self.exhausted = self.next_start.is_none();
        }

        let name = self.buffered.pop_front()?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(self.collection.wrap(&name).await)
    }
}

impl<C: DynamoDbApi> EncryptedTablesCollection<C> {
    pub fn new(
        client: C,
        materials_provider: Arc<dyn CryptographicMaterialsProvider>,
        attribute_actions: AttributeActions,
        table_info_cache: Arc<TableInfoCache<C>>,
    ) -> Self {
        Self {
            client,
            materials_provider,
            attribute_actions,
            table_info_cache,
        }
    }

    /// The raw client, for operations this collection does not wrap.
    pub fn inner(&self) -> &C {
        &self.client
    }

    async fn wrap(&self, name: &str) -> Result<EncryptedTable<C>> {
        let table_info = self.table_info_cache.table_info(name).await?;
        EncryptedTable::new(
            self.client.clone(),
            Arc::clone(&self.materials_provider),
            &self.attribute_actions,
            table_info,
            self.table_info_cache.auto_refresh_table_indexes(),
        )
    }

    pub fn all(&self) -> impl Stream<Item = Result<EncryptedTable<C>>> + Send + use<C> {
        self.filter(TableCollectionQuery::default())
    }

    pub fn filter(
        &self,
        query: TableCollectionQuery,
    ) -> impl Stream<Item = Result<EncryptedTable<C>>> + Send + use<C> {
        let enumeration = Enumeration {
            collection: self.clone(),
            page_size: query.page_size,
            remaining: query.limit,
            buffered: VecDeque::new(),
            next_start: query.exclusive_start_table_name,
            exhausted: false,
        };
        stream::unfold(enumeration, |mut enumeration| async move {
            let next = enumeration.next_table().await?;
            Some((next, enumeration))
        })
    }

    pub fn limit(&self, count: usize) -> impl Stream<Item = Result<EncryptedTable<C>>> + Send + use<C> {
        self.filter(TableCollectionQuery {
            limit: Some(count),
            ..Default::default()
        })
    }

    pub fn page_size(&self, count: i32) -> impl Stream<Item = Result<EncryptedTable<C>>> + Send + use<C> {
        self.filter(TableCollectionQuery {
            page_size: Some(count),
            ..Default::default()
        })
    }
}
