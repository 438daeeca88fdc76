//! In-memory DynamoDB stand-in for unit tests.

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::batch_get_item::{BatchGetItemInput, BatchGetItemOutput};
use aws_sdk_dynamodb::operation::batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput};
use aws_sdk_dynamodb::operation::delete_item::{DeleteItemInput, DeleteItemOutput};
use aws_sdk_dynamodb::operation::get_item::{GetItemInput, GetItemOutput};
use aws_sdk_dynamodb::operation::list_tables::ListTablesOutput;
use aws_sdk_dynamodb::operation::put_item::{PutItemInput, PutItemOutput};
use aws_sdk_dynamodb::operation::query::{QueryInput, QueryOutput};
use aws_sdk_dynamodb::operation::scan::{ScanInput, ScanOutput};
use aws_sdk_dynamodb::types::{
    GlobalSecondaryIndexDescription, KeySchemaElement, KeyType, TableDescription,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::api::DynamoDbApi;
use crate::errors::{Error, Result};
use crate::structures::Item;

#[derive(Debug, Default)]
struct FakeTable {
    partition: String,
    sort: Option<String>,
    /// (index name, partition key, sort key)
    global_indexes: Vec<(String, String, Option<String>)>,
    items: Vec<Item>,
}

impl FakeTable {
    fn key_of(&self, item: &Item) -> Vec<Option<aws_sdk_dynamodb::types::AttributeValue>> {
        std::iter::once(&self.partition)
            .chain(self.sort.as_ref())
            .map(|name| item.get(name).cloned())
            .collect()
    }

    fn position(&self, key: &Item) -> Option<usize> {
        let wanted = self.key_of(key);
        self.items.iter().position(|item| self.key_of(item) == wanted)
    }

    fn put(&mut self, item: Item) {
        match self.position(&item) {
            Some(pos) => self.items[pos] = item,
            None => self.items.push(item),
        }
    }

    fn delete(&mut self, key: &Item) {
        if let Some(pos) = self.position(key) {
            self.items.remove(pos);
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    tables: BTreeMap<String, FakeTable>,
    describe_calls: usize,
    list_calls: usize,
    batch_writes: Vec<BatchWriteItemInput>,
    batch_gets: usize,
    /// Raw items returned by batch get instead of looking keys up.
    canned_batch_get: Option<HashMap<String, Vec<Item>>>,
}

/// Shared-state fake: clones observe the same tables and counters.
#[derive(Debug, Clone, Default)]
pub struct FakeDynamoDb {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDynamoDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, partition: &str, sort: Option<&str>) -> Self {
        self.state.lock().unwrap().tables.insert(
            name.to_string(),
            FakeTable {
                partition: partition.to_string(),
                sort: sort.map(str::to_string),
                global_indexes: Vec::new(),
                items: Vec::new(),
            },
        );
        self
    }

    pub fn with_canned_batch_get(self, responses: HashMap<String, Vec<Item>>) -> Self {
        self.state.lock().unwrap().canned_batch_get = Some(responses);
        self
    }

    /// Add a global secondary index to a table registered with `with_table`.
    pub fn with_global_index(
        self,
        table: &str,
        index: &str,
        partition: &str,
        sort: Option<&str>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .tables
            .get_mut(table)
            .expect("unknown table")
            .global_indexes
            .push((index.to_string(), partition.to_string(), sort.map(str::to_string)));
        self
    }

    pub fn stored(&self, table: &str) -> Vec<Item> {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map(|t| t.items.clone()).unwrap_or_default()
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn batch_get_calls(&self) -> usize {
        self.state.lock().unwrap().batch_gets
    }

    pub fn batch_writes(&self) -> Vec<BatchWriteItemInput> {
        self.state.lock().unwrap().batch_writes.clone()
    }

    fn with_table_mut<T>(&self, name: Option<&str>, f: impl FnOnce(&mut FakeTable) -> T) -> Result<T> {
        let name = name.unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        let table = state
            .tables
            .get_mut(name)
            .ok_or_else(|| Error::ResourceNotFound(format!("Table '{}' not found", name)))?;
        Ok(f(table))
    }
}

fn key_schema(partition: &str, sort: Option<&str>) -> Vec<KeySchemaElement> {
    let element = |name: &str, key_type: KeyType| {
        KeySchemaElement::builder()
            .attribute_name(name)
            .key_type(key_type)
            .build()
            .unwrap()
    };
    std::iter::once(element(partition, KeyType::Hash))
        .chain(sort.map(|sort| element(sort, KeyType::Range)))
        .collect()
}

#[async_trait]
impl DynamoDbApi for FakeDynamoDb {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        let table = state
            .tables
            .get(table_name)
            .ok_or_else(|| Error::ResourceNotFound(format!("Table '{}' not found", table_name)))?;

        let mut builder = TableDescription::builder()
            .table_name(table_name)
            .set_key_schema(Some(key_schema(&table.partition, table.sort.as_deref())));
        for (index, partition, sort) in &table.global_indexes {
            builder = builder.global_secondary_indexes(
                GlobalSecondaryIndexDescription::builder()
                    .index_name(index)
                    .set_key_schema(Some(key_schema(partition, sort.as_deref())))
                    .build(),
            );
        }
        Ok(builder.build())
    }

    async fn list_tables(
        &self,
        exclusive_start_table_name: Option<String>,
        limit: Option<i32>,
    ) -> Result<ListTablesOutput> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;

        let names: Vec<String> = state
            .tables
            .keys()
            .filter(|name| match &exclusive_start_table_name {
                Some(start) => *name > start,
                None => true,
            })
            .cloned()
            .collect();
        let page_len = limit.map(|l| l as usize).unwrap_or(100);
        let page: Vec<String> = names.iter().take(page_len).cloned().collect();
        let last = if names.len() > page.len() {
            page.last().cloned()
        } else {
            None
        };

        Ok(ListTablesOutput::builder()
            .set_table_names(Some(page))
            .set_last_evaluated_table_name(last)
            .build())
    }

    async fn batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput> {
        let mut state = self.state.lock().unwrap();
        state.batch_gets += 1;
        if let Some(canned) = &state.canned_batch_get {
            return Ok(BatchGetItemOutput::builder()
                .set_responses(Some(canned.clone()))
                .build());
        }

        let mut responses = HashMap::new();
        for (table_name, request) in input.request_items.unwrap_or_default() {
            let table = state
                .tables
                .get(&table_name)
                .ok_or_else(|| Error::ResourceNotFound(format!("Table '{}' not found", table_name)))?;
            let found: Vec<Item> = request
                .keys()
                .iter()
                .filter_map(|key| table.position(key).map(|pos| table.items[pos].clone()))
                .collect();
            responses.insert(table_name, found);
        }
        Ok(BatchGetItemOutput::builder()
            .set_responses(Some(responses))
            .build())
    }

    async fn batch_write_item(&self, input: BatchWriteItemInput) -> Result<BatchWriteItemOutput> {
        let mut state = self.state.lock().unwrap();
        state.batch_writes.push(input.clone());

        for (table_name, requests) in input.request_items.unwrap_or_default() {
            let table = state
                .tables
                .get_mut(&table_name)
                .ok_or_else(|| Error::ResourceNotFound(format!("Table '{}' not found", table_name)))?;
            for request in requests {
                if let Some(put) = request.put_request {
                    table.put(put.item);
                } else if let Some(delete) = request.delete_request {
                    table.delete(&delete.key);
                }
            }
        }
        Ok(BatchWriteItemOutput::builder().build())
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput> {
        let item = input.item.unwrap_or_default();
        self.with_table_mut(input.table_name.as_deref(), |table| table.put(item))?;
        Ok(PutItemOutput::builder().build())
    }

    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput> {
        let key = input.key.unwrap_or_default();
        let item = self.with_table_mut(input.table_name.as_deref(), |table| {
            table.position(&key).map(|pos| table.items[pos].clone())
        })?;
        Ok(GetItemOutput::builder().set_item(item).build())
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput> {
        let key = input.key.unwrap_or_default();
        self.with_table_mut(input.table_name.as_deref(), |table| table.delete(&key))?;
        Ok(DeleteItemOutput::builder().build())
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput> {
        let items = self.with_table_mut(input.table_name.as_deref(), |table| table.items.clone())?;
        Ok(QueryOutput::builder()
            .count(items.len() as i32)
            .set_items(Some(items))
            .build())
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput> {
        let items = self.with_table_mut(input.table_name.as_deref(), |table| table.items.clone())?;
        Ok(ScanOutput::builder()
            .count(items.len() as i32)
            .set_items(Some(items))
            .build())
    }
}
