//! The slice of the DynamoDB API the encryption layer depends on.
//!
//! Only the operations this crate actually forwards are part of the trait.
//! Anything else is reached through the raw client returned by the
//! `inner()` accessors on the facades.

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::operation::batch_get_item::{BatchGetItemInput, BatchGetItemOutput};
use aws_sdk_dynamodb::operation::batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput};
use aws_sdk_dynamodb::operation::delete_item::builders::DeleteItemFluentBuilder;
use aws_sdk_dynamodb::operation::delete_item::{DeleteItemInput, DeleteItemOutput};
use aws_sdk_dynamodb::operation::get_item::builders::GetItemFluentBuilder;
use aws_sdk_dynamodb::operation::get_item::{GetItemInput, GetItemOutput};
use aws_sdk_dynamodb::operation::list_tables::ListTablesOutput;
use aws_sdk_dynamodb::operation::put_item::builders::PutItemFluentBuilder;
use aws_sdk_dynamodb::operation::put_item::{PutItemInput, PutItemOutput};
use aws_sdk_dynamodb::operation::query::builders::QueryFluentBuilder;
use aws_sdk_dynamodb::operation::query::{QueryInput, QueryOutput};
use aws_sdk_dynamodb::operation::scan::builders::ScanFluentBuilder;
use aws_sdk_dynamodb::operation::scan::{ScanInput, ScanOutput};
use aws_sdk_dynamodb::types::TableDescription;

use crate::errors::{map_sdk_error, Error, Result};

#[async_trait]
pub trait DynamoDbApi: Clone + Send + Sync + 'static {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription>;

    /// One page of table names.
    async fn list_tables(
        &self,
        exclusive_start_table_name: Option<String>,
        limit: Option<i32>,
    ) -> Result<ListTablesOutput>;

    async fn batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput>;

    async fn batch_write_item(&self, input: BatchWriteItemInput) -> Result<BatchWriteItemOutput>;

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput>;

    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput>;

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput>;

    async fn query(&self, input: QueryInput) -> Result<QueryOutput>;

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput>;
}

#[async_trait]
impl DynamoDbApi for Client {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription> {
        let output = Client::describe_table(self)
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, Some(table_name)))?;
        output.table.ok_or_else(|| {
            Error::ResourceNotFound(format!("Table '{}' has no description", table_name))
        })
    }

    async fn list_tables(
        &self,
        exclusive_start_table_name: Option<String>,
        limit: Option<i32>,
    ) -> Result<ListTablesOutput> {
        Client::list_tables(self)
            .set_exclusive_start_table_name(exclusive_start_table_name)
            .set_limit(limit)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, None))
    }

    async fn batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput> {
        Client::batch_get_item(self)
            .set_request_items(input.request_items)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, None))
    }

    async fn batch_write_item(&self, input: BatchWriteItemInput) -> Result<BatchWriteItemOutput> {
        Client::batch_write_item(self)
            .set_request_items(input.request_items)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, None))
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput> {
        let table = input.table_name.clone();
        put_item_request(self, input)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, table.as_deref()))
    }

    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput> {
        let table = input.table_name.clone();
        get_item_request(self, input)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, table.as_deref()))
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput> {
        let table = input.table_name.clone();
        delete_item_request(self, input)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, table.as_deref()))
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput> {
        let table = input.table_name.clone();
        query_request(self, input)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, table.as_deref()))
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput> {
        let table = input.table_name.clone();
        scan_request(self, input)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, table.as_deref()))
    }
}

// Request builders carry every input field, legacy conditions included.

fn put_item_request(client: &Client, input: PutItemInput) -> PutItemFluentBuilder {
    client
        .put_item()
        .set_table_name(input.table_name)
        .set_item(input.item)
        .set_expected(input.expected)
        .set_conditional_operator(input.conditional_operator)
        .set_condition_expression(input.condition_expression)
        .set_expression_attribute_names(input.expression_attribute_names)
        .set_expression_attribute_values(input.expression_attribute_values)
        .set_return_values(input.return_values)
        .set_return_consumed_capacity(input.return_consumed_capacity)
        .set_return_item_collection_metrics(input.return_item_collection_metrics)
        .set_return_values_on_condition_check_failure(input.return_values_on_condition_check_failure)
}

fn get_item_request(client: &Client, input: GetItemInput) -> GetItemFluentBuilder {
    client
        .get_item()
        .set_table_name(input.table_name)
        .set_key(input.key)
        .set_attributes_to_get(input.attributes_to_get)
        .set_projection_expression(input.projection_expression)
        .set_expression_attribute_names(input.expression_attribute_names)
        .set_consistent_read(input.consistent_read)
        .set_return_consumed_capacity(input.return_consumed_capacity)
}

fn delete_item_request(client: &Client, input: DeleteItemInput) -> DeleteItemFluentBuilder {
    client
        .delete_item()
        .set_table_name(input.table_name)
        .set_key(input.key)
        .set_expected(input.expected)
        .set_conditional_operator(input.conditional_operator)
        .set_condition_expression(input.condition_expression)
        .set_expression_attribute_names(input.expression_attribute_names)
        .set_expression_attribute_values(input.expression_attribute_values)
        .set_return_values(input.return_values)
        .set_return_consumed_capacity(input.return_consumed_capacity)
        .set_return_item_collection_metrics(input.return_item_collection_metrics)
        .set_return_values_on_condition_check_failure(input.return_values_on_condition_check_failure)
}

fn query_request(client: &Client, input: QueryInput) -> QueryFluentBuilder {
    client
        .query()
        .set_table_name(input.table_name)
        .set_index_name(input.index_name)
        .set_select(input.select)
        .set_attributes_to_get(input.attributes_to_get)
        .set_limit(input.limit)
        .set_consistent_read(input.consistent_read)
        .set_key_conditions(input.key_conditions)
        .set_query_filter(input.query_filter)
        .set_conditional_operator(input.conditional_operator)
        .set_scan_index_forward(input.scan_index_forward)
        .set_exclusive_start_key(input.exclusive_start_key)
        .set_return_consumed_capacity(input.return_consumed_capacity)
        .set_projection_expression(input.projection_expression)
        .set_filter_expression(input.filter_expression)
        .set_key_condition_expression(input.key_condition_expression)
        .set_expression_attribute_names(input.expression_attribute_names)
        .set_expression_attribute_values(input.expression_attribute_values)
}

fn scan_request(client: &Client, input: ScanInput) -> ScanFluentBuilder {
    client
        .scan()
        .set_table_name(input.table_name)
        .set_index_name(input.index_name)
        .set_attributes_to_get(input.attributes_to_get)
        .set_limit(input.limit)
        .set_select(input.select)
        .set_scan_filter(input.scan_filter)
        .set_conditional_operator(input.conditional_operator)
        .set_exclusive_start_key(input.exclusive_start_key)
        .set_return_consumed_capacity(input.return_consumed_capacity)
        .set_total_segments(input.total_segments)
        .set_segment(input.segment)
        .set_projection_expression(input.projection_expression)
        .set_filter_expression(input.filter_expression)
        .set_expression_attribute_names(input.expression_attribute_names)
        .set_expression_attribute_values(input.expression_attribute_values)
        .set_consistent_read(input.consistent_read)
}
