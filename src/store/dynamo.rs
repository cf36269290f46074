//! DynamoDB store backends.
//!
//! Both tables are plain `Pk`/`Sk` string-keyed tables. Selection works by
//! scanning and filtering in code; no secondary index is assumed. That is a
//! documented scaling limitation — an indexed query by lifecycle state
//! could replace the scan without changing observable behavior.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::debug;

use crate::error::{Result, StoreError};

use super::store::{CleanupStore, InventoryStore};
use super::types::{
    ExecutionAction, ExecutionRecord, ExecutionTarget, Plan, PlanMode, PlanState,
    RoleClassification, RoleQuarantineRecord, RoleUsage, StackKey, StackSummary, SummaryState,
    EXEC_SORT_KEY, PLAN_SORT_KEY, ROLE_SORT_PREFIX, SUMMARY_SORT_KEY,
};

/// One table item.
type Item = HashMap<String, AttributeValue>;

/// DynamoDB-backed view of the upstream inventory table.
#[derive(Debug, Clone)]
pub struct DynamoInventoryStore {
    client: Client,
    table: String,
}

impl DynamoInventoryStore {
    /// Creates a store over the named table.
    #[must_use]
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl InventoryStore for DynamoInventoryStore {
    async fn stack_summaries(&self, accounts: &[String]) -> Result<Vec<StackSummary>> {
        let items = scan_table(&self.client, &self.table).await?;
        debug!("Scanned {} inventory items", items.len());

        let mut summaries = Vec::new();
        for item in items {
            if string_attr(&item, "Sk").as_deref() != Some(SUMMARY_SORT_KEY) {
                continue;
            }
            let Some(account) = string_attr(&item, "AccountId") else {
                continue;
            };
            if !accounts.contains(&account) {
                continue;
            }
            summaries.push(parse_summary(&item, account)?);
        }
        Ok(summaries)
    }

    async fn role_classifications(&self, key: &StackKey) -> Result<Vec<RoleClassification>> {
        let pk = key.inventory_partition_key();
        let items = query_role_items(&self.client, &self.table, &pk).await?;

        let mut roles = Vec::new();
        for item in items {
            let role = string_attr(&item, "RoleName")
                .ok_or_else(|| StoreError::malformed(&pk, "missing RoleName"))?;
            let usage = string_attr(&item, "Used")
                .and_then(|v| RoleUsage::parse(&v))
                .ok_or_else(|| StoreError::malformed(&pk, "missing or unknown Used"))?;
            roles.push(RoleClassification { role, usage });
        }
        Ok(roles)
    }
}

/// DynamoDB-backed cleanup-state table.
#[derive(Debug, Clone)]
pub struct DynamoCleanupStore {
    client: Client,
    table: String,
}

impl DynamoCleanupStore {
    /// Creates a store over the named table.
    #[must_use]
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl CleanupStore for DynamoCleanupStore {
    async fn plans_in_states(
        &self,
        accounts: &[String],
        states: &[PlanState],
    ) -> Result<Vec<Plan>> {
        let items = scan_table(&self.client, &self.table).await?;

        let mut plans = Vec::new();
        for item in items {
            if string_attr(&item, "Sk").as_deref() != Some(PLAN_SORT_KEY) {
                continue;
            }
            let plan = parse_plan(&item)?;
            if accounts.contains(&plan.key.account) && states.contains(&plan.state) {
                plans.push(plan);
            }
        }
        plans.sort_by(|a, b| a.key.partition_key().cmp(&b.key.partition_key()));
        Ok(plans)
    }

    async fn put_plan(&self, plan: &Plan) -> Result<()> {
        let unused = string_list_value(&plan.unused_roles);
        let used = string_list_value(&plan.used_roles);

        self.client
            .put_item()
            .table_name(&self.table)
            .item("Pk", AttributeValue::S(plan.key.partition_key()))
            .item("Sk", AttributeValue::S(PLAN_SORT_KEY.to_string()))
            .item("Mode", AttributeValue::S(plan.mode.as_str().to_string()))
            .item("UnusedRoles", unused)
            .item("UsedRoles", used)
            .item("DeleteStack", AttributeValue::Bool(plan.delete_stack))
            .item("ChangeSetName", AttributeValue::S(plan.change_set_name.clone()))
            .item("State", AttributeValue::S(plan.state.as_str().to_string()))
            .item("UpdatedAt", AttributeValue::S(plan.updated_at.to_rfc3339()))
            .send()
            .await
            .map_err(|e| StoreError::request("put_plan", e.to_string()))?;
        Ok(())
    }

    async fn advance_plan(&self, key: &StackKey, state: PlanState) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key("Pk", AttributeValue::S(key.partition_key()))
            .key("Sk", AttributeValue::S(PLAN_SORT_KEY.to_string()))
            .update_expression("SET #S = :s, UpdatedAt = :t")
            .expression_attribute_names("#S", "State")
            .expression_attribute_values(":s", AttributeValue::S(state.as_str().to_string()))
            .expression_attribute_values(":t", AttributeValue::S(now_rfc3339()))
            .send()
            .await
            .map_err(|e| StoreError::request("advance_plan", e.to_string()))?;
        Ok(())
    }

    async fn prepare_execution(&self, key: &StackKey, target: &ExecutionTarget) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key("Pk", AttributeValue::S(key.partition_key()))
            .key("Sk", AttributeValue::S(PLAN_SORT_KEY.to_string()))
            .update_expression("SET ChangeSetName = :c, DeleteStack = :d, #S = :s, UpdatedAt = :t")
            .expression_attribute_names("#S", "State")
            .expression_attribute_values(
                ":c",
                AttributeValue::S(target.change_set_name().to_string()),
            )
            .expression_attribute_values(":d", AttributeValue::Bool(target.is_delete()))
            .expression_attribute_values(
                ":s",
                AttributeValue::S(PlanState::ChangesetPrepared.as_str().to_string()),
            )
            .expression_attribute_values(":t", AttributeValue::S(now_rfc3339()))
            .send()
            .await
            .map_err(|e| StoreError::request("prepare_execution", e.to_string()))?;
        Ok(())
    }

    async fn put_role_record(
        &self,
        key: &StackKey,
        record: &RoleQuarantineRecord,
    ) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .item("Pk", AttributeValue::S(key.partition_key()))
            .item(
                "Sk",
                AttributeValue::S(format!("{ROLE_SORT_PREFIX}{}", record.role)),
            )
            .item("State", AttributeValue::S(record.state.as_str().to_string()))
            .item("BackupKey", AttributeValue::S(record.backup_location.clone()))
            .item("UpdatedAt", AttributeValue::S(record.updated_at.to_rfc3339()))
            .send()
            .await
            .map_err(|e| StoreError::request("put_role_record", e.to_string()))?;
        Ok(())
    }

    async fn put_execution(&self, key: &StackKey, record: &ExecutionRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .item("Pk", AttributeValue::S(key.partition_key()))
            .item("Sk", AttributeValue::S(EXEC_SORT_KEY.to_string()))
            .item("Action", AttributeValue::S(record.action.as_str().to_string()))
            .item("Status", AttributeValue::S(record.status.clone()))
            .item("UpdatedAt", AttributeValue::S(record.updated_at.to_rfc3339()))
            .send()
            .await
            .map_err(|e| StoreError::request("put_execution", e.to_string()))?;
        Ok(())
    }

    async fn executions(&self, accounts: &[String]) -> Result<Vec<(StackKey, ExecutionRecord)>> {
        let items = scan_table(&self.client, &self.table).await?;

        let mut records = Vec::new();
        for item in items {
            if string_attr(&item, "Sk").as_deref() != Some(EXEC_SORT_KEY) {
                continue;
            }
            let (key, record) = parse_execution(&item)?;
            if accounts.contains(&key.account) {
                records.push((key, record));
            }
        }
        records.sort_by(|a, b| a.0.partition_key().cmp(&b.0.partition_key()));
        Ok(records)
    }
}

/// Scans a whole table, following pagination.
async fn scan_table(client: &Client, table: &str) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let mut request = client.scan().table_name(table);
        if let Some(key) = start_key.take() {
            request = request.set_exclusive_start_key(Some(key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::request("scan", e.to_string()))?;

        items.extend(response.items.unwrap_or_default());

        match response.last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => break,
        }
    }

    Ok(items)
}

/// Queries the role items of one inventory partition, following pagination.
async fn query_role_items(client: &Client, table: &str, pk: &str) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let mut request = client
            .query()
            .table_name(table)
            .key_condition_expression("Pk = :pk AND begins_with(Sk, :prefix)")
            .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()))
            .expression_attribute_values(
                ":prefix",
                AttributeValue::S(ROLE_SORT_PREFIX.to_string()),
            );
        if let Some(key) = start_key.take() {
            request = request.set_exclusive_start_key(Some(key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::request("query", e.to_string()))?;

        items.extend(response.items.unwrap_or_default());

        match response.last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => break,
        }
    }

    Ok(items)
}

/// Reads a string attribute, if present.
fn string_attr(item: &Item, name: &str) -> Option<String> {
    item.get(name).and_then(|v| v.as_s().ok()).cloned()
}

/// Reads a string-list attribute; absent means empty.
fn string_list_attr(item: &Item, name: &str) -> Vec<String> {
    item.get(name)
        .and_then(|v| v.as_l().ok())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_s().ok().cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// Reads a bool attribute; absent means false.
fn bool_attr(item: &Item, name: &str) -> bool {
    item.get(name)
        .and_then(|v| v.as_bool().ok())
        .copied()
        .unwrap_or(false)
}

/// Builds a string-list attribute value.
fn string_list_value(values: &[String]) -> AttributeValue {
    AttributeValue::L(
        values
            .iter()
            .map(|v| AttributeValue::S(v.clone()))
            .collect(),
    )
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Parses an RFC 3339 timestamp attribute, defaulting to epoch when absent.
fn timestamp_attr(item: &Item, name: &str) -> chrono::DateTime<chrono::Utc> {
    string_attr(item, name)
        .and_then(|v| chrono::DateTime::parse_from_rfc3339(&v).ok())
        .map_or_else(
            || chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            |t| t.with_timezone(&chrono::Utc),
        )
}

/// Parses a stack summary from an inventory item.
fn parse_summary(item: &Item, account: String) -> Result<StackSummary> {
    let stack = string_attr(item, "StackName")
        .ok_or_else(|| StoreError::malformed(&account, "missing StackName"))?;

    // The producer nests the aggregate state under Summary.State.
    let state = item
        .get("Summary")
        .and_then(|v| v.as_m().ok())
        .and_then(|m| m.get("State"))
        .and_then(|v| v.as_s().ok())
        .and_then(|v| SummaryState::parse(v))
        .unwrap_or(SummaryState::Pending);

    Ok(StackSummary {
        key: StackKey::new(account, stack),
        state,
    })
}

/// Parses a plan from a cleanup-table item.
fn parse_plan(item: &Item) -> Result<Plan> {
    let pk = string_attr(item, "Pk")
        .ok_or_else(|| StoreError::malformed("<unknown>", "missing Pk"))?;
    let key = StackKey::from_partition_key(&pk)?;

    let mode = string_attr(item, "Mode")
        .and_then(|v| PlanMode::parse(&v))
        .ok_or_else(|| StoreError::malformed(&pk, "missing or unknown Mode"))?;
    let state = string_attr(item, "State")
        .and_then(|v| PlanState::parse(&v))
        .ok_or_else(|| StoreError::malformed(&pk, "missing or unknown State"))?;
    let change_set_name = string_attr(item, "ChangeSetName")
        .unwrap_or_else(|| super::types::CHANGE_SET_NONE.to_string());

    Ok(Plan {
        key,
        mode,
        unused_roles: string_list_attr(item, "UnusedRoles"),
        used_roles: string_list_attr(item, "UsedRoles"),
        delete_stack: bool_attr(item, "DeleteStack"),
        change_set_name,
        state,
        updated_at: timestamp_attr(item, "UpdatedAt"),
    })
}

/// Parses an execution record from a cleanup-table item.
fn parse_execution(item: &Item) -> Result<(StackKey, ExecutionRecord)> {
    let pk = string_attr(item, "Pk")
        .ok_or_else(|| StoreError::malformed("<unknown>", "missing Pk"))?;
    let key = StackKey::from_partition_key(&pk)?;

    let action = string_attr(item, "Action")
        .and_then(|v| ExecutionAction::parse(&v))
        .ok_or_else(|| StoreError::malformed(&pk, "missing or unknown Action"))?;
    let status = string_attr(item, "Status")
        .ok_or_else(|| StoreError::malformed(&pk, "missing Status"))?;

    Ok((
        key,
        ExecutionRecord {
            action,
            status,
            updated_at: timestamp_attr(item, "UpdatedAt"),
        },
    ))
}
