//! Odoo JSON-RPC catalog client.
//!
//! All calls go through `POST {base_url}/jsonrpc`: one `common.login` to obtain
//! a uid, then `object.execute_kw` for every model call. Transient failures
//! (network errors, 502/503/504) are retried here with exponential backoff;
//! everything else is returned to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Mutex;

use catbridge_catalog::{
    NewTemplate, RemoteAttribute, RemoteAttributeValue, RemoteUnit, RemoteVariant, VariantUpdate,
};
use catbridge_core::RemoteId;
use catbridge_migration::RetryPolicy;

use super::{CatalogClient, RemoteError, RemoteResult};

const ATTRIBUTE_MODEL: &str = "product.attribute";
const VALUE_MODEL: &str = "product.attribute.value";
const UNIT_MODEL: &str = "uom.uom";
const TEMPLATE_MODEL: &str = "product.template";
const VARIANT_MODEL: &str = "product.product";

#[derive(Debug, Clone)]
pub struct OdooConfig {
    pub base_url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Transport-level retry for transient failures.
    pub transport_retry: RetryPolicy,
    /// Unit category new units are created in.
    pub unit_category_id: RemoteId,
}

impl OdooConfig {
    pub fn new(
        base_url: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            timeout: Duration::from_secs(30),
            transport_retry: RetryPolicy::exponential(3, Duration::from_millis(500), Duration::from_secs(8)),
            unit_category_id: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_transport_retry(mut self, policy: RetryPolicy) -> Self {
        self.transport_retry = policy;
        self
    }
}

pub struct OdooCatalogClient {
    http: reqwest::Client,
    config: OdooConfig,
    uid: Mutex<Option<i64>>,
    request_id: AtomicU64,
}

impl OdooCatalogClient {
    pub fn new(config: OdooConfig) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            config,
            uid: Mutex::new(None),
            request_id: AtomicU64::new(1),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/jsonrpc", self.config.base_url)
    }

    /// One JSON-RPC call with transport-level retry.
    async fn call(&self, service: &str, method: &str, args: Value) -> RemoteResult<Value> {
        let policy = &self.config.transport_retry;
        let mut attempt = 0;

        loop {
            match self.call_once(service, method, &args).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_transient() && policy.should_retry(attempt) => {
                    attempt += 1;
                    let delay = policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        service,
                        method,
                        attempt,
                        error = %err,
                        "transient remote failure; retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn call_once(&self, service: &str, method: &str, args: &Value) -> RemoteResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {
                "service": service,
                "method": method,
                "args": args,
            },
            "id": id,
        });

        let resp = self
            .http
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Value = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        parse_rpc_response(envelope)
    }

    /// Cached uid, logging in on first use.
    async fn uid(&self) -> RemoteResult<i64> {
        let mut guard = self.uid.lock().await;
        if let Some(uid) = *guard {
            return Ok(uid);
        }

        let result = self
            .call(
                "common",
                "login",
                json!([self.config.database, self.config.username, self.config.password]),
            )
            .await?;

        let uid = result
            .as_i64()
            .ok_or_else(|| RemoteError::remote("authentication failed"))?;

        tracing::info!(uid, database = %self.config.database, "authenticated against remote catalog");
        *guard = Some(uid);
        Ok(uid)
    }

    async fn execute_kw(&self, model: &str, method: &str, args: Value, kwargs: Value) -> RemoteResult<Value> {
        let uid = self.uid().await?;
        self.call(
            "object",
            "execute_kw",
            json!([
                self.config.database,
                uid,
                self.config.password,
                model,
                method,
                args,
                kwargs,
            ]),
        )
        .await
    }

    async fn search_read(&self, model: &str, domain: Value, fields: &[&str]) -> RemoteResult<Vec<Value>> {
        let result = self
            .execute_kw(model, "search_read", json!([domain]), json!({ "fields": fields }))
            .await?;

        match result {
            Value::Array(rows) => Ok(rows),
            other => Err(RemoteError::Decode(format!(
                "{model}.search_read returned {other}"
            ))),
        }
    }

    async fn create(&self, model: &str, values: Value) -> RemoteResult<RemoteId> {
        let result = self
            .execute_kw(model, "create", json!([values]), json!({}))
            .await?;
        created_id(model, &result)
    }
}

/// Unwrap a JSON-RPC envelope into its `result`, or map its `error`.
fn parse_rpc_response(envelope: Value) -> RemoteResult<Value> {
    if let Some(error) = envelope.get("error") {
        let code = error.get("code").and_then(Value::as_i64);
        // Odoo puts the useful text in `data.message`; the top-level message is generic.
        let message = error
            .pointer("/data/message")
            .and_then(Value::as_str)
            .or_else(|| error.get("message").and_then(Value::as_str))
            .unwrap_or("unknown remote error")
            .to_string();
        return Err(RemoteError::Remote { code, message });
    }

    envelope
        .get("result")
        .cloned()
        .ok_or_else(|| RemoteError::Decode("response has neither result nor error".to_string()))
}

/// `create` returns the new id, or a one-element list on newer servers.
fn created_id(model: &str, result: &Value) -> RemoteResult<RemoteId> {
    result
        .as_i64()
        .or_else(|| result.get(0).and_then(Value::as_i64))
        .ok_or_else(|| RemoteError::Decode(format!("{model}.create returned {result}")))
}

fn field_id(row: &Value, field: &str) -> RemoteResult<RemoteId> {
    row.get(field)
        .and_then(many2one_id)
        .ok_or_else(|| RemoteError::Decode(format!("missing or invalid '{field}' in {row}")))
}

fn field_str(row: &Value, field: &str) -> RemoteResult<String> {
    row.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::Decode(format!("missing or invalid '{field}' in {row}")))
}

/// Plain ids and many2one pairs (`[id, "display name"]`).
fn many2one_id(value: &Value) -> Option<RemoteId> {
    value
        .as_i64()
        .or_else(|| value.get(0).and_then(Value::as_i64))
}

fn template_values(template: &NewTemplate) -> Value {
    let lines: Vec<Value> = template
        .attribute_lines
        .iter()
        .map(|line| {
            json!([0, 0, {
                "attribute_id": line.attribute_id,
                "value_ids": [[6, 0, line.value_ids]],
            }])
        })
        .collect();

    json!({
        "name": template.name,
        "uom_id": template.uom_id,
        "uom_po_id": template.uom_id,
        "list_price": template.list_price,
        "standard_price": template.standard_price,
        "detailed_type": template.detailed_type.as_str(),
        "tracking": template.tracking.as_str(),
        "sale_ok": template.sale_ok,
        "purchase_ok": template.purchase_ok,
        "categ_id": template.category_id,
        "taxes_id": [[6, 0, template.tax_ids]],
        "attribute_line_ids": lines,
    })
}

#[async_trait::async_trait]
impl CatalogClient for OdooCatalogClient {
    async fn fetch_attributes(&self) -> RemoteResult<Vec<RemoteAttribute>> {
        self.search_read(ATTRIBUTE_MODEL, json!([]), &["id", "name"])
            .await?
            .iter()
            .map(|row| {
                Ok(RemoteAttribute {
                    id: field_id(row, "id")?,
                    name: field_str(row, "name")?,
                })
            })
            .collect()
    }

    async fn fetch_attribute_values(&self) -> RemoteResult<Vec<RemoteAttributeValue>> {
        self.search_read(VALUE_MODEL, json!([]), &["id", "name", "attribute_id"])
            .await?
            .iter()
            .map(|row| {
                Ok(RemoteAttributeValue {
                    id: field_id(row, "id")?,
                    name: field_str(row, "name")?,
                    attribute_id: field_id(row, "attribute_id")?,
                })
            })
            .collect()
    }

    async fn fetch_units(&self) -> RemoteResult<Vec<RemoteUnit>> {
        self.search_read(UNIT_MODEL, json!([]), &["id", "name"])
            .await?
            .iter()
            .map(|row| {
                Ok(RemoteUnit {
                    id: field_id(row, "id")?,
                    name: field_str(row, "name")?,
                })
            })
            .collect()
    }

    async fn fetch_template_names(&self) -> RemoteResult<Vec<String>> {
        self.search_read(TEMPLATE_MODEL, json!([]), &["name"])
            .await?
            .iter()
            .map(|row| field_str(row, "name"))
            .collect()
    }

    async fn create_attribute(&self, name: &str) -> RemoteResult<RemoteId> {
        self.create(
            ATTRIBUTE_MODEL,
            json!({ "name": name, "create_variant": "always" }),
        )
        .await
    }

    async fn create_attribute_value(
        &self,
        attribute_id: RemoteId,
        name: &str,
    ) -> RemoteResult<RemoteId> {
        self.create(VALUE_MODEL, json!({ "name": name, "attribute_id": attribute_id }))
            .await
    }

    async fn create_unit(&self, name: &str) -> RemoteResult<RemoteId> {
        self.create(
            UNIT_MODEL,
            json!({
                "name": name,
                "category_id": self.config.unit_category_id,
                "uom_type": "bigger",
                "factor_inv": 1.0,
            }),
        )
        .await
    }

    async fn create_template(&self, template: &NewTemplate) -> RemoteResult<RemoteId> {
        self.create(TEMPLATE_MODEL, template_values(template)).await
    }

    async fn fetch_variants(&self, template_id: RemoteId) -> RemoteResult<Vec<RemoteVariant>> {
        self.search_read(
            VARIANT_MODEL,
            json!([["product_tmpl_id", "=", template_id]]),
            &["id", "display_name", "product_tmpl_id"],
        )
        .await?
        .iter()
        .map(|row| {
            Ok(RemoteVariant {
                id: field_id(row, "id")?,
                template_id: field_id(row, "product_tmpl_id")?,
                display_name: field_str(row, "display_name")?,
            })
        })
        .collect()
    }

    async fn update_variant(&self, variant_id: RemoteId, update: &VariantUpdate) -> RemoteResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        let values = serde_json::to_value(update).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.execute_kw(VARIANT_MODEL, "write", json!([[variant_id], values]), json!({}))
            .await?;
        Ok(())
    }

    async fn refresh_catalog(&self) -> RemoteResult<()> {
        let count = self
            .execute_kw(TEMPLATE_MODEL, "search_count", json!([[]]), json!({}))
            .await?;
        tracing::info!(templates = %count, "remote catalog refreshed");
        Ok(())
    }
}
