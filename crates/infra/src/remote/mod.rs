//! Remote catalog clients.
//!
//! `CatalogClient` is the seam between the engine and the ERP. Two
//! implementations live here:
//! - `odoo`: JSON-RPC over HTTP against an Odoo instance
//! - `in_memory`: a simulated catalog for tests/dev, with failure injection

pub mod in_memory;
pub mod odoo;

pub use in_memory::{InMemoryCatalog, RemoteOp};
pub use odoo::{OdooCatalogClient, OdooConfig};

use catbridge_catalog::{
    NewTemplate, RemoteAttribute, RemoteAttributeValue, RemoteUnit, RemoteVariant, VariantUpdate,
};
use catbridge_core::RemoteId;
use catbridge_migration::RetryPolicy;

/// Remote catalog error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("HTTP error ({status}): {body}")]
    Http { status: u16, body: String },
    /// The remote understood the call and refused it.
    #[error("remote error: {message}")]
    Remote { code: Option<i64>, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    /// A prerequisite entity is missing locally (e.g. the attribute of a value).
    #[error("missing dependency: {0}")]
    Dependency(String),
}

impl RemoteError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            code: None,
            message: message.into(),
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::Dependency(message.into())
    }

    /// Errors the transport layer retries on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Http { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Authenticated access to the remote product catalog.
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    async fn fetch_attributes(&self) -> RemoteResult<Vec<RemoteAttribute>>;

    async fn fetch_attribute_values(&self) -> RemoteResult<Vec<RemoteAttributeValue>>;

    async fn fetch_units(&self) -> RemoteResult<Vec<RemoteUnit>>;

    /// Names of every remote template (for existence checks).
    async fn fetch_template_names(&self) -> RemoteResult<Vec<String>>;

    async fn create_attribute(&self, name: &str) -> RemoteResult<RemoteId>;

    async fn create_attribute_value(
        &self,
        attribute_id: RemoteId,
        name: &str,
    ) -> RemoteResult<RemoteId>;

    async fn create_unit(&self, name: &str) -> RemoteResult<RemoteId>;

    /// Create a template; the remote generates its variants asynchronously.
    async fn create_template(&self, template: &NewTemplate) -> RemoteResult<RemoteId>;

    async fn fetch_variants(&self, template_id: RemoteId) -> RemoteResult<Vec<RemoteVariant>>;

    /// Poll `fetch_variants` until at least `expected` variants exist.
    ///
    /// Gives up quietly once `policy` is exhausted and returns whatever is
    /// available; only fetch errors are reported.
    async fn wait_for_variants(
        &self,
        template_id: RemoteId,
        expected: usize,
        policy: &RetryPolicy,
    ) -> RemoteResult<Vec<RemoteVariant>> {
        let mut variants = self.fetch_variants(template_id).await?;
        let mut attempt = 0;

        while variants.len() < expected && policy.should_retry(attempt) {
            attempt += 1;
            let delay = policy.delay_for_attempt(attempt);
            tracing::debug!(
                template_id,
                attempt,
                found = variants.len(),
                expected,
                "variants not generated yet; polling again in {:?}",
                delay
            );
            tokio::time::sleep(delay).await;
            variants = self.fetch_variants(template_id).await?;
        }

        if variants.len() < expected {
            tracing::warn!(
                template_id,
                found = variants.len(),
                expected,
                "variant generation incomplete; continuing with available variants"
            );
        }
        Ok(variants)
    }

    async fn update_variant(&self, variant_id: RemoteId, update: &VariantUpdate) -> RemoteResult<()>;

    /// Let the remote (or anything caching it) know the catalog changed.
    async fn refresh_catalog(&self) -> RemoteResult<()>;
}
