use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use catbridge_catalog::{
    NewTemplate, RemoteAttribute, RemoteAttributeValue, RemoteUnit, RemoteVariant, VariantUpdate,
    names_match,
};
use catbridge_core::RemoteId;

use super::{CatalogClient, RemoteError, RemoteResult};

/// Operations of the catalog client, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchAttributes,
    FetchAttributeValues,
    FetchUnits,
    FetchTemplateNames,
    CreateAttribute,
    CreateAttributeValue,
    CreateUnit,
    CreateTemplate,
    FetchVariants,
    UpdateVariant,
    RefreshCatalog,
}

impl RemoteOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOp::FetchAttributes => "fetch_attributes",
            RemoteOp::FetchAttributeValues => "fetch_attribute_values",
            RemoteOp::FetchUnits => "fetch_units",
            RemoteOp::FetchTemplateNames => "fetch_template_names",
            RemoteOp::CreateAttribute => "create_attribute",
            RemoteOp::CreateAttributeValue => "create_attribute_value",
            RemoteOp::CreateUnit => "create_unit",
            RemoteOp::CreateTemplate => "create_template",
            RemoteOp::FetchVariants => "fetch_variants",
            RemoteOp::UpdateVariant => "update_variant",
            RemoteOp::RefreshCatalog => "refresh_catalog",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Times(u32),
    Always,
}

/// A template as the simulated remote stored it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTemplate {
    pub id: RemoteId,
    pub template: NewTemplate,
}

#[derive(Debug, Default)]
struct CatalogData {
    next_id: RemoteId,
    attributes: Vec<RemoteAttribute>,
    values: Vec<RemoteAttributeValue>,
    units: Vec<RemoteUnit>,
    templates: Vec<StoredTemplate>,
    variants: Vec<RemoteVariant>,
    variant_updates: Vec<(RemoteId, VariantUpdate)>,
    variant_lag: u32,
    pending_polls: HashMap<RemoteId, u32>,
    failures: HashMap<RemoteOp, Failure>,
    calls: HashMap<RemoteOp, u32>,
}

impl CatalogData {
    fn allocate_id(&mut self) -> RemoteId {
        self.next_id += 1;
        self.next_id
    }

    fn add_attribute(&mut self, name: &str) -> RemoteResult<RemoteId> {
        if self.attributes.iter().any(|a| names_match(&a.name, name)) {
            return Err(RemoteError::remote(format!("attribute '{name}' already exists")));
        }
        let id = self.allocate_id();
        self.attributes.push(RemoteAttribute {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    fn add_value(&mut self, attribute_id: RemoteId, name: &str) -> RemoteResult<RemoteId> {
        if !self.attributes.iter().any(|a| a.id == attribute_id) {
            return Err(RemoteError::remote(format!("unknown attribute id {attribute_id}")));
        }
        if self
            .values
            .iter()
            .any(|v| v.attribute_id == attribute_id && names_match(&v.name, name))
        {
            return Err(RemoteError::remote(format!(
                "value '{name}' already exists on attribute {attribute_id}"
            )));
        }
        let id = self.allocate_id();
        self.values.push(RemoteAttributeValue {
            id,
            name: name.to_string(),
            attribute_id,
        });
        Ok(id)
    }

    fn add_unit(&mut self, name: &str) -> RemoteId {
        let id = self.allocate_id();
        self.units.push(RemoteUnit {
            id,
            name: name.to_string(),
        });
        id
    }

    fn value_name(&self, id: RemoteId) -> RemoteResult<String> {
        self.values
            .iter()
            .find(|v| v.id == id)
            .map(|v| v.name.clone())
            .ok_or_else(|| RemoteError::remote(format!("unknown attribute value id {id}")))
    }

    /// One variant per combination of the template's attribute values.
    fn generate_variants(&mut self, template_id: RemoteId, template: &NewTemplate) -> RemoteResult<()> {
        let mut combinations: Vec<Vec<String>> = vec![Vec::new()];
        for line in &template.attribute_lines {
            if line.value_ids.is_empty() {
                continue;
            }
            let names = line
                .value_ids
                .iter()
                .map(|id| self.value_name(*id))
                .collect::<RemoteResult<Vec<_>>>()?;

            combinations = combinations
                .into_iter()
                .flat_map(|prefix| {
                    names.iter().map(move |name| {
                        let mut combo = prefix.clone();
                        combo.push(name.clone());
                        combo
                    })
                })
                .collect();
        }

        for combo in combinations {
            let display_name = if combo.is_empty() {
                template.name.clone()
            } else {
                format!("{} ({})", template.name, combo.join(", "))
            };
            let id = self.allocate_id();
            self.variants.push(RemoteVariant {
                id,
                template_id,
                display_name,
            });
        }
        Ok(())
    }
}

/// In-memory remote catalog.
///
/// Intended for tests/dev. Simulates variant generation after template
/// creation (optionally lagging a number of polls) and can be told to fail
/// specific operations with a 503.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    data: Mutex<CatalogData>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, name: &str) -> Self {
        if let Ok(data) = self.data.get_mut() {
            data.add_unit(name);
        }
        self
    }

    pub fn with_attribute(mut self, name: &str, values: &[&str]) -> Self {
        if let Ok(data) = self.data.get_mut() {
            if let Ok(attribute_id) = data.add_attribute(name) {
                for value in values {
                    let _ = data.add_value(attribute_id, value);
                }
            }
        }
        self
    }

    /// Number of `fetch_variants` calls that see nothing after a template is created.
    pub fn with_variant_lag(mut self, polls: u32) -> Self {
        if let Ok(data) = self.data.get_mut() {
            data.variant_lag = polls;
        }
        self
    }

    /// Fail the next `times` calls of `op`.
    pub fn fail_next(&self, op: RemoteOp, times: u32) {
        if let Ok(mut data) = self.data.lock() {
            data.failures.insert(op, Failure::Times(times));
        }
    }

    pub fn fail_always(&self, op: RemoteOp) {
        if let Ok(mut data) = self.data.lock() {
            data.failures.insert(op, Failure::Always);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut data) = self.data.lock() {
            data.failures.clear();
        }
    }

    pub fn calls(&self, op: RemoteOp) -> u32 {
        self.data
            .lock()
            .map(|d| d.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn attributes(&self) -> Vec<RemoteAttribute> {
        self.data.lock().map(|d| d.attributes.clone()).unwrap_or_default()
    }

    pub fn attribute_values(&self) -> Vec<RemoteAttributeValue> {
        self.data.lock().map(|d| d.values.clone()).unwrap_or_default()
    }

    pub fn units(&self) -> Vec<RemoteUnit> {
        self.data.lock().map(|d| d.units.clone()).unwrap_or_default()
    }

    pub fn templates(&self) -> Vec<StoredTemplate> {
        self.data.lock().map(|d| d.templates.clone()).unwrap_or_default()
    }

    pub fn variants(&self) -> Vec<RemoteVariant> {
        self.data.lock().map(|d| d.variants.clone()).unwrap_or_default()
    }

    pub fn variant_updates(&self) -> Vec<(RemoteId, VariantUpdate)> {
        self.data
            .lock()
            .map(|d| d.variant_updates.clone())
            .unwrap_or_default()
    }

    /// Lock the catalog for one call of `op`, applying injected failures.
    fn begin(&self, op: RemoteOp) -> RemoteResult<MutexGuard<'_, CatalogData>> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| RemoteError::Transport("lock poisoned".to_string()))?;

        *data.calls.entry(op).or_insert(0) += 1;

        let fail = match data.failures.get_mut(&op) {
            Some(Failure::Always) => true,
            Some(Failure::Times(0)) | None => false,
            Some(Failure::Times(n)) => {
                *n -= 1;
                true
            }
        };

        if fail {
            tracing::debug!(op = op.as_str(), "injected remote failure");
            return Err(RemoteError::Http {
                status: 503,
                body: format!("injected failure: {}", op.as_str()),
            });
        }
        Ok(data)
    }
}

#[async_trait::async_trait]
impl CatalogClient for InMemoryCatalog {
    async fn fetch_attributes(&self) -> RemoteResult<Vec<RemoteAttribute>> {
        Ok(self.begin(RemoteOp::FetchAttributes)?.attributes.clone())
    }

    async fn fetch_attribute_values(&self) -> RemoteResult<Vec<RemoteAttributeValue>> {
        Ok(self.begin(RemoteOp::FetchAttributeValues)?.values.clone())
    }

    async fn fetch_units(&self) -> RemoteResult<Vec<RemoteUnit>> {
        Ok(self.begin(RemoteOp::FetchUnits)?.units.clone())
    }

    async fn fetch_template_names(&self) -> RemoteResult<Vec<String>> {
        let data = self.begin(RemoteOp::FetchTemplateNames)?;
        Ok(data.templates.iter().map(|t| t.template.name.clone()).collect())
    }

    async fn create_attribute(&self, name: &str) -> RemoteResult<RemoteId> {
        self.begin(RemoteOp::CreateAttribute)?.add_attribute(name)
    }

    async fn create_attribute_value(
        &self,
        attribute_id: RemoteId,
        name: &str,
    ) -> RemoteResult<RemoteId> {
        self.begin(RemoteOp::CreateAttributeValue)?
            .add_value(attribute_id, name)
    }

    async fn create_unit(&self, name: &str) -> RemoteResult<RemoteId> {
        Ok(self.begin(RemoteOp::CreateUnit)?.add_unit(name))
    }

    async fn create_template(&self, template: &NewTemplate) -> RemoteResult<RemoteId> {
        let mut data = self.begin(RemoteOp::CreateTemplate)?;
        let id = data.allocate_id();
        data.generate_variants(id, template)?;
        data.templates.push(StoredTemplate {
            id,
            template: template.clone(),
        });
        let lag = data.variant_lag;
        if lag > 0 {
            data.pending_polls.insert(id, lag);
        }
        Ok(id)
    }

    async fn fetch_variants(&self, template_id: RemoteId) -> RemoteResult<Vec<RemoteVariant>> {
        let mut data = self.begin(RemoteOp::FetchVariants)?;
        if let Some(remaining) = data.pending_polls.get_mut(&template_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Vec::new());
            }
        }
        Ok(data
            .variants
            .iter()
            .filter(|v| v.template_id == template_id)
            .cloned()
            .collect())
    }

    async fn update_variant(&self, variant_id: RemoteId, update: &VariantUpdate) -> RemoteResult<()> {
        let mut data = self.begin(RemoteOp::UpdateVariant)?;
        if !data.variants.iter().any(|v| v.id == variant_id) {
            return Err(RemoteError::remote(format!("unknown variant id {variant_id}")));
        }
        data.variant_updates.push((variant_id, update.clone()));
        Ok(())
    }

    async fn refresh_catalog(&self) -> RemoteResult<()> {
        self.begin(RemoteOp::RefreshCatalog)?;
        Ok(())
    }
}
