use serde::{Deserialize, Serialize};

use catbridge_core::DomainError;

use crate::grouping::normalize_name;

/// Product type as understood by the ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailedType {
    /// Storable product (stock is tracked).
    #[default]
    Product,
    Service,
    /// Consumable.
    Consu,
}

impl DetailedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailedType::Product => "product",
            DetailedType::Service => "service",
            DetailedType::Consu => "consu",
        }
    }
}

/// Inventory tracking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tracking {
    #[default]
    None,
    Lot,
    Serial,
}

impl Tracking {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tracking::None => "none",
            Tracking::Lot => "lot",
            Tracking::Serial => "serial",
        }
    }
}

/// One `{name, value}` pair on a variant (e.g. `Width: 1.10m`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub name: String,
    pub value: String,
}

impl ProductAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A locally held variant.
///
/// Variants sharing a `template_name` belong to the same template. The migration
/// engine only reads these; the surrounding catalog owns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalProduct {
    pub id: String,
    pub template_name: String,
    /// SKU.
    #[serde(default)]
    pub default_code: Option<String>,
    /// Unit of measure name (free text).
    #[serde(default)]
    pub uom: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub standard_price: f64,
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
    #[serde(default)]
    pub detailed_type: DetailedType,
    #[serde(default)]
    pub tracking: Tracking,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl LocalProduct {
    /// Minimal variant with defaults for everything but identity and grouping.
    pub fn new(id: impl Into<String>, template_name: impl Into<String>, uom: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template_name: template_name.into(),
            default_code: None,
            uom: uom.into(),
            price: 0.0,
            standard_price: 0.0,
            attributes: Vec::new(),
            detailed_type: DetailedType::default(),
            tracking: Tracking::default(),
            barcode: None,
            weight: None,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(ProductAttribute::new(name, value));
        self
    }

    pub fn with_default_code(mut self, code: impl Into<String>) -> Self {
        self.default_code = Some(code.into());
        self
    }

    pub fn with_prices(mut self, price: f64, standard_price: f64) -> Self {
        self.price = price;
        self.standard_price = standard_price;
        self
    }

    /// Look up an attribute value by (case-insensitive) attribute name.
    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        let key = normalize_name(name);
        self.attributes
            .iter()
            .find(|a| normalize_name(&a.name) == key)
            .map(|a| a.value.as_str())
    }

    /// Check the invariants the engine relies on.
    ///
    /// - template name is non-blank (it is the grouping key)
    /// - attribute names and values are non-blank
    /// - an attribute name appears at most once per variant
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.template_name.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "product {}: template name cannot be empty",
                self.id
            )));
        }

        let mut seen: Vec<String> = Vec::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            if attr.name.trim().is_empty() || attr.value.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "product {}: attribute name and value cannot be empty",
                    self.id
                )));
            }
            let key = normalize_name(&attr.name);
            if seen.contains(&key) {
                return Err(DomainError::invariant(format!(
                    "product {}: attribute '{}' appears more than once",
                    self.id, attr.name
                )));
            }
            seen.push(key);
        }

        Ok(())
    }
}
