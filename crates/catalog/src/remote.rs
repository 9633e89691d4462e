//! The slice of the remote ERP catalog the migration engine reads and writes.

use serde::{Deserialize, Serialize};

use catbridge_core::RemoteId;

use crate::product::{DetailedType, Tracking};

/// Remote product attribute (unique by case-insensitive name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAttribute {
    pub id: RemoteId,
    pub name: String,
}

/// Remote attribute value (unique by `(attribute_id, case-insensitive name)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAttributeValue {
    pub id: RemoteId,
    pub name: String,
    pub attribute_id: RemoteId,
}

/// Remote unit of measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUnit {
    pub id: RemoteId,
    pub name: String,
}

/// A variant generated remotely after template creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVariant {
    pub id: RemoteId,
    pub template_id: RemoteId,
    /// e.g. `Banner Roll (1.10m)`; the only handle we get on which values it carries.
    pub display_name: String,
}

/// One attribute line on a template: the attribute and the values it offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeLine {
    pub attribute_id: RemoteId,
    pub value_ids: Vec<RemoteId>,
}

/// Payload for creating a remote template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    pub uom_id: RemoteId,
    pub list_price: f64,
    pub standard_price: f64,
    pub attribute_lines: Vec<AttributeLine>,
    pub detailed_type: DetailedType,
    pub tracking: Tracking,
    pub sale_ok: bool,
    pub purchase_ok: bool,
    pub category_id: RemoteId,
    /// Always empty on creation; taxes are configured remotely.
    pub tax_ids: Vec<RemoteId>,
}

/// Fields patched onto a generated variant that cannot be set at template creation.
///
/// `None` fields are left untouched remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_price: Option<f64>,
}

impl VariantUpdate {
    pub fn is_empty(&self) -> bool {
        self.default_code.is_none()
            && self.barcode.is_none()
            && self.weight.is_none()
            && self.standard_price.is_none()
    }
}
