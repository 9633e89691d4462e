//! Catalog model shared by the migration engine and its adapters.
//!
//! - `product`: the locally held catalog (variants grouped by template name)
//! - `remote`: the slice of the ERP's data model the engine touches
//! - `grouping`: deterministic, order-preserving grouping helpers
//!
//! Everything here is plain data plus pure functions (no IO).

pub mod grouping;
pub mod product;
pub mod remote;

pub use grouping::{
    AttributeUsage, TemplateGroup, collect_attribute_usage, distinct_uoms, group_by_template,
    names_match, normalize_name,
};
pub use product::{DetailedType, LocalProduct, ProductAttribute, Tracking};
pub use remote::{
    AttributeLine, NewTemplate, RemoteAttribute, RemoteAttributeValue, RemoteUnit, RemoteVariant,
    VariantUpdate,
};
