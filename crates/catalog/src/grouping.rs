//! Order-preserving grouping over a local catalog.
//!
//! All grouping here is deterministic: groups come out in the order their first
//! member was seen, so plans built from the same catalog are identical.

use crate::product::LocalProduct;

/// Normalized form used for case-insensitive name comparisons.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Case-insensitive (and whitespace-trimmed) name equality.
pub fn names_match(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// Variants of one template, in catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateGroup {
    pub name: String,
    pub variants: Vec<LocalProduct>,
}

/// An attribute and the distinct values the catalog uses for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeUsage {
    /// First spelling seen in the catalog.
    pub name: String,
    /// Distinct (case-insensitive) values, first spelling kept.
    pub values: Vec<String>,
}

/// Group variants by template name, case-insensitively.
///
/// A group is named after the first (trimmed) spelling seen.
pub fn group_by_template(products: &[LocalProduct]) -> Vec<TemplateGroup> {
    let mut groups: Vec<TemplateGroup> = Vec::new();
    for product in products {
        match groups
            .iter_mut()
            .find(|g| names_match(&g.name, &product.template_name))
        {
            Some(group) => group.variants.push(product.clone()),
            None => groups.push(TemplateGroup {
                name: product.template_name.trim().to_string(),
                variants: vec![product.clone()],
            }),
        }
    }
    groups
}

/// Collect attribute name → distinct values, case-insensitively.
pub fn collect_attribute_usage(products: &[LocalProduct]) -> Vec<AttributeUsage> {
    let mut usage: Vec<AttributeUsage> = Vec::new();
    for product in products {
        for attr in &product.attributes {
            let entry = match usage.iter().position(|u| names_match(&u.name, &attr.name)) {
                Some(idx) => &mut usage[idx],
                None => {
                    usage.push(AttributeUsage {
                        name: attr.name.trim().to_string(),
                        values: Vec::new(),
                    });
                    let last = usage.len() - 1;
                    &mut usage[last]
                }
            };
            if !entry.values.iter().any(|v| names_match(v, &attr.value)) {
                entry.values.push(attr.value.trim().to_string());
            }
        }
    }
    usage
}

/// Distinct non-blank units of measure, case-insensitively, in first-seen order.
pub fn distinct_uoms(products: &[LocalProduct]) -> Vec<String> {
    let mut uoms: Vec<String> = Vec::new();
    for product in products {
        let uom = product.uom.trim();
        if uom.is_empty() {
            continue;
        }
        if !uoms.iter().any(|u| names_match(u, uom)) {
            uoms.push(uom.to_string());
        }
    }
    uoms
}
