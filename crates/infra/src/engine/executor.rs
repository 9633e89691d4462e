//! Side-effecting execution of a single migration task.
//!
//! The executor never retries and never touches migration state; it reports
//! the created remote id or the error, and the state machine decides.

use catbridge_catalog::{
    AttributeLine, LocalProduct, NewTemplate, RemoteAttribute, RemoteAttributeValue, RemoteUnit,
    RemoteVariant, VariantUpdate, collect_attribute_usage, names_match,
};
use catbridge_core::RemoteId;
use catbridge_migration::{
    MigrationTask, RemoteCaches, TaskPayload, UomConflict, exact_unit, heuristic_unit,
};

use crate::engine::config::EngineConfig;
use crate::remote::{CatalogClient, RemoteError, RemoteResult};

pub struct TaskExecutor<'a> {
    client: &'a dyn CatalogClient,
    config: &'a EngineConfig,
}

impl<'a> TaskExecutor<'a> {
    pub fn new(client: &'a dyn CatalogClient, config: &'a EngineConfig) -> Self {
        Self { client, config }
    }

    /// Perform the remote calls for `task`, recording created entities in `caches`.
    pub async fn execute(
        &self,
        task: &MigrationTask,
        caches: &mut RemoteCaches,
        conflicts: &[UomConflict],
    ) -> RemoteResult<Option<RemoteId>> {
        match &task.data {
            TaskPayload::Attribute { name } => {
                let id = self.client.create_attribute(name).await?;
                caches.insert_attribute(RemoteAttribute {
                    id,
                    name: name.clone(),
                });
                Ok(Some(id))
            }
            TaskPayload::Value { attribute, value } => {
                let attribute_id = caches
                    .find_attribute(attribute)
                    .map(|a| a.id)
                    .ok_or_else(|| {
                        RemoteError::dependency(format!("attribute '{attribute}' not found remotely"))
                    })?;

                let id = self.client.create_attribute_value(attribute_id, value).await?;
                caches.insert_value(RemoteAttributeValue {
                    id,
                    name: value.clone(),
                    attribute_id,
                });
                Ok(Some(id))
            }
            TaskPayload::Template { name, variants } => {
                self.create_template(name, variants, caches, conflicts)
                    .await
                    .map(Some)
            }
        }
    }

    async fn create_template(
        &self,
        name: &str,
        variants: &[LocalProduct],
        caches: &RemoteCaches,
        conflicts: &[UomConflict],
    ) -> RemoteResult<RemoteId> {
        let first = variants.first();
        let local_uom = first.map(|v| v.uom.as_str()).unwrap_or_default();
        let uom_id = resolve_unit(local_uom, caches.units(), conflicts, self.config.default_unit_id);

        let template = NewTemplate {
            name: name.to_string(),
            uom_id,
            list_price: first.map(|v| v.price).unwrap_or_default(),
            standard_price: first.map(|v| v.standard_price).unwrap_or_default(),
            attribute_lines: attribute_lines(variants, caches),
            detailed_type: first.map(|v| v.detailed_type).unwrap_or_default(),
            tracking: first.map(|v| v.tracking).unwrap_or_default(),
            sale_ok: true,
            purchase_ok: true,
            category_id: self.config.default_category_id,
            tax_ids: Vec::new(),
        };

        let template_id = self.client.create_template(&template).await?;
        tracing::debug!(template = name, template_id, uom_id, "template created");

        let remote_variants = self
            .client
            .wait_for_variants(template_id, variants.len(), &self.config.variant_polling)
            .await?;

        for local in variants {
            let Some(remote) = match_variant(local, &remote_variants) else {
                tracing::warn!(
                    template = name,
                    variant = %local.id,
                    "no remote variant matches local attribute values; variant left unpatched"
                );
                continue;
            };

            let update = variant_update(local);
            if !update.is_empty() {
                self.client.update_variant(remote.id, &update).await?;
            }
        }

        Ok(template_id)
    }
}

/// Remote unit for a template: conflict resolution, exact match, synonym
/// heuristic, then the configured default.
pub fn resolve_unit(
    local_uom: &str,
    remote_units: &[RemoteUnit],
    conflicts: &[UomConflict],
    default_unit_id: RemoteId,
) -> RemoteId {
    let resolved = conflicts
        .iter()
        .find(|c| names_match(&c.local_uom, local_uom))
        .and_then(|c| c.resolved_remote_id);

    resolved
        .or_else(|| exact_unit(local_uom, remote_units).map(|u| u.id))
        .or_else(|| heuristic_unit(local_uom, remote_units).map(|u| u.id))
        .unwrap_or(default_unit_id)
}

/// Attribute lines from the union of the variants' attribute values.
///
/// Attributes or values missing from the caches are left out.
pub fn attribute_lines(variants: &[LocalProduct], caches: &RemoteCaches) -> Vec<AttributeLine> {
    collect_attribute_usage(variants)
        .into_iter()
        .filter_map(|usage| {
            let Some(attribute) = caches.find_attribute(&usage.name) else {
                tracing::warn!(attribute = %usage.name, "attribute missing from cache; line omitted");
                return None;
            };

            let value_ids: Vec<RemoteId> = usage
                .values
                .iter()
                .filter_map(|value| match caches.find_value(attribute.id, value) {
                    Some(v) => Some(v.id),
                    None => {
                        tracing::warn!(
                            attribute = %usage.name,
                            value = %value,
                            "attribute value missing from cache; omitted"
                        );
                        None
                    }
                })
                .collect();

            if value_ids.is_empty() {
                None
            } else {
                Some(AttributeLine {
                    attribute_id: attribute.id,
                    value_ids,
                })
            }
        })
        .collect()
}

/// First remote variant whose display name contains every local attribute value.
///
/// Substring match on display names: a value that is a substring of another
/// (e.g. `1m` in `1.1m`) can pick the wrong variant, and several local
/// variants may land on the same remote one.
pub fn match_variant<'r>(local: &LocalProduct, remote: &'r [RemoteVariant]) -> Option<&'r RemoteVariant> {
    let wanted: Vec<String> = local
        .attributes
        .iter()
        .map(|a| a.value.trim().to_lowercase())
        .collect();

    remote.iter().find(|variant| {
        let display = variant.display_name.to_lowercase();
        wanted.iter().all(|value| display.contains(value.as_str()))
    })
}

pub fn variant_update(local: &LocalProduct) -> VariantUpdate {
    VariantUpdate {
        default_code: local.default_code.clone().filter(|c| !c.trim().is_empty()),
        barcode: local.barcode.clone().filter(|b| !b.trim().is_empty()),
        weight: local.weight,
        standard_price: Some(local.standard_price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryCatalog, RemoteOp};

    fn unit(id: RemoteId, name: &str) -> RemoteUnit {
        RemoteUnit {
            id,
            name: name.to_string(),
        }
    }

    fn variant(id: RemoteId, display_name: &str) -> RemoteVariant {
        RemoteVariant {
            id,
            template_id: 1,
            display_name: display_name.to_string(),
        }
    }

    #[test]
    fn unit_resolution_order() {
        let units = vec![unit(2, "m"), unit(3, "Units")];
        let conflicts = vec![UomConflict {
            local_uom: "rolls".to_string(),
            resolved_remote_id: Some(9),
        }];

        assert_eq!(resolve_unit("Rolls", &units, &conflicts, 1), 9);
        assert_eq!(resolve_unit("M", &units, &conflicts, 1), 2);
        assert_eq!(resolve_unit("pcs", &units, &conflicts, 1), 3);
        assert_eq!(resolve_unit("furlong", &units, &conflicts, 1), 1);
    }

    #[test]
    fn attribute_lines_skip_unknown_entries() {
        let mut caches = RemoteCaches::new();
        caches.prime(
            vec![RemoteAttribute {
                id: 1,
                name: "Width".to_string(),
            }],
            vec![RemoteAttributeValue {
                id: 10,
                name: "1.10m".to_string(),
                attribute_id: 1,
            }],
            vec![],
        );

        let variants = vec![
            LocalProduct::new("1", "Banner", "m")
                .with_attribute("Width", "1.10m")
                .with_attribute("Color", "Red"),
            LocalProduct::new("2", "Banner", "m").with_attribute("Width", "1.60m"),
        ];

        let lines = attribute_lines(&variants, &caches);
        assert_eq!(
            lines,
            vec![AttributeLine {
                attribute_id: 1,
                value_ids: vec![10],
            }]
        );
    }

    #[test]
    fn variants_match_by_display_name_substring() {
        let remote = vec![
            variant(1, "Banner Roll (1.10m, Matte)"),
            variant(2, "Banner Roll (1.60m, Matte)"),
        ];
        let local = LocalProduct::new("x", "Banner Roll", "m")
            .with_attribute("Width", "1.60M")
            .with_attribute("Finish", "matte");

        assert_eq!(match_variant(&local, &remote).map(|v| v.id), Some(2));

        let unknown = LocalProduct::new("y", "Banner Roll", "m").with_attribute("Width", "2m");
        assert!(match_variant(&unknown, &remote).is_none());
    }

    #[test]
    fn blank_codes_are_not_sent() {
        let mut local = LocalProduct::new("x", "Banner", "m").with_default_code("  ");
        local.standard_price = 3.5;

        let update = variant_update(&local);
        assert_eq!(update.default_code, None);
        assert_eq!(update.barcode, None);
        assert_eq!(update.standard_price, Some(3.5));
    }

    #[tokio::test]
    async fn value_without_cached_attribute_is_a_dependency_error() {
        let catalog = InMemoryCatalog::new();
        let config = EngineConfig::immediate();
        let executor = TaskExecutor::new(&catalog, &config);

        let err = executor
            .execute(&MigrationTask::value("Width", "1.10m"), &mut RemoteCaches::new(), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::Dependency(_)));
        assert_eq!(catalog.calls(RemoteOp::CreateAttributeValue), 0);
    }

    #[tokio::test]
    async fn template_task_creates_and_patches_variants() {
        let catalog = InMemoryCatalog::new()
            .with_unit("Units")
            .with_unit("m")
            .with_attribute("Width", &["1.10m", "1.60m"]);
        let config = EngineConfig::immediate();
        let executor = TaskExecutor::new(&catalog, &config);

        let mut caches = RemoteCaches::new();
        caches.prime(
            catalog.attributes(),
            catalog.attribute_values(),
            catalog.units(),
        );

        let variants = vec![
            LocalProduct::new("1", "Banner Roll", "m")
                .with_attribute("Width", "1.10m")
                .with_default_code("BR-110")
                .with_prices(20.0, 8.0),
            LocalProduct::new("2", "Banner Roll", "m")
                .with_attribute("Width", "1.60m")
                .with_default_code("BR-160"),
        ];
        let task = MigrationTask::template("Banner Roll", variants);

        let template_id = executor.execute(&task, &mut caches, &[]).await.unwrap();
        assert!(template_id.is_some());

        let templates = catalog.templates();
        assert_eq!(templates.len(), 1);
        let created = &templates[0].template;
        assert_eq!(created.uom_id, 2);
        assert_eq!(created.list_price, 20.0);
        assert_eq!(created.attribute_lines[0].value_ids.len(), 2);
        assert!(created.tax_ids.is_empty());

        let codes: Vec<Option<String>> = catalog
            .variant_updates()
            .into_iter()
            .map(|(_, u)| u.default_code)
            .collect();
        assert_eq!(codes, vec![Some("BR-110".to_string()), Some("BR-160".to_string())]);
    }
}
