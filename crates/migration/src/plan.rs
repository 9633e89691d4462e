//! Dependency-ordered plan building.

use serde::{Deserialize, Serialize};

use catbridge_catalog::{
    LocalProduct, RemoteAttribute, RemoteAttributeValue, collect_attribute_usage,
    group_by_template, names_match,
};

use crate::task::MigrationTask;

/// Whether template tasks are existence-checked against the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplatePolicy {
    /// One template task per local template, always. Re-running a plan after a
    /// completed migration creates duplicate templates remotely.
    #[default]
    AlwaysCreate,
    /// Omit templates whose name already exists remotely (case-insensitive).
    SkipExisting,
}

#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    policy: TemplatePolicy,
    existing_templates: Vec<String>,
}

impl PlanBuilder {
    pub fn new(policy: TemplatePolicy) -> Self {
        Self {
            policy,
            existing_templates: Vec::new(),
        }
    }

    /// Remote template names; only consulted under `SkipExisting`.
    pub fn with_existing_templates(mut self, names: Vec<String>) -> Self {
        self.existing_templates = names;
        self
    }

    /// Build the plan: attributes, then values, then templates, each in
    /// discovery order.
    pub fn build(
        &self,
        products: &[LocalProduct],
        remote_attributes: &[RemoteAttribute],
        remote_values: &[RemoteAttributeValue],
    ) -> Vec<MigrationTask> {
        let mut attribute_tasks = Vec::new();
        let mut value_tasks = Vec::new();

        for usage in collect_attribute_usage(products) {
            let remote = remote_attributes
                .iter()
                .find(|a| names_match(&a.name, &usage.name));

            match remote {
                None => {
                    attribute_tasks.push(MigrationTask::attribute(&usage.name));
                    value_tasks.extend(
                        usage
                            .values
                            .iter()
                            .map(|v| MigrationTask::value(&usage.name, v)),
                    );
                }
                Some(attr) => {
                    for value in &usage.values {
                        let exists = remote_values
                            .iter()
                            .any(|rv| rv.attribute_id == attr.id && names_match(&rv.name, value));
                        if !exists {
                            value_tasks.push(MigrationTask::value(&usage.name, value));
                        }
                    }
                }
            }
        }

        let template_tasks = group_by_template(products)
            .into_iter()
            .filter(|group| self.should_create(&group.name))
            .map(|group| MigrationTask::template(group.name, group.variants));

        let mut tasks = attribute_tasks;
        tasks.extend(value_tasks);
        tasks.extend(template_tasks);
        tasks
    }

    fn should_create(&self, template: &str) -> bool {
        match self.policy {
            TemplatePolicy::AlwaysCreate => true,
            TemplatePolicy::SkipExisting => !self
                .existing_templates
                .iter()
                .any(|existing| names_match(existing, template)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskKind, TaskPayload};

    fn banner_roll() -> Vec<LocalProduct> {
        vec![
            LocalProduct::new("1", "Banner Roll", "m").with_attribute("Width", "1.10m"),
            LocalProduct::new("2", "Banner Roll", "m").with_attribute("Width", "1.60m"),
        ]
    }

    fn ids(tasks: &[MigrationTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn banner_roll_plan_has_four_tasks_in_order() {
        let tasks = PlanBuilder::default().build(&banner_roll(), &[], &[]);

        assert_eq!(
            ids(&tasks),
            vec![
                "attribute:Width",
                "value:Width:1.10m",
                "value:Width:1.60m",
                "template:Banner Roll",
            ]
        );
        match &tasks[3].data {
            TaskPayload::Template { variants, .. } => assert_eq!(variants.len(), 2),
            other => panic!("Expected template payload, got {other:?}"),
        }
    }

    #[test]
    fn existing_remote_metadata_is_skipped() {
        let attrs = vec![RemoteAttribute {
            id: 7,
            name: "width".to_string(),
        }];
        let values = vec![
            RemoteAttributeValue {
                id: 70,
                name: "1.10M".to_string(),
                attribute_id: 7,
            },
            // Same name on another attribute does not count.
            RemoteAttributeValue {
                id: 80,
                name: "1.60m".to_string(),
                attribute_id: 8,
            },
        ];

        let tasks = PlanBuilder::default().build(&banner_roll(), &attrs, &values);
        assert_eq!(ids(&tasks), vec!["value:Width:1.60m", "template:Banner Roll"]);
    }

    #[test]
    fn replanning_against_completed_metadata_only_repeats_templates() {
        let attrs = vec![RemoteAttribute {
            id: 7,
            name: "Width".to_string(),
        }];
        let values = vec![
            RemoteAttributeValue {
                id: 70,
                name: "1.10m".to_string(),
                attribute_id: 7,
            },
            RemoteAttributeValue {
                id: 71,
                name: "1.60m".to_string(),
                attribute_id: 7,
            },
        ];

        let builder = PlanBuilder::default();
        let first = builder.build(&banner_roll(), &attrs, &values);
        let second = builder.build(&banner_roll(), &attrs, &values);

        assert_eq!(first, second);
        assert!(first.iter().all(|t| t.kind() == TaskKind::Template));
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn skip_existing_omits_known_templates() {
        let builder = PlanBuilder::new(TemplatePolicy::SkipExisting)
            .with_existing_templates(vec!["BANNER ROLL".to_string()]);

        let tasks = builder.build(&banner_roll(), &[], &[]);
        assert!(tasks.iter().all(|t| t.kind() != TaskKind::Template));
        assert_eq!(tasks.len(), 3);
    }

    #[test]
    fn always_create_ignores_existing_templates() {
        let builder = PlanBuilder::new(TemplatePolicy::AlwaysCreate)
            .with_existing_templates(vec!["Banner Roll".to_string()]);

        let tasks = builder.build(&banner_roll(), &[], &[]);
        assert_eq!(tasks.len(), 4);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn catalog() -> impl Strategy<Value = Vec<LocalProduct>> {
            proptest::collection::vec(
                ("[A-D]", proptest::collection::vec(("[wxyz]", "[1-3]"), 0..3)),
                1..15,
            )
            .prop_map(|rows| {
                rows.into_iter()
                    .enumerate()
                    .map(|(i, (template, attrs))| {
                        let mut product = LocalProduct::new(i.to_string(), template, "m");
                        let mut seen: Vec<String> = Vec::new();
                        for (name, value) in attrs {
                            if !seen.contains(&name) {
                                seen.push(name.clone());
                                product = product.with_attribute(name, value);
                            }
                        }
                        product
                    })
                    .collect()
            })
        }

        fn position(tasks: &[MigrationTask], id: &str) -> Option<usize> {
            tasks.iter().position(|t| t.id.as_str() == id)
        }

        proptest! {
            /// Property: attribute(A) < value(A:*) < every template using A.
            #[test]
            fn tasks_respect_dependency_order(products in catalog()) {
                let tasks = PlanBuilder::default().build(&products, &[], &[]);

                for product in &products {
                    let template_pos = position(&tasks, &format!("template:{}", product.template_name))
                        .expect("template task");
                    for attr in &product.attributes {
                        let attr_pos = position(&tasks, &format!("attribute:{}", attr.name))
                            .expect("attribute task");
                        let value_pos = position(&tasks, &format!("value:{}:{}", attr.name, attr.value))
                            .expect("value task");
                        prop_assert!(attr_pos < value_pos);
                        prop_assert!(value_pos < template_pos);
                    }
                }
            }

            /// Property: task ids are unique and kinds come in three contiguous runs.
            #[test]
            fn task_kinds_are_grouped(products in catalog()) {
                let tasks = PlanBuilder::default().build(&products, &[], &[]);

                let unique: std::collections::HashSet<&str> =
                    tasks.iter().map(|t| t.id.as_str()).collect();
                prop_assert_eq!(unique.len(), tasks.len());

                let rank = |k: TaskKind| match k {
                    TaskKind::Attribute => 0,
                    TaskKind::Value => 1,
                    TaskKind::Template => 2,
                };
                let ranks: Vec<u8> = tasks.iter().map(|t| rank(t.kind())).collect();
                prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }
}
