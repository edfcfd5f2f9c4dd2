//! Static catalog of well-known properties per storage family and REST kind.
//!
//! Built once by [`build_catalog`] and never mutated afterwards.

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::ast::ValueType;
use super::ast::ValueType::{Double, Int, String as Str};
use crate::models::{RestEntityType, SchemaFamily};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyLocation {
    /// Physical column on the entity table.
    EntityColumn,
    /// Declared (non-custom) row in the family's property table.
    PropertyTable,
    /// User-defined row in the property table.
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub location: PropertyLocation,
    pub value_type: ValueType,
    pub column: Cow<'static, str>,
}

impl PropertyDefinition {
    const fn entity_column(value_type: ValueType, column: &'static str) -> Self {
        Self {
            location: PropertyLocation::EntityColumn,
            value_type,
            column: Cow::Borrowed(column),
        }
    }

    const fn property(value_type: ValueType, name: &'static str) -> Self {
        Self {
            location: PropertyLocation::PropertyTable,
            value_type,
            column: Cow::Borrowed(name),
        }
    }

    /// Default for names absent from the catalog.
    pub fn custom(name: &str) -> Self {
        Self {
            location: PropertyLocation::Custom,
            value_type: ValueType::String,
            column: Cow::Owned(name.to_string()),
        }
    }
}

/// Entity columns shared by every family, under their REST and column spellings.
const COMMON_COLUMNS: &[(&str, ValueType, &str)] = &[
    ("id", Int, "id"),
    ("name", Str, "name"),
    ("externalId", Str, "external_id"),
    ("external_id", Str, "external_id"),
    ("createTimeSinceEpoch", Int, "create_time_since_epoch"),
    ("create_time_since_epoch", Int, "create_time_since_epoch"),
    ("lastUpdateTimeSinceEpoch", Int, "last_update_time_since_epoch"),
    ("last_update_time_since_epoch", Int, "last_update_time_since_epoch"),
];

const ARTIFACT_COLUMNS: &[(&str, ValueType, &str)] =
    &[("uri", Str, "uri"), ("state", Int, "state")];

const EXECUTION_COLUMNS: &[(&str, ValueType, &str)] = &[
    ("lastKnownState", Int, "last_known_state"),
    ("last_known_state", Int, "last_known_state"),
];

/// Declared properties valid for a family when no REST kind narrows the lookup.
const FAMILY_PROPERTIES: &[(&str, ValueType)] = &[("description", Str)];

fn rest_properties(rest_type: RestEntityType) -> &'static [(&'static str, ValueType)] {
    match rest_type {
        RestEntityType::RegisteredModel => &[
            ("description", Str),
            ("owner", Str),
            ("state", Str),
            ("language", Str),
            ("library_name", Str),
            ("license", Str),
            ("license_link", Str),
            ("logo", Str),
            ("maturity", Str),
            ("provider", Str),
            ("readme", Str),
        ],
        RestEntityType::ModelVersion => &[("description", Str), ("author", Str), ("state", Str)],
        RestEntityType::Experiment => &[("description", Str), ("owner", Str), ("state", Str)],
        RestEntityType::ExperimentRun => &[
            ("description", Str),
            ("owner", Str),
            ("state", Str),
            ("status", Str),
            ("start_time_since_epoch", Int),
            ("end_time_since_epoch", Int),
            ("experiment_id", Int),
        ],
        RestEntityType::ServingEnvironment => &[("description", Str)],
        RestEntityType::InferenceService => &[
            ("description", Str),
            ("desired_state", Str),
            ("runtime", Str),
            ("model_version_id", Int),
            ("registered_model_id", Int),
            ("serving_environment_id", Int),
        ],
        RestEntityType::ModelArtifact => &[
            ("description", Str),
            ("model_format_name", Str),
            ("model_format_version", Str),
            ("storage_key", Str),
            ("storage_path", Str),
            ("service_account_name", Str),
            ("model_source_kind", Str),
            ("model_source_class", Str),
            ("model_source_group", Str),
            ("model_source_id", Str),
            ("model_source_name", Str),
            ("experiment_id", Int),
            ("experiment_run_id", Int),
        ],
        RestEntityType::DocArtifact => &[("description", Str)],
        RestEntityType::DataSet => &[
            ("description", Str),
            ("digest", Str),
            ("source_type", Str),
            ("source", Str),
            ("schema", Str),
            ("profile", Str),
            ("experiment_id", Int),
            ("experiment_run_id", Int),
        ],
        RestEntityType::Metric | RestEntityType::MetricHistory => &[
            ("description", Str),
            ("value", Double),
            ("timestamp", Int),
            ("step", Int),
            ("experiment_id", Int),
            ("experiment_run_id", Int),
        ],
        RestEntityType::Parameter => &[
            ("description", Str),
            ("value", Str),
            ("parameter_type", Str),
            ("experiment_id", Int),
            ("experiment_run_id", Int),
        ],
        RestEntityType::ServeModel => &[("description", Str), ("model_version_id", Int)],
    }
}

type DefinitionMap = HashMap<&'static str, PropertyDefinition>;

#[derive(Debug)]
pub struct PropertyCatalog {
    families: HashMap<SchemaFamily, DefinitionMap>,
    rest_types: HashMap<RestEntityType, DefinitionMap>,
}

static CATALOG: Lazy<PropertyCatalog> = Lazy::new(build_catalog);

/// Assemble the catalog. Called once at first use through [`PropertyCatalog::global`].
pub fn build_catalog() -> PropertyCatalog {
    let mut families = HashMap::new();
    for family in SchemaFamily::ALL {
        let extra_columns = match family {
            SchemaFamily::Context => &[][..],
            SchemaFamily::Artifact => ARTIFACT_COLUMNS,
            SchemaFamily::Execution => EXECUTION_COLUMNS,
        };
        let mut map: DefinitionMap = COMMON_COLUMNS
            .iter()
            .chain(extra_columns)
            .map(|&(name, value_type, column)| {
                (name, PropertyDefinition::entity_column(value_type, column))
            })
            .collect();
        for &(name, value_type) in FAMILY_PROPERTIES {
            map.insert(name, PropertyDefinition::property(value_type, name));
        }
        families.insert(family, map);
    }

    let rest_types = RestEntityType::ALL
        .into_iter()
        .map(|rest_type| {
            let map = rest_properties(rest_type)
                .iter()
                .map(|&(name, value_type)| (name, PropertyDefinition::property(value_type, name)))
                .collect();
            (rest_type, map)
        })
        .collect();

    PropertyCatalog {
        families,
        rest_types,
    }
}

impl PropertyCatalog {
    pub fn global() -> &'static PropertyCatalog {
        &CATALOG
    }

    /// Resolve a bare property name.
    ///
    /// With a REST kind, only that kind's declared properties and the family's
    /// entity columns are well-known; a property declared for a sibling kind
    /// resolves as `None` (custom) rather than failing.
    pub fn lookup(
        &self,
        family: SchemaFamily,
        rest_type: Option<RestEntityType>,
        name: &str,
    ) -> Option<&PropertyDefinition> {
        let family_map = self.families.get(&family)?;
        match rest_type {
            Some(rest_type) => self
                .rest_types
                .get(&rest_type)
                .and_then(|map| map.get(name))
                .or_else(|| {
                    family_map
                        .get(name)
                        .filter(|def| def.location == PropertyLocation::EntityColumn)
                }),
            None => family_map.get(name),
        }
    }

    /// Like [`lookup`](Self::lookup) but falling back to a custom string definition.
    pub fn definition(
        &self,
        family: SchemaFamily,
        rest_type: Option<RestEntityType>,
        name: &str,
    ) -> PropertyDefinition {
        self.lookup(family, rest_type, name)
            .cloned()
            .unwrap_or_else(|| PropertyDefinition::custom(name))
    }
}
