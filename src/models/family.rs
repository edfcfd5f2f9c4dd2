//! The three physical storage shapes and the REST-facing kinds layered on them.

use serde::{Deserialize, Serialize};

/// Physical storage family. Every entity kind is stored in exactly one of these
/// tables, distinguished by `type_id`, with its own property and link tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaFamily {
    Context,
    Artifact,
    Execution,
}

impl SchemaFamily {
    pub const ALL: [SchemaFamily; 3] = [Self::Context, Self::Artifact, Self::Execution];

    pub const fn table(self) -> &'static str {
        match self {
            Self::Context => "Context",
            Self::Artifact => "Artifact",
            Self::Execution => "Execution",
        }
    }

    pub const fn property_table(self) -> &'static str {
        match self {
            Self::Context => "ContextProperty",
            Self::Artifact => "ArtifactProperty",
            Self::Execution => "ExecutionProperty",
        }
    }

    /// Column of the property table pointing back at the owning row.
    pub const fn owner_column(self) -> &'static str {
        match self {
            Self::Context => "context_id",
            Self::Artifact => "artifact_id",
            Self::Execution => "execution_id",
        }
    }

    /// Table linking an entity to its parent context.
    pub const fn link_table(self) -> &'static str {
        match self {
            Self::Context => "ParentContext",
            Self::Artifact => "Attribution",
            Self::Execution => "Association",
        }
    }

    pub const fn link_parent_column(self) -> &'static str {
        match self {
            Self::Context => "parent_context_id",
            Self::Artifact | Self::Execution => "context_id",
        }
    }

    pub const fn link_child_column(self) -> &'static str {
        match self {
            Self::Context => "context_id",
            Self::Artifact => "artifact_id",
            Self::Execution => "execution_id",
        }
    }

    /// MLMD `Type.type_kind` value for types of this family.
    pub const fn type_kind(self) -> i32 {
        match self {
            Self::Execution => 0,
            Self::Artifact => 1,
            Self::Context => 2,
        }
    }

    /// Every column of the entity table, in select order.
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Context => &[
                "id",
                "type_id",
                "name",
                "external_id",
                "create_time_since_epoch",
                "last_update_time_since_epoch",
            ],
            Self::Artifact => &[
                "id",
                "type_id",
                "uri",
                "state",
                "name",
                "external_id",
                "create_time_since_epoch",
                "last_update_time_since_epoch",
            ],
            Self::Execution => &[
                "id",
                "type_id",
                "last_known_state",
                "name",
                "external_id",
                "create_time_since_epoch",
                "last_update_time_since_epoch",
            ],
        }
    }

    /// Integer column holding the family's state enum, if any.
    pub const fn state_column(self) -> Option<&'static str> {
        match self {
            Self::Context => None,
            Self::Artifact => Some("state"),
            Self::Execution => Some("last_known_state"),
        }
    }
}

/// REST-facing entity kinds. Several kinds share one [`SchemaFamily`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestEntityType {
    RegisteredModel,
    ModelVersion,
    Experiment,
    ExperimentRun,
    ServingEnvironment,
    InferenceService,
    ModelArtifact,
    DocArtifact,
    DataSet,
    Metric,
    Parameter,
    MetricHistory,
    ServeModel,
}

impl RestEntityType {
    pub const ALL: [RestEntityType; 13] = [
        Self::RegisteredModel,
        Self::ModelVersion,
        Self::Experiment,
        Self::ExperimentRun,
        Self::ServingEnvironment,
        Self::InferenceService,
        Self::ModelArtifact,
        Self::DocArtifact,
        Self::DataSet,
        Self::Metric,
        Self::Parameter,
        Self::MetricHistory,
        Self::ServeModel,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::RegisteredModel => "RegisteredModel",
            Self::ModelVersion => "ModelVersion",
            Self::Experiment => "Experiment",
            Self::ExperimentRun => "ExperimentRun",
            Self::ServingEnvironment => "ServingEnvironment",
            Self::InferenceService => "InferenceService",
            Self::ModelArtifact => "ModelArtifact",
            Self::DocArtifact => "DocArtifact",
            Self::DataSet => "DataSet",
            Self::Metric => "Metric",
            Self::Parameter => "Parameter",
            Self::MetricHistory => "MetricHistory",
            Self::ServeModel => "ServeModel",
        }
    }

    /// Name of the MLMD type row backing this kind.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::RegisteredModel => "kf.RegisteredModel",
            Self::ModelVersion => "kf.ModelVersion",
            Self::Experiment => "kf.Experiment",
            Self::ExperimentRun => "kf.ExperimentRun",
            Self::ServingEnvironment => "kf.ServingEnvironment",
            Self::InferenceService => "kf.InferenceService",
            Self::ModelArtifact => "kf.ModelArtifact",
            Self::DocArtifact => "kf.DocArtifact",
            Self::DataSet => "kf.DataSet",
            Self::Metric => "kf.Metric",
            Self::Parameter => "kf.Parameter",
            Self::MetricHistory => "kf.MetricHistory",
            Self::ServeModel => "kf.ServeModel",
        }
    }

    pub const fn family(self) -> SchemaFamily {
        match self {
            Self::RegisteredModel
            | Self::ModelVersion
            | Self::Experiment
            | Self::ExperimentRun
            | Self::ServingEnvironment
            | Self::InferenceService => SchemaFamily::Context,
            Self::ModelArtifact
            | Self::DocArtifact
            | Self::DataSet
            | Self::Metric
            | Self::Parameter
            | Self::MetricHistory => SchemaFamily::Artifact,
            Self::ServeModel => SchemaFamily::Execution,
        }
    }

    /// Child kinds store their name as `"<parentId>:<name>"`; only the
    /// top-level kinds keep the bare name.
    pub const fn stores_prefixed_names(self) -> bool {
        !matches!(
            self,
            Self::RegisteredModel | Self::Experiment | Self::ServingEnvironment
        )
    }
}

impl std::fmt::Display for RestEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_tables_follow_family() {
        assert_eq!(SchemaFamily::Context.link_table(), "ParentContext");
        assert_eq!(SchemaFamily::Artifact.link_table(), "Attribution");
        assert_eq!(SchemaFamily::Execution.link_table(), "Association");
        assert_eq!(SchemaFamily::Artifact.link_parent_column(), "context_id");
        assert_eq!(SchemaFamily::Context.link_parent_column(), "parent_context_id");
    }

    #[test]
    fn only_top_level_kinds_keep_bare_names() {
        let bare: Vec<_> = RestEntityType::ALL
            .iter()
            .filter(|t| !t.stores_prefixed_names())
            .copied()
            .collect();
        assert_eq!(
            bare,
            vec![
                RestEntityType::RegisteredModel,
                RestEntityType::Experiment,
                RestEntityType::ServingEnvironment
            ]
        );
    }

    #[test]
    fn every_kind_maps_to_its_family_table() {
        for kind in RestEntityType::ALL {
            assert!(kind.type_name().starts_with("kf."));
            assert!(kind.family().columns().contains(&"type_id"));
        }
        assert_eq!(RestEntityType::ServeModel.family(), SchemaFamily::Execution);
    }
}
