//! Marker types binding each REST entity kind to its storage family.

use super::family::{ArtifactFamily, ContextFamily, ExecutionFamily, FamilyAdapter};
use crate::models::RestEntityType;
use crate::pagination::ListOptions;
use crate::sql::{SelectQuery, SqlValue};

/// One concrete entity kind served by a [`GenericRepository`](super::GenericRepository).
pub trait EntityKind: Send + Sync + 'static {
    type Family: FamilyAdapter;

    const REST_TYPE: RestEntityType;

    /// Apply the structural `name`/`external_id`/`parent_resource_id` filters.
    fn apply_list_filters(query: SelectQuery, options: &ListOptions) -> SelectQuery {
        structural_filters(query, Self::REST_TYPE, options)
    }
}

/// Shared structural filters. Child kinds store `"<parentId>:<name>"`.
pub fn structural_filters(
    mut query: SelectQuery,
    rest_type: RestEntityType,
    options: &ListOptions,
) -> SelectQuery {
    let family = rest_type.family();
    let table = query.table().to_string();
    let dialect = query.dialect();

    if let Some(name) = options.name.as_deref() {
        query = match (rest_type.stores_prefixed_names(), options.parent_resource_id) {
            (true, Some(parent)) => query.where_clause(
                format!("{table}.name = ?"),
                [SqlValue::String(format!("{parent}:{name}"))],
            ),
            (true, None) => query.where_clause(
                format!("{table}.name LIKE ?"),
                [SqlValue::String(format!("%:{name}"))],
            ),
            (false, _) => query.where_clause(
                format!("{table}.name = ?"),
                [SqlValue::String(name.to_string())],
            ),
        };
    }

    if let Some(external_id) = options.external_id.as_deref() {
        query = query.where_clause(
            format!("{table}.external_id = ?"),
            [SqlValue::String(external_id.to_string())],
        );
    }

    if let Some(parent) = options.parent_resource_id {
        query = query
            .join(format!(
                "JOIN {} parent_link ON parent_link.{} = {table}.id",
                dialect.quote(family.link_table()),
                family.link_child_column(),
            ))
            .where_clause(
                format!("parent_link.{} = ?", family.link_parent_column()),
                [SqlValue::Int(i64::from(parent))],
            );
    }

    query
}

macro_rules! entity_kinds {
    ($($(#[$meta:meta])* $kind:ident => $family:ty;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
            pub struct $kind;

            impl EntityKind for $kind {
                type Family = $family;
                const REST_TYPE: RestEntityType = RestEntityType::$kind;
            }
        )+
    };
}

entity_kinds! {
    /// Top-level model entry.
    RegisteredModel => ContextFamily;
    /// Version of a registered model; child of [`RegisteredModel`].
    ModelVersion => ContextFamily;
    Experiment => ContextFamily;
    /// Run within an [`Experiment`].
    ExperimentRun => ContextFamily;
    ServingEnvironment => ContextFamily;
    InferenceService => ContextFamily;
    ModelArtifact => ArtifactFamily;
    DocArtifact => ArtifactFamily;
    DataSet => ArtifactFamily;
    Metric => ArtifactFamily;
    Parameter => ArtifactFamily;
    /// Time series of a metric's values.
    MetricHistory => ArtifactFamily;
    /// Execution of a model version inside an inference service.
    ServeModel => ExecutionFamily;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Dialect;
    use pretty_assertions::assert_eq;

    fn base(rest_type: RestEntityType) -> SelectQuery {
        let family = rest_type.family();
        SelectQuery::new(Dialect::Sqlite, family.table(), &["id"])
    }

    #[test]
    fn child_names_are_matched_through_the_prefix() {
        let options = ListOptions {
            name: Some("v1".into()),
            ..ListOptions::default()
        };
        let query = structural_filters(
            base(RestEntityType::ModelVersion),
            RestEntityType::ModelVersion,
            &options,
        );
        assert_eq!(query.build_sql(), "SELECT Context.id FROM Context WHERE Context.name LIKE ?");
        assert_eq!(query.values(), &[SqlValue::String("%:v1".into())]);

        let options = options.with_parent(3);
        let query = structural_filters(
            base(RestEntityType::ModelVersion),
            RestEntityType::ModelVersion,
            &options,
        );
        assert_eq!(
            query.build_sql(),
            "SELECT Context.id FROM Context \
             JOIN ParentContext parent_link ON parent_link.context_id = Context.id \
             WHERE Context.name = ? AND parent_link.parent_context_id = ?"
        );
        assert_eq!(
            query.values(),
            &[SqlValue::String("3:v1".into()), SqlValue::Int(3)]
        );
    }

    #[test]
    fn top_level_names_are_exact() {
        let options = ListOptions {
            name: Some("bert".into()),
            external_id: Some("ext-1".into()),
            ..ListOptions::default()
        };
        let query = structural_filters(
            base(RestEntityType::RegisteredModel),
            RestEntityType::RegisteredModel,
            &options,
        );
        assert_eq!(
            query.build_sql(),
            "SELECT Context.id FROM Context WHERE Context.name = ? AND Context.external_id = ?"
        );
    }

    #[test]
    fn artifacts_join_through_attribution() {
        let options = ListOptions::default().with_parent(8);
        let query =
            structural_filters(base(RestEntityType::Metric), RestEntityType::Metric, &options);
        assert_eq!(
            query.build_sql(),
            "SELECT Artifact.id FROM Artifact \
             JOIN Attribution parent_link ON parent_link.artifact_id = Artifact.id \
             WHERE parent_link.context_id = ?"
        );
    }

    #[test]
    fn kinds_carry_their_rest_type() {
        assert_eq!(ServeModel::REST_TYPE, RestEntityType::ServeModel);
        assert_eq!(
            <<DataSet as EntityKind>::Family as FamilyAdapter>::SCHEMA,
            crate::models::SchemaFamily::Artifact
        );
    }
}
