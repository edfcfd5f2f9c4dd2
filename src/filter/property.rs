//! Resolve a leaf comparison's property name against the catalog.

use super::ast::{ComparisonExpr, ValueType};
use super::catalog::{PropertyCatalog, PropertyLocation};
use crate::models::{RestEntityType, SchemaFamily};

/// Resolved view of a comparison's property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyReference {
    /// Property name with any type suffix removed.
    pub name: String,
    pub is_custom: bool,
    pub value_type: ValueType,
    pub is_escaped: bool,
    pub location: PropertyLocation,
    /// Entity column, or the property-table row name.
    pub column: String,
}

/// Split a trailing `.<value_column>` override off an unescaped name.
pub fn split_type_suffix(property: &str, escaped: bool) -> (&str, Option<ValueType>) {
    if escaped {
        return (property, None);
    }
    match property.rsplit_once('.') {
        Some((name, suffix)) if !name.is_empty() => match ValueType::from_suffix(suffix) {
            Some(value_type) => (name, Some(value_type)),
            None => (property, None),
        },
        _ => (property, None),
    }
}

/// Resolution order: explicit suffix, then the REST-scoped catalog (falling
/// back to family entity columns), then custom with a type inferred from the
/// literal.
pub fn resolve_property(
    catalog: &PropertyCatalog,
    family: SchemaFamily,
    rest_type: Option<RestEntityType>,
    leaf: &ComparisonExpr,
) -> PropertyReference {
    let (name, explicit) = split_type_suffix(&leaf.property, leaf.escaped);

    match catalog.lookup(family, rest_type, name) {
        Some(def) => PropertyReference {
            name: name.to_string(),
            is_custom: def.location == PropertyLocation::Custom,
            value_type: explicit.unwrap_or(def.value_type),
            is_escaped: leaf.escaped,
            location: def.location,
            column: def.column.to_string(),
        },
        None => PropertyReference {
            name: name.to_string(),
            is_custom: true,
            value_type: explicit.unwrap_or_else(|| ValueType::infer(&leaf.value)),
            is_escaped: leaf.escaped,
            location: PropertyLocation::Custom,
            column: name.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse;

    fn resolve(input: &str, rest_type: RestEntityType) -> PropertyReference {
        let expr = parse(input).unwrap().unwrap();
        let leaf = expr.comparisons()[0].clone();
        resolve_property(PropertyCatalog::global(), rest_type.family(), Some(rest_type), &leaf)
    }

    #[test]
    fn suffix_overrides_inference_for_unknown_names() {
        let prop = resolve("budget.double_value > 12000", RestEntityType::ExperimentRun);
        assert_eq!(prop.name, "budget");
        assert_eq!(prop.value_type, ValueType::Double);
        assert!(prop.is_custom);
    }

    #[test]
    fn suffix_overrides_catalog_type() {
        let prop = resolve("experiment_id.string_value = \"7\"", RestEntityType::ExperimentRun);
        assert_eq!(prop.location, PropertyLocation::PropertyTable);
        assert_eq!(prop.value_type, ValueType::String);

        let prop = resolve(r#"author.string_value = "alice""#, RestEntityType::ModelVersion);
        assert_eq!(prop.value_type, ValueType::String);
        assert!(!prop.is_custom);
    }

    #[test]
    fn escaped_names_never_split() {
        let prop = resolve(r#"`mlflow.source.type` = "notebook""#, RestEntityType::ExperimentRun);
        assert_eq!(prop.name, "mlflow.source.type");
        assert!(prop.is_escaped);
        assert!(prop.is_custom);

        let prop = resolve("`weird.int_value` = 3", RestEntityType::ExperimentRun);
        assert_eq!(prop.name, "weird.int_value");
        assert_eq!(prop.value_type, ValueType::Int);
    }

    #[test]
    fn custom_types_follow_literals() {
        let inferred = |input| resolve(input, RestEntityType::ExperimentRun).value_type;
        assert_eq!(inferred("epochs = 100"), ValueType::Int);
        assert_eq!(inferred("lr < 0.1"), ValueType::Double);
        assert_eq!(inferred("ok = false"), ValueType::Bool);
        assert_eq!(
            resolve(r#"framework = "pytorch""#, RestEntityType::ExperimentRun).value_type,
            ValueType::String
        );
    }

    #[test]
    fn catalog_type_wins_without_suffix() {
        let prop = resolve("step = 3.0", RestEntityType::Metric);
        assert_eq!(prop.value_type, ValueType::Int);
        assert_eq!(prop.location, PropertyLocation::PropertyTable);
    }
}
