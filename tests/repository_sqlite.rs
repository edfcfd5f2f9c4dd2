//! Integration tests for the generic repository against a file-backed SQLite database
//!
//! Each test gets its own temporary database with the metadata schema created.

use std::collections::HashSet;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use sqlx::Row;
use tempfile::TempDir;

use registry_core::db::{
    Database, Experiment, ExperimentRun, Metric, ModelArtifact, ModelVersion, PropertyDataType,
    RegisteredModel,
};
use registry_core::models::{
    ArtifactAttributes, ArtifactState, Context, ContextAttributes, Entity, PropertyValue,
};
use registry_core::sql::Dialect;
use registry_core::{ListOptions, OrderBy, RegistryConfig, RegistryError, SortOrder};

async fn setup() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("registry.db");
    let config = RegistryConfig {
        database_url: format!("sqlite://{}?mode=rwc", path.display()),
        max_connections: 1,
        ..RegistryConfig::default()
    };
    let db = Database::connect(&config).await.expect("connect");
    db.ensure_schema().await.expect("schema");
    (dir, db)
}

fn context(name: &str) -> Context {
    Entity::new(ContextAttributes::named(name))
}

async fn count(db: &Database, sql: &str, id: i32) -> i64 {
    let row = sqlx::query(sql)
        .bind(i64::from(id))
        .fetch_one(db.pool())
        .await
        .expect("count");
    row.try_get::<i64, _>(0).expect("count column")
}

// ============================================================================
// Lookups
// ============================================================================

#[tokio::test]
async fn test_connect_resolves_dialect() {
    let (_dir, db) = setup().await;
    assert_eq!(db.dialect(), Dialect::Sqlite);
}

#[tokio::test]
async fn test_get_by_id_and_name() {
    let (_dir, db) = setup().await;
    let models = db.repository::<RegisteredModel>().await.unwrap();

    let saved = models
        .save(context("bert").with_property("owner", "alice"), None)
        .await
        .unwrap();
    let id = saved.id.expect("assigned id");
    assert!(saved.attributes.create_time_since_epoch.is_some());
    assert_eq!(saved.type_id, models.type_id());

    let by_id = models.get_by_id(id).await.unwrap();
    assert_eq!(by_id.attributes.name, "bert");
    assert_eq!(by_id.property("owner"), Some(&PropertyValue::String("alice".into())));

    let by_name = models.get_by_name("bert").await.unwrap();
    assert_eq!(by_name.id, Some(id));

    assert_matches!(
        models.get_by_name("gpt").await,
        Err(RegistryError::NotFound { entity: "RegisteredModel", .. })
    );
    let err = models.get_by_id(id + 1000).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_kinds_sharing_a_family_are_isolated_by_type() {
    let (_dir, db) = setup().await;
    let models = db.repository::<RegisteredModel>().await.unwrap();
    let experiments = db.repository::<Experiment>().await.unwrap();
    assert_ne!(models.type_id(), experiments.type_id());

    let model = models.save(context("shared"), None).await.unwrap();
    experiments.save(context("shared"), None).await.unwrap();

    assert!(experiments.get_by_id(model.id.unwrap()).await.unwrap_err().is_not_found());
    let page = models.list(&ListOptions::default()).await.unwrap();
    assert_eq!(page.size, 1);
}

#[tokio::test]
async fn test_save_validation() {
    let (_dir, db) = setup().await;
    let models = db.repository::<RegisteredModel>().await.unwrap();

    let err = models.save(context(""), None).await.unwrap_err();
    assert!(err.is_bad_request());

    let mut missing = context("ghost");
    missing.id = Some(4242);
    assert!(models.save(missing, None).await.unwrap_err().is_not_found());
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_pagination_covers_every_row_once() {
    let (_dir, db) = setup().await;
    let models = db.repository::<RegisteredModel>().await.unwrap();
    for i in 0..7 {
        models.save(context(&format!("model-{i}")), None).await.unwrap();
    }

    for (order_by, sort_order) in [
        (OrderBy::Id, SortOrder::Asc),
        (OrderBy::Id, SortOrder::Desc),
        (OrderBy::CreateTime, SortOrder::Desc),
        (OrderBy::LastUpdateTime, SortOrder::Asc),
    ] {
        let mut options = ListOptions::default()
            .with_page_size(3)
            .with_order(order_by, sort_order);
        let mut seen = Vec::new();
        let mut pages = 0;
        loop {
            let page = models.list(&options).await.unwrap();
            pages += 1;
            assert!(page.size <= 3);
            assert_eq!(page.page_size, 3);
            seen.extend(page.items.iter().map(|m| m.id.unwrap()));
            if !page.has_more() {
                break;
            }
            options = options.with_page_token(page.next_page_token);
            assert!(pages < 10, "pagination did not terminate");
        }

        assert_eq!(pages, 3, "{order_by} {sort_order}");
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 7, "{order_by} {sort_order}: {seen:?}");

        if order_by == OrderBy::Id {
            let mut sorted = seen.clone();
            sorted.sort_unstable();
            if sort_order == SortOrder::Desc {
                sorted.reverse();
            }
            assert_eq!(seen, sorted);
        }
    }
}

#[tokio::test]
async fn test_malformed_page_token_starts_from_the_beginning() {
    let (_dir, db) = setup().await;
    let models = db.repository::<RegisteredModel>().await.unwrap();
    for i in 0..3 {
        models.save(context(&format!("m{i}")), None).await.unwrap();
    }

    let first = models.list(&ListOptions::default().with_page_size(2)).await.unwrap();
    let garbage = models
        .list(&ListOptions::default().with_page_size(2).with_page_token("%%%"))
        .await
        .unwrap();
    assert_eq!(first.items, garbage.items);
}

// ============================================================================
// Property reconciliation
// ============================================================================

#[tokio::test]
async fn test_custom_property_reconciliation_is_idempotent() {
    let (_dir, db) = setup().await;
    let models = db.repository::<RegisteredModel>().await.unwrap();
    const CUSTOM_ROWS: &str =
        "SELECT COUNT(*) FROM ContextProperty WHERE context_id = ? AND is_custom_property = 1";

    let saved = models
        .save(
            context("llama")
                .with_custom_property("a", 1i64)
                .with_custom_property("b", "x"),
            None,
        )
        .await
        .unwrap();
    let id = saved.id.unwrap();
    assert_eq!(count(&db, CUSTOM_ROWS, id).await, 2);

    let mut update = saved.clone();
    update.custom_properties = None;
    let update = update
        .with_custom_property("b", "y")
        .with_custom_property("c", true);

    let first = models.save(update.clone(), None).await.unwrap();
    let second = models.save(update, None).await.unwrap();

    assert_eq!(first.custom_properties, second.custom_properties);
    assert_eq!(second.custom_property("a"), None);
    assert_eq!(second.custom_property("b"), Some(&PropertyValue::String("y".into())));
    assert_eq!(second.custom_property("c"), Some(&PropertyValue::Bool(true)));
    assert_eq!(count(&db, CUSTOM_ROWS, id).await, 2);
}

#[tokio::test]
async fn test_omitted_custom_properties_are_left_alone() {
    let (_dir, db) = setup().await;
    let models = db.repository::<RegisteredModel>().await.unwrap();

    let saved = models
        .save(context("kept").with_custom_property("team", "nlp"), None)
        .await
        .unwrap();

    let mut update = saved.clone();
    update.custom_properties = None;
    update.attributes.external_id = Some("ext-kept".into());
    let updated = models.save(update, None).await.unwrap();

    assert_eq!(updated.attributes.external_id.as_deref(), Some("ext-kept"));
    assert_eq!(updated.custom_property("team"), Some(&PropertyValue::String("nlp".into())));
    assert_eq!(
        updated.attributes.create_time_since_epoch,
        saved.attributes.create_time_since_epoch
    );
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_experiment_run_filters() {
    let (_dir, db) = setup().await;
    let experiments = db.repository::<Experiment>().await.unwrap();
    let runs = db.repository::<ExperimentRun>().await.unwrap();

    let experiment = experiments.save(context("exp"), None).await.unwrap();
    let parent = experiment.id.unwrap();

    for (framework, epochs) in [("pytorch", 100i64), ("tensorflow", 50), ("sklearn", 10)] {
        runs.save(
            context(&format!("{parent}:run-{framework}"))
                .with_custom_property("framework", framework)
                .with_custom_property("epochs", epochs),
            Some(parent),
        )
        .await
        .unwrap();
    }

    let names = |filter: &str| {
        let runs = runs.clone();
        let options = ListOptions::default().with_filter(filter);
        async move {
            let mut names: Vec<_> = runs
                .list(&options)
                .await
                .unwrap()
                .items
                .into_iter()
                .map(|r| r.attributes.name)
                .collect();
            names.sort();
            names
        }
    };

    assert_eq!(
        names(r#"framework = "pytorch" AND epochs = 100"#).await,
        vec![format!("{parent}:run-pytorch")]
    );
    assert_eq!(
        names(r#"framework = "pytorch" OR framework = "sklearn""#).await,
        vec![format!("{parent}:run-pytorch"), format!("{parent}:run-sklearn")]
    );
    assert_eq!(
        names(r#"(framework = "pytorch" OR framework = "tensorflow") AND epochs > 25"#).await,
        vec![format!("{parent}:run-pytorch"), format!("{parent}:run-tensorflow")]
    );
    assert_eq!(
        names(r#"framework IN ("sklearn", "tensorflow")"#).await,
        vec![format!("{parent}:run-sklearn"), format!("{parent}:run-tensorflow")]
    );
    assert_eq!(
        names(r#"name = "run-sklearn""#).await,
        vec![format!("{parent}:run-sklearn")]
    );
    assert_eq!(names(r#"framework = "jax""#).await, Vec::<String>::new());
}

#[tokio::test]
async fn test_name_stored_as_declared_and_custom_lists_once() {
    let (_dir, db) = setup().await;
    let models = db.repository::<RegisteredModel>().await.unwrap();
    let versions = db.repository::<ModelVersion>().await.unwrap();

    let model = models
        .save(context("bert").with_custom_property("author", "alice"), None)
        .await
        .unwrap();
    let parent = model.id.unwrap();
    let version = versions
        .save(
            context(&format!("{parent}:v1"))
                .with_property("author", "alice")
                .with_custom_property("author", "alice"),
            Some(parent),
        )
        .await
        .unwrap();

    let filtered = |filter: &'static str| ListOptions::default().with_filter(filter);

    // `author` is declared on model versions, so only the declared row is joined.
    let page = versions.list(&filtered(r#"author = "alice""#)).await.unwrap();
    assert_eq!(page.size, 1);
    let ids: Vec<_> = page.items.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![version.id]);

    let page = versions
        .list(&filtered(r#"author = "alice" OR author = "bob""#))
        .await
        .unwrap();
    assert_eq!(page.size, 1);

    // On registered models the name is unknown to the catalog and matches the custom row.
    let page = models.list(&filtered(r#"author = "alice""#)).await.unwrap();
    assert_eq!(page.size, 1);
    assert_eq!(page.items[0].id, Some(parent));
}

#[tokio::test]
async fn test_invalid_filter_is_a_bad_request() {
    let (_dir, db) = setup().await;
    let runs = db.repository::<ExperimentRun>().await.unwrap();

    let err = runs
        .list(&ListOptions::default().with_filter("framework = pytorch"))
        .await
        .unwrap_err();
    assert_matches!(err, RegistryError::InvalidFilter(_));
    assert!(err.is_bad_request());
}

#[tokio::test]
async fn test_unknown_state_label_matches_nothing() {
    let (_dir, db) = setup().await;
    let artifacts = db.repository::<ModelArtifact>().await.unwrap();

    artifacts
        .save(
            Entity::new(ArtifactAttributes {
                uri: Some("s3://models/bert".into()),
                state: Some(ArtifactState::Live),
                ..ArtifactAttributes::named("bert-weights")
            }),
            None,
        )
        .await
        .unwrap();

    let live = artifacts
        .list(&ListOptions::default().with_filter(r#"state = "LIVE""#))
        .await
        .unwrap();
    assert_eq!(live.size, 1);
    assert_eq!(live.items[0].attributes.state, Some(ArtifactState::Live));

    let none = artifacts
        .list(&ListOptions::default().with_filter(r#"state = "NOT_A_STATE""#))
        .await
        .unwrap();
    assert_eq!(none.size, 0);
    assert!(!none.has_more());
}

// ============================================================================
// Parents
// ============================================================================

#[tokio::test]
async fn test_parent_links_scope_listings() {
    let (_dir, db) = setup().await;
    let experiments = db.repository::<Experiment>().await.unwrap();
    let runs = db.repository::<ExperimentRun>().await.unwrap();
    let metrics = db.repository::<Metric>().await.unwrap();

    let first = experiments.save(context("first"), None).await.unwrap().id.unwrap();
    let second = experiments.save(context("second"), None).await.unwrap().id.unwrap();

    let run_a = runs
        .save(context(&format!("{first}:run-a")), Some(first))
        .await
        .unwrap();
    runs.save(context(&format!("{second}:run-a")), Some(second))
        .await
        .unwrap();

    // Saving again under the same parent must not duplicate the link.
    runs.save(run_a.clone(), Some(first)).await.unwrap();
    let run_id = run_a.id.unwrap();
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM ParentContext WHERE context_id = ?", run_id).await,
        1
    );

    let scoped = runs
        .list(&ListOptions::default().with_parent(first))
        .await
        .unwrap();
    assert_eq!(scoped.size, 1);
    assert_eq!(scoped.items[0].id, Some(run_id));

    let by_name = runs
        .list(&ListOptions {
            name: Some("run-a".into()),
            ..ListOptions::default().with_parent(second)
        })
        .await
        .unwrap();
    assert_eq!(by_name.size, 1);
    assert_eq!(by_name.items[0].attributes.name, format!("{second}:run-a"));

    let metric = metrics
        .save(
            Entity::new(ArtifactAttributes::named(format!("{run_id}:loss")))
                .with_property("value", 0.25f64),
            Some(run_id),
        )
        .await
        .unwrap();
    let attributed = metrics
        .list(&ListOptions::default().with_parent(run_id))
        .await
        .unwrap();
    assert_eq!(attributed.items.len(), 1);
    assert_eq!(attributed.items[0].id, metric.id);
    assert_eq!(attributed.items[0].property("value"), Some(&PropertyValue::Double(0.25)));
}

// ============================================================================
// Type registry
// ============================================================================

#[tokio::test]
async fn test_type_property_data_type_is_immutable() {
    let (_dir, db) = setup().await;
    let types = db.types();
    let runs = db.repository::<ExperimentRun>().await.unwrap();
    let type_id = runs.type_id();

    assert_eq!(types.find_by_name("kf.ExperimentRun").await.unwrap(), Some(type_id));

    types
        .save_property(type_id, "framework", PropertyDataType::String)
        .await
        .unwrap();
    types
        .save_property(type_id, "framework", PropertyDataType::String)
        .await
        .unwrap();

    let err = types
        .save_property(type_id, "framework", PropertyDataType::Int)
        .await
        .unwrap_err();
    assert_matches!(err, RegistryError::TypeConflict { ref name, .. } if name == "framework");
    assert!(err.is_bad_request());

    assert_eq!(
        types.properties(type_id).await.unwrap(),
        vec![("framework".to_string(), PropertyDataType::String)]
    );
}
