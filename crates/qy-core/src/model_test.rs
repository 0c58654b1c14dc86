use super::*;

#[test]
fn test_logical_path_nested() {
    let root = Path::new("/proj/models");
    let file = Path::new("/proj/models/staging/customers.sql");
    assert_eq!(
        Model::logical_path(root, file).unwrap(),
        "staging.customers"
    );
}

#[test]
fn test_logical_path_top_level() {
    let root = Path::new("/proj/models");
    let file = Path::new("/proj/models/orders.sql");
    assert_eq!(Model::logical_path(root, file).unwrap(), "orders");
}

#[test]
fn test_logical_path_outside_root() {
    let root = Path::new("/proj/models");
    let file = Path::new("/elsewhere/orders.sql");
    assert!(matches!(
        Model::logical_path(root, file).unwrap_err(),
        CoreError::InvalidModelPath { .. }
    ));
}

#[test]
fn test_materialization_parse() {
    assert_eq!(Materialization::parse("table"), Some(Materialization::Table));
    assert_eq!(Materialization::parse("view"), Some(Materialization::View));
    assert_eq!(
        Materialization::parse("incremental"),
        Some(Materialization::Incremental)
    );
    assert_eq!(Materialization::parse("ephemeral"), None);
}

#[test]
fn test_target_relation_with_schema() {
    let model = Model {
        path: "staging.customers".to_string(),
        name: "customers".to_string(),
        file_path: PathBuf::from("/proj/models/staging/customers.sql"),
        raw_sql: "select 1".to_string(),
        config: ModelConfig {
            schema: Some("staging".to_string()),
            ..ModelConfig::default()
        },
        sources: BTreeSet::new(),
        lineage: Vec::new(),
        has_wildcard: false,
    };
    assert_eq!(model.target_relation(), "staging.customers");
}

#[test]
fn test_model_roundtrips_through_json() {
    let model = Model {
        path: "marts.revenue".to_string(),
        name: "revenue".to_string(),
        file_path: PathBuf::from("/proj/models/marts/revenue.sql"),
        raw_sql: "select * from orders".to_string(),
        config: ModelConfig {
            materialized: Materialization::Incremental,
            unique_key: Some("id".to_string()),
            ..ModelConfig::default()
        },
        sources: BTreeSet::from(["orders".to_string()]),
        lineage: vec![ColumnLineage {
            column: "*".to_string(),
            sources: vec!["orders".to_string()],
        }],
        has_wildcard: true,
    };

    let json = serde_json::to_string(&model).unwrap();
    let back: Model = serde_json::from_str(&json).unwrap();
    assert_eq!(back.path, model.path);
    assert_eq!(back.config, model.config);
    assert!(back.has_wildcard);
    assert_eq!(back.sources, model.sources);
}
