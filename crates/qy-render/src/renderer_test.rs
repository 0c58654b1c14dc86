use super::*;

fn ctx<'a>(name: &'a str, relation: &'a str) -> RenderContext<'a> {
    RenderContext {
        model_name: name,
        target_relation: relation,
    }
}

#[test]
fn test_render_plain_sql_passthrough() {
    let renderer = JinjaRenderer::new();
    let out = renderer
        .render("SELECT * FROM users", &ctx("m", "m"))
        .unwrap();
    assert_eq!(out.sql, "SELECT * FROM users");
    assert!(out.incremental_sql.is_none());
    assert!(out.config.is_empty());
}

#[test]
fn test_render_captures_config() {
    let renderer = JinjaRenderer::new();
    let out = renderer
        .render(
            "{{ config(materialized='table', schema='staging') }}SELECT 1",
            &ctx("m", "m"),
        )
        .unwrap();
    assert_eq!(out.sql, "SELECT 1");
    assert_eq!(out.config["materialized"], "table");
    assert_eq!(out.config["schema"], "staging");
}

#[test]
fn test_render_with_var_and_default() {
    let mut vars = HashMap::new();
    vars.insert(
        "start_date".to_string(),
        serde_yaml::Value::String("2024-01-01".to_string()),
    );
    let renderer = JinjaRenderer::with_vars(&vars);

    let out = renderer
        .render(
            "SELECT * FROM orders WHERE d >= '{{ var(\"start_date\") }}'",
            &ctx("m", "m"),
        )
        .unwrap();
    assert_eq!(out.sql, "SELECT * FROM orders WHERE d >= '2024-01-01'");

    let out = renderer
        .render("{{ var(\"missing\", \"fallback\") }}", &ctx("m", "m"))
        .unwrap();
    assert_eq!(out.sql, "fallback");
}

#[test]
fn test_render_undefined_var_fails() {
    let renderer = JinjaRenderer::new();
    assert!(renderer.render("{{ var(\"nope\") }}", &ctx("m", "m")).is_err());
}

#[test]
fn test_this_resolves_to_target_relation() {
    let renderer = JinjaRenderer::new();
    let out = renderer
        .render(
            "SELECT max(id) FROM {{ this }}",
            &ctx("orders", "analytics.orders"),
        )
        .unwrap();
    assert_eq!(out.sql, "SELECT max(id) FROM analytics.orders");
}

#[test]
fn test_incremental_model_renders_both_variants() {
    let renderer = JinjaRenderer::new();
    let template = r#"{{ config(materialized='incremental', unique_key='id') }}
SELECT * FROM events
{% if is_incremental() %}WHERE ts > (SELECT max(ts) FROM {{ this }}){% endif %}"#;

    let out = renderer.render(template, &ctx("events", "events")).unwrap();
    assert!(!out.sql.contains("WHERE ts >"));
    let inc = out.incremental_sql.expect("incremental variant expected");
    assert!(inc.contains("WHERE ts > (SELECT max(ts) FROM events)"));
}

#[test]
fn test_incremental_without_branch_has_no_variant() {
    let renderer = JinjaRenderer::new();
    let out = renderer
        .render(
            "{{ config(materialized='incremental', unique_key='id') }}SELECT * FROM events",
            &ctx("events", "events"),
        )
        .unwrap();
    assert!(out.incremental_sql.is_none());
}

#[test]
fn test_non_incremental_model_skips_second_pass() {
    let renderer = JinjaRenderer::new();
    let out = renderer
        .render(
            "{{ config(materialized='table') }}SELECT * FROM events {% if is_incremental() %}WHERE 1=1{% endif %}",
            &ctx("m", "m"),
        )
        .unwrap();
    assert!(out.incremental_sql.is_none());
    assert!(!out.sql.contains("WHERE 1=1"));
}

#[test]
fn test_registered_macro_is_callable() {
    let mut renderer = JinjaRenderer::new();
    renderer.register_macro(
        "cents_to_dollars",
        "{% macro cents_to_dollars(col) %}{{ col }} / 100.0{% endmacro %}",
    );

    let out = renderer
        .render(
            "SELECT {{ cents_to_dollars('amount') }} AS amount FROM payments",
            &ctx("m", "m"),
        )
        .unwrap();
    assert_eq!(out.sql, "SELECT amount / 100.0 AS amount FROM payments");
}

#[test]
fn test_macro_replacement_takes_effect() {
    let mut renderer = JinjaRenderer::new();
    renderer.register_macro("f", "{% macro f() %}one{% endmacro %}");
    let out = renderer.render("{{ f() }}", &ctx("m", "m")).unwrap();
    assert_eq!(out.sql, "one");

    renderer.register_macro("f", "{% macro f() %}two{% endmacro %}");
    let out = renderer.render("{{ f() }}", &ctx("m", "m")).unwrap();
    assert_eq!(out.sql, "two");

    assert_eq!(renderer.macro_names(), vec!["f"]);
    renderer.remove_macro("f");
    assert!(renderer.macro_names().is_empty());
}

#[test]
fn test_error_function_aborts_render() {
    let renderer = JinjaRenderer::new();
    let err = renderer
        .render("{{ error(\"boom\") }}", &ctx("m", "m"))
        .unwrap_err();
    assert!(err.to_string().contains("boom"));
}

#[test]
fn test_syntax_error_reports_render_error() {
    let renderer = JinjaRenderer::new();
    let err = renderer
        .render("SELECT {% if %}", &ctx("m", "m"))
        .unwrap_err();
    assert!(matches!(err, crate::error::RenderError::Render(_)));
}
