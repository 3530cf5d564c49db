//! Full pipeline against an on-disk SQLite database: generate, load,
//! benchmark, compare and report.

use querybench::{
    render, BenchError, Checkout, ColumnDef, ColumnPolicy, ColumnType, DataGenerator,
    DatasetLoader, EngineConnection, Experiment, ExperimentFile, ForeignKey, GenerationPlan,
    HarnessConfig, LoadOptions, OutputFormat, Params, QueryVariant, RetryConfig, RunPhase,
    SchemaSpec, SqlValue, SqliteFactory, TableDef, TablePlan, VariantRegistry, VariantStatus,
};
use std::sync::Arc;
use tempfile::TempDir;

const ORDERS_BY_CUSTOMER: &str = "SELECT COUNT(*) FROM orders WHERE customer_id = ?1";

fn shop_schema() -> SchemaSpec {
    SchemaSpec::new(vec![
        TableDef::new("customers", "id")
            .column(ColumnDef::new("id", ColumnType::Integer))
            .column(ColumnDef::new("name", ColumnType::Text))
            .column(ColumnDef::new("region", ColumnType::Text)),
        TableDef::new("products", "sku")
            .column(ColumnDef::new("sku", ColumnType::Text))
            .column(ColumnDef::new("price", ColumnType::Real)),
        TableDef::new("orders", "id")
            .column(ColumnDef::new("id", ColumnType::Integer))
            .column(ColumnDef::new("customer_id", ColumnType::Integer))
            .column(ColumnDef::new("sku", ColumnType::Text))
            .column(ColumnDef::new("amount", ColumnType::Real))
            .foreign_key(ForeignKey::new("customer_id", "customers"))
            .foreign_key(ForeignKey::new("sku", "products")),
    ])
}

fn shop_plan() -> GenerationPlan {
    GenerationPlan::new()
        .table(TablePlan::new("customers", 1000, 1).column(
            "region",
            ColumnPolicy::OneOf {
                values: vec!["north".into(), "south".into()],
            },
        ))
        .table(TablePlan::new("products", 40, 2).column(
            "sku",
            ColumnPolicy::Prefixed {
                prefix: "SKU-".into(),
                start: 1,
            },
        ))
        .table(
            TablePlan::new("orders", 5000, 3)
                .column("amount", ColumnPolicy::UniformReal { min: 1.0, max: 100.0 }),
        )
}

/// Load the shop dataset into a fresh database file.
fn loaded_shop(parallel: bool) -> (TempDir, SqliteFactory) {
    let dir = TempDir::new().unwrap();
    let factory = SqliteFactory::new(dir.path().join("shop.db"));
    let schema = shop_schema();
    let generator = DataGenerator::new(&schema, &shop_plan()).unwrap();
    let loader = DatasetLoader::new(LoadOptions {
        batch_size: 700,
        retry: RetryConfig::new().with_max_retries(2).with_base_delay_ms(1),
        parallel,
    });

    {
        let mut conn = Checkout::acquire(&factory, "schema").unwrap();
        loader.create_schema(&mut *conn, &schema).unwrap();
    }
    let report = loader.load_all(&factory, &generator).unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.total_rows(), 1000 + 40 + 5000);
    (dir, factory)
}

fn query_rows(conn: &mut dyn EngineConnection, sql: &str) -> u64 {
    conn.execute(sql, &[], None).unwrap().output.row_count()
}

#[test]
fn loaded_orders_reference_existing_customers() {
    let (_dir, factory) = loaded_shop(false);
    let mut conn = Checkout::acquire(&factory, "verify").unwrap();

    assert_eq!(query_rows(&mut *conn, "SELECT id FROM customers"), 1000);
    assert_eq!(query_rows(&mut *conn, "SELECT id FROM orders"), 5000);
    assert_eq!(
        query_rows(
            &mut *conn,
            "SELECT id FROM orders WHERE customer_id < 1 OR customer_id > 1000"
        ),
        0
    );
    assert_eq!(
        query_rows(
            &mut *conn,
            "SELECT o.id FROM orders o LEFT JOIN products p ON p.sku = o.sku WHERE p.sku IS NULL"
        ),
        0
    );
}

#[test]
fn parallel_load_matches_sequential_load() {
    let (_a, sequential) = loaded_shop(false);
    let (_b, parallel) = loaded_shop(true);
    let probes = [
        "SELECT id FROM orders WHERE customer_id = ?1",
        "SELECT id FROM orders WHERE customer_id = ?1 AND amount > 50.0",
        "SELECT id FROM orders WHERE customer_id = ?1 AND sku = 'SKU-7'",
    ];

    let mut left = Checkout::acquire(&sequential, "left").unwrap();
    let mut right = Checkout::acquire(&parallel, "right").unwrap();
    for customer in [1i64, 17, 500, 1000] {
        let params = [SqlValue::Integer(customer)];
        for sql in probes {
            let a = left.execute(sql, &params, None).unwrap().output;
            let b = right.execute(sql, &params, None).unwrap().output;
            assert_eq!(a, b, "{} for customer {}", sql, customer);
        }
    }
}

#[test]
fn index_candidate_reads_less_than_scan_baseline() {
    let (_dir, factory) = loaded_shop(false);

    let mut registry = VariantRegistry::new();
    registry.register(QueryVariant::baseline("scan", ORDERS_BY_CUSTOMER));
    registry.register(
        QueryVariant::candidate("indexed", ORDERS_BY_CUSTOMER)
            .with_setup("CREATE INDEX idx_orders_customer ON orders(customer_id)")
            .with_teardown("DROP INDEX idx_orders_customer"),
    );
    let config = HarnessConfig {
        warmup_iterations: 1,
        measured_iterations: 5,
        per_execution_timeout_ms: 10_000,
        ..Default::default()
    };
    let bound = Params(vec![SqlValue::Integer(42)]);
    let report = Experiment::new(Arc::new(registry), config)
        .with_params("scan", bound.clone())
        .with_params("indexed", bound)
        .run(&factory);

    assert!(report.is_success(), "{:?}", report.variants);
    for outcome in &report.variants {
        assert_eq!(outcome.samples.len(), 5);
        assert_eq!(outcome.summary().unwrap().count, 5);
    }
    let cmp = report.comparison("scan", "indexed").unwrap();
    assert!(cmp.logical_read_improvement.unwrap() > 0.5);

    // Teardown removed the index again
    let mut conn = Checkout::acquire(&factory, "verify").unwrap();
    assert_eq!(
        query_rows(
            &mut *conn,
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'idx_orders_customer'"
        ),
        0
    );

    let csv = render(&report, OutputFormat::Csv).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.lines().nth(1).unwrap().starts_with("scan,indexed,"));
    let json: serde_json::Value =
        serde_json::from_str(&render(&report, OutputFormat::Json).unwrap()).unwrap();
    assert_eq!(json["variants"][1]["status"], "completed");
}

#[test]
fn runaway_variant_times_out_without_stopping_others() {
    let (_dir, factory) = loaded_shop(false);

    let mut registry = VariantRegistry::new();
    registry.register(QueryVariant::baseline("count", "SELECT COUNT(*) FROM orders"));
    registry.register(QueryVariant::candidate(
        "runaway",
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT COUNT(*) FROM c",
    ));
    let config = HarnessConfig {
        warmup_iterations: 1,
        measured_iterations: 3,
        per_execution_timeout_ms: 100,
        ..Default::default()
    };
    let report = Experiment::new(Arc::new(registry), config).run(&factory);

    assert!(!report.is_success());
    assert!(report.outcome("count").unwrap().is_success());
    match &report.outcome("runaway").unwrap().status {
        VariantStatus::Aborted {
            phase,
            iteration,
            error,
        } => {
            assert_eq!(*phase, RunPhase::Warmup);
            assert_eq!(*iteration, 0);
            assert!(error.is_timeout());
        }
        other => panic!("expected abort, got {:?}", other),
    }
    assert!(report.comparisons.is_empty());
    assert!(render(&report, OutputFormat::Table)
        .unwrap()
        .contains("FAILED runaway"));
}

#[test]
fn template_experiment_runs_end_to_end() {
    let file = ExperimentFile::from_toml_str(ExperimentFile::default_toml()).unwrap();
    let dir = TempDir::new().unwrap();
    let factory = SqliteFactory::new(dir.path().join("template.db"));
    let schema = file.schema();
    let generator = DataGenerator::new(&schema, &file.plan()).unwrap();
    let loader = DatasetLoader::from_config(&file.harness);
    {
        let mut conn = Checkout::acquire(&factory, "schema").unwrap();
        loader.create_schema(&mut *conn, &schema).unwrap();
    }
    assert!(loader.load_all(&factory, &generator).unwrap().is_success());

    let mut registry = VariantRegistry::new();
    let mut config = file.harness.clone();
    config.measured_iterations = 3;
    config.warmup_iterations = 0;
    let mut experiment_params = Vec::new();
    for entry in &file.variants {
        registry.register(entry.variant.clone());
        experiment_params.push((entry.variant.name.clone(), entry.params.clone()));
    }
    let experiment = experiment_params.into_iter().fold(
        Experiment::new(Arc::new(registry), config),
        |e, (name, params)| e.with_params(name, params),
    );
    let report = experiment.run(&factory);
    assert!(report.is_success(), "{:?}", report.variants);
    assert_eq!(report.comparisons.len(), 1);
}

#[test]
fn unknown_variant_is_not_found() {
    let registry = VariantRegistry::new();
    assert!(matches!(
        registry.get("missing"),
        Err(BenchError::NotFound { ref name }) if name == "missing"
    ));
}
