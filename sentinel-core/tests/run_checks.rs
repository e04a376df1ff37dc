// sentinel-core/tests/run_checks.rs
//
// End-to-end runs against a real in-memory DuckDB: configuration ->
// resolution -> bulk load -> evaluation.

#![allow(clippy::unwrap_used)]

use chrono::NaiveDate;
use sentinel_core::application::{CheckExecutor, CheckStatus, RunReport};
use sentinel_core::domain::config::resolve::resolve_run;
use sentinel_core::domain::config::Config;
use sentinel_core::infrastructure::adapters::duckdb::DuckDbEngine;
use sentinel_core::ports::engine::QueryEngine;

async fn run_suite(engine: &DuckDbEngine, yaml: &str, as_of: &str) -> RunReport {
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let resolved = resolve_run(
        &config,
        NaiveDate::parse_from_str(as_of, "%Y-%m-%d").unwrap(),
    )
    .unwrap();
    let mut executor = CheckExecutor::new(engine, config.database_accessor.clone());
    executor.run_setup(&config.database_setup).await.unwrap();
    executor.run(&resolved).await
}

#[tokio::test]
async fn test_count_checks_all_success() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE dummy_table (shop_code VARCHAR, DATE DATE, value FLOAT);
             INSERT INTO dummy_table SELECT 'SHOP001', DATE '2023-01-01', random() FROM range(100);
             INSERT INTO dummy_table SELECT 'SHOP002', DATE '2023-01-01', random() FROM range(100);",
        )
        .await
        .unwrap();

    let yaml = r#"
name: all-success
check_bundles:
  - name: bundle-1
    defaults:
      check_type: CountCheck
      table: dummy_table
      check_column: "*"
      lower_threshold: 0
      upper_threshold: 1000
    checks:
      - filters:
          shop_id: {column: shop_code, value: SHOP001, type: identifier}
      - filters:
          shop_id: {column: shop_code, value: SHOP002, type: identifier}
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    assert!(!report.run_failed);
    assert_eq!(report.outcomes.len(), 2);
    for outcome in &report.outcomes {
        assert_eq!(outcome.row.metric_name, "row_count");
        assert_eq!(outcome.row.result, CheckStatus::Success);
        assert_eq!(outcome.row.value, Some(100.0));
    }
}

#[tokio::test]
async fn test_threshold_failure_produces_message() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE dummy_table (shop_code VARCHAR, DATE DATE);
             INSERT INTO dummy_table SELECT 'SHOP001', DATE '2023-01-01' FROM range(99);",
        )
        .await
        .unwrap();

    let yaml = r#"
name: failing
check_bundles:
  - name: b
    checks:
      - check_type: CountCheck
        table: dummy_table
        check_column: "*"
        lower_threshold: 1000
        upper_threshold: 9999
        filters:
          shop_id: {column: shop_code, value: SHOP001, type: identifier}
          date: {column: DATE, value: "2023-01-01", type: date}
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    assert!(report.run_failed);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.row.result, CheckStatus::Fail);
    assert_eq!(
        outcome.message.as_deref().unwrap(),
        "shop_code=SHOP001: Metric row_count failed on 2023-01-01 for dummy_table. \
         Value 99.0000 is not between 1000 and 9999."
    );
}

#[tokio::test]
async fn test_monitor_only_same_value_without_failure() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE t (v INTEGER);
             INSERT INTO t VALUES (1), (NULL), (3), (4), (5), (6), (7), (8), (9), (NULL);",
        )
        .await
        .unwrap();

    let yaml = r#"
name: monitored
defaults:
  monitor_only: true
check_bundles:
  - name: b
    checks:
      - check_type: NullRatioCheck
        table: t
        check_column: v
        lower_threshold: 0.0
        upper_threshold: 0.05
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    let row = &report.outcomes[0].row;
    assert_eq!(row.result, CheckStatus::MonitorOnly);
    // ratio still computed: 2 NULLs out of 10
    assert_eq!(row.value, Some(0.2));
    assert!(!report.run_failed);
}

#[tokio::test]
async fn test_bulk_fetch_respects_rolling_window() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE dummy_table (DATE DATE, shop_id VARCHAR, product_number VARCHAR);
             INSERT INTO dummy_table VALUES
             ('2023-01-01', 'SHOP001', 'P1'),
             ('2023-01-02', 'SHOP001', 'P2'),
             ('2023-01-03', 'SHOP001', 'P3'),
             ('2023-01-01', 'SHOP002', 'P4'),
             ('2023-01-04', 'SHOP001', 'P5');",
        )
        .await
        .unwrap();

    let yaml = r#"
name: rolling
check_bundles:
  - name: b
    checks:
      - check_type: RelCountChangeCheck
        table: dummy_table
        check_column: product_number
        rolling_days: 2
        filters:
          date: {column: DATE, value: "2023-01-03", type: date}
          shop_id: {column: shop_id, value: SHOP001, type: identifier}
"#;
    let _ = run_suite(&engine, yaml, "2023-01-05").await;

    // The working copy only holds the rolling window for SHOP001.
    let data = engine
        .fetch("SELECT DATE, shop_id, product_number FROM \"dummy_table\" ORDER BY DATE, product_number")
        .await
        .unwrap();
    let rows: Vec<String> = data
        .rows
        .iter()
        .map(|r| {
            r.iter()
                .map(|c| match c {
                    sentinel_core::ports::engine::CellValue::Text(s) => s.clone(),
                    other => format!("{:?}", other),
                })
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect();

    assert_eq!(
        rows,
        vec![
            "2023-01-01|SHOP001|P1",
            "2023-01-02|SHOP001|P2",
            "2023-01-03|SHOP001|P3",
        ]
    );
}

#[tokio::test]
async fn test_rel_count_change_values() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE dummy_table (DATE DATE, shop_id VARCHAR, product_number VARCHAR);
             INSERT INTO dummy_table
             SELECT DATE '2022-12-31', 'SHOP001', 'SHOP001-' || i FROM range(4) t(i);
             INSERT INTO dummy_table
             SELECT DATE '2023-01-01', 'SHOP001', 'SHOP001-' || i FROM range(4) t(i);
             INSERT INTO dummy_table
             SELECT DATE '2023-01-02', 'SHOP001', 'SHOP001-' || i FROM range(8) t(i);",
        )
        .await
        .unwrap();

    let yaml = r#"
name: rel-count
check_bundles:
  - name: b
    checks:
      - check_type: RelCountChangeCheck
        table: dummy_table
        check_column: product_number
        rolling_days: 2
        lower_threshold: -0.5
        upper_threshold: 0.5
        filters:
          date: {column: DATE, value: "2023-01-02", type: date}
          shop_id: {column: shop_id, value: SHOP001, type: identifier}
"#;
    let report = run_suite(&engine, yaml, "2023-01-03").await;

    let row = &report.outcomes[0].row;
    assert_eq!(row.metric_name, "product_number_count_change");
    // (8 - 4) / 4
    assert_eq!(row.value, Some(1.0));
    assert_eq!(row.result, CheckStatus::Fail);
}

#[tokio::test]
async fn test_underscore_aliasing_with_struct_columns() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE source_data (
                 BQ_PARTITIONTIME DATE,
                 value STRUCT(shopId VARCHAR, productId VARCHAR, price DOUBLE)
             );
             INSERT INTO source_data VALUES
             ('2023-01-01', {'shopId': 'EC1705', 'productId': 'PROD-001', 'price': 19.99}),
             ('2023-01-01', {'shopId': 'EC1705', 'productId': 'PROD-002', 'price': 29.99}),
             ('2023-01-01', {'shopId': 'EC1705', 'productId': NULL, 'price': 39.99}),
             ('2023-01-01', {'shopId': 'EC1706', 'productId': 'PROD-004', 'price': 49.99});",
        )
        .await
        .unwrap();

    let yaml = r#"
name: nested
check_bundles:
  - name: b
    checks:
      - check_type: NullRatioCheck
        table: source_data
        check_column: value.productId
        lower_threshold: 0.0
        upper_threshold: 0.5
        filters:
          partition_date: {column: BQ_PARTITIONTIME, value: "2023-01-01", type: date}
          shop_id: {column: value.shopId, value: EC1705, type: identifier}
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    let row = &report.outcomes[0].row;
    // 1 NULL out of 3 rows for EC1705
    assert!((row.value.unwrap() - 1.0 / 3.0).abs() < 0.01);
    assert_eq!(row.result, CheckStatus::Success);
    // the reported COLUMN keeps the dotted form
    assert_eq!(row.column.as_deref(), Some("value.productId"));
    // the reported identifier keeps the dotted column too
    assert_eq!(row.identifier, "value.shopId=EC1705");
}

#[tokio::test]
async fn test_match_rate_end_to_end() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE purchase_order (DATE DATE, shop_code VARCHAR, product_number VARCHAR);
             INSERT INTO purchase_order VALUES
             ('2023-01-01', 'SHOP006', 'SHOP006-0001'),
             ('2023-01-01', 'SHOP001', 'SHOP001-0001'),
             ('2023-01-01', 'SHOP001', 'SHOP001-0002'),
             ('2023-01-01', 'SHOP001', 'SHOP001-0003'),
             ('2023-01-01', 'SHOP001', 'SHOP001-0001'),
             ('2023-01-01', 'SHOP001', 'SHOP001-9999');
             CREATE TABLE skufeed (DATE DATE, shop_code VARCHAR, product_number VARCHAR);
             INSERT INTO skufeed VALUES
             ('2023-01-01', 'SHOP001', 'SHOP001-0001'),
             ('2023-01-01', 'SHOP001', 'SHOP001-0001'),
             ('2023-01-01', 'SHOP001', 'SHOP001-0002'),
             ('2023-01-01', 'SHOP001', 'SHOP001-0003'),
             ('2023-01-01', 'SHOP001', 'SHOP001-0040');",
        )
        .await
        .unwrap();

    let yaml = r#"
name: match-rate
check_bundles:
  - name: b
    checks:
      - check_type: MatchRateCheck
        left_table: purchase_order
        right_table: skufeed
        check_column: product_number
        join_columns: [DATE, shop_code, product_number]
        lower_threshold: 0.9
        upper_threshold: 1.0
        filters:
          date: {column: DATE, value: "2023-01-01", type: date}
          shop_id: {column: shop_code, value: SHOP001, type: identifier}
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    let row = &report.outcomes[0].row;
    assert_eq!(row.metric_name, "product_number_matchrate");
    // SHOP001 has 5 purchase rows, 4 match the skufeed (9999 missing)
    assert_eq!(row.value, Some(0.8));
    assert_eq!(row.result, CheckStatus::Fail);
    assert_eq!(row.table, "purchase_order_JOIN_skufeed");
}

#[tokio::test]
async fn test_values_in_set_and_duplicates() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE feed (category VARCHAR, sku_id VARCHAR);
             INSERT INTO feed VALUES
             ('toys', 'A'), ('toys', 'B'), ('shoes', 'C'), ('food', 'A');",
        )
        .await
        .unwrap();

    let yaml = r#"
name: sets
check_bundles:
  - name: b
    defaults:
      table: feed
    checks:
      - check_type: ValuesInSetCheck
        check_column: category
        value_set: [toys, shoes]
        lower_threshold: 0.9
        upper_threshold: 1.0
      - check_type: DuplicateCheck
        check_column: sku_id
        lower_threshold: 0.0
        upper_threshold: 0.0
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    let in_set = &report.outcomes[0].row;
    // 3 of 4 rows in {toys, shoes}
    assert_eq!(in_set.value, Some(0.75));
    assert_eq!(in_set.result, CheckStatus::Fail);

    let duplicates = &report.outcomes[1].row;
    // sku A appears twice
    assert_eq!(duplicates.value, Some(1.0));
    assert_eq!(duplicates.result, CheckStatus::Fail);
}

#[tokio::test]
async fn test_occurrence_and_min_max_average() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE orders (sku_id VARCHAR, amount DOUBLE);
             INSERT INTO orders VALUES
             ('A', 10.0), ('A', 20.0), ('A', 30.0), ('B', 40.0);",
        )
        .await
        .unwrap();

    let yaml = r#"
name: aggregates
check_bundles:
  - name: b
    defaults:
      table: orders
    checks:
      - check_type: OccurrenceCheck
        check_column: sku_id
        max_or_min: max
        lower_threshold: 0
        upper_threshold: 2
      - check_type: AverageCheck
        check_column: amount
        lower_threshold: 20
        upper_threshold: 30
      - check_type: MaxCheck
        check_column: amount
        lower_threshold: 0
        upper_threshold: 100
      - check_type: MinCheck
        check_column: amount
        lower_threshold: 0
        upper_threshold: 100
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    let occurrence = &report.outcomes[0].row;
    // sku A occurs 3 times, above the allowed 2
    assert_eq!(occurrence.value, Some(3.0));
    assert_eq!(occurrence.result, CheckStatus::Fail);

    assert_eq!(report.outcomes[1].row.value, Some(25.0));
    assert_eq!(report.outcomes[1].row.result, CheckStatus::Success);
    assert_eq!(report.outcomes[2].row.value, Some(40.0));
    assert_eq!(report.outcomes[3].row.value, Some(10.0));
}

#[tokio::test]
async fn test_iqr_outlier_flags_spike() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE daily (DATE DATE, num_orders INTEGER);
             INSERT INTO daily
             SELECT DATE '2023-01-01' + INTERVAL (i) DAY, 10 + (i % 3)
             FROM range(14) t(i);
             INSERT INTO daily VALUES (DATE '2023-01-15', 100);",
        )
        .await
        .unwrap();

    let yaml = r#"
name: outliers
check_bundles:
  - name: b
    checks:
      - check_type: IqrOutlierCheck
        table: daily
        check_column: num_orders
        interval_days: 14
        how: both
        iqr_factor: 1.5
        filters:
          date: {column: DATE, value: "2023-01-15", type: date}
"#;
    let report = run_suite(&engine, yaml, "2023-01-16").await;

    let row = &report.outcomes[0].row;
    assert_eq!(row.value, Some(100.0));
    // dynamic bounds derived from the 14-day compare window
    assert!(row.upper_threshold.unwrap() < 100.0);
    assert_eq!(row.result, CheckStatus::Fail);
}

#[tokio::test]
async fn test_shared_dataset_loads_once() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE shared (shop_code VARCHAR, v INTEGER);
             INSERT INTO shared VALUES ('SHOP001', 1), ('SHOP001', NULL);",
        )
        .await
        .unwrap();

    let yaml = r#"
name: shared
check_bundles:
  - name: b
    defaults:
      table: shared
      filters:
        shop_id: {column: shop_code, value: SHOP001, type: identifier}
    checks:
      - check_type: CountCheck
        check_column: "*"
        lower_threshold: 0
        upper_threshold: 10
      - check_type: NullRatioCheck
        check_column: v
        lower_threshold: 0.0
        upper_threshold: 0.6
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let resolved = resolve_run(&config, NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()).unwrap();
    let mut executor = CheckExecutor::new(&engine, "");
    let report = executor.run(&resolved).await;

    // identical fingerprint: one probe, one fetch, both checks evaluated
    assert_eq!(executor.cache_stats(), (1, 1));
    assert!(!report.run_failed);
    assert_eq!(report.outcomes[1].row.value, Some(0.5));
}

#[tokio::test]
async fn test_missing_table_is_isolated_error() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute("CREATE TABLE healthy (v INTEGER); INSERT INTO healthy VALUES (1);")
        .await
        .unwrap();

    let yaml = r#"
name: partial
check_bundles:
  - name: b
    defaults:
      check_type: CountCheck
      check_column: "*"
      lower_threshold: 0
      upper_threshold: 10
    checks:
      - table: vanished
      - table: healthy
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    assert_eq!(report.outcomes[0].row.metric_name, "table_exists");
    assert_eq!(report.outcomes[0].row.result, CheckStatus::Error);
    // the sibling check still ran
    assert_eq!(report.outcomes[1].row.result, CheckStatus::Success);
    assert!(report.run_failed);
}

#[tokio::test]
async fn test_empty_slice_is_data_exists_error() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute("CREATE TABLE empty_table (shop_code VARCHAR, DATE DATE, value FLOAT);")
        .await
        .unwrap();

    let yaml = r#"
name: missing-data
check_bundles:
  - name: b
    checks:
      - check_type: CountCheck
        table: empty_table
        check_column: "*"
        filters:
          shop_id: {column: shop_code, value: SHOP001, type: identifier}
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    let row = &report.outcomes[0].row;
    assert_eq!(row.metric_name, "data_exists");
    assert_eq!(row.result, CheckStatus::Error);
    let msg = report.outcomes[0].message.as_deref().unwrap();
    assert!(msg.starts_with("No data in empty_table"));
    assert!(msg.ends_with("for: shop_code=SHOP001"));
}

#[tokio::test]
async fn test_regex_match_ratio() {
    let engine = DuckDbEngine::new(":memory:").unwrap();
    engine
        .execute(
            "CREATE TABLE products (code VARCHAR);
             INSERT INTO products VALUES ('SHOP01-x'), ('SHOP02-y'), ('oops'), ('SHOP09-z');",
        )
        .await
        .unwrap();

    let yaml = r#"
name: regex
check_bundles:
  - name: b
    checks:
      - check_type: RegexMatchCheck
        table: products
        check_column: code
        regex_to_match: "^SHOP[0-9]{2}-.*"
        lower_threshold: 0.9
        upper_threshold: 1.0
"#;
    let report = run_suite(&engine, yaml, "2023-01-02").await;

    let row = &report.outcomes[0].row;
    assert_eq!(row.metric_name, "code_regex_match_ratio");
    assert_eq!(row.value, Some(0.75));
    assert_eq!(row.result, CheckStatus::Fail);
}
