mod common;

use airphoto_index::output::read_flight_records;
use airphoto_index::{ScrapeError, run_reconcile, run_scrape};
use chrono::NaiveDate;
use common::{FixtureFetcher, INDEX_URL, SharedFetcher, county_url, fixture, fixture_path, test_config};
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

fn scrape_error(err: &anyhow::Error) -> &ScrapeError {
    err.downcast_ref::<ScrapeError>()
        .unwrap_or_else(|| panic!("expected a ScrapeError, got {:#}", err))
}

/// Two counties scrape cleanly; Colusa is missing and Del Norte never renders its table
#[tokio::test]
async fn test_scrape_skips_failing_counties() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FixtureFetcher::library());

    let summary = run_scrape(&config, SharedFetcher(fetcher.clone()))
        .await
        .unwrap();

    assert_eq!(summary.entities_discovered, 4);
    assert_eq!(summary.entities_succeeded, 2);
    assert_eq!(summary.entities_hard_failed, 2);
    assert_eq!(summary.entities_soft_failed, 0);
    assert_eq!(summary.dropped_rows, 1);
    assert_eq!(summary.aggregated_rows, 4);
    assert_eq!(summary.merged_rows, None);

    // The county without a table was reloaded once before being skipped
    assert_eq!(fetcher.call_count(&county_url("del-norte")), 2);
    assert_eq!(fetcher.call_count(&county_url("colusa")), 1);

    let records = read_flight_records(&config.output_path).unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.flight_id.as_str()).collect();
    assert_eq!(ids, vec!["AXL-1939", "C-7000", "AXL-44", "BUT-1946"]);

    let first = &records[0];
    assert_eq!(first.date, date(1939, 5, 1));
    assert_eq!(first.scale.as_scalar(), Some(20000));
    assert_eq!(first.index_url, "http://mil.library.ucsb.edu/ap_indexes/axl1939");
    assert_eq!(first.frame_status, "Complete");
    assert_eq!(first.entity_name, "Alameda");
    assert_eq!(first.entity_url, county_url("alameda"));
    assert_eq!(
        first.reference_image_url,
        "http://fixtures.test/images/alameda_index.jpg"
    );

    assert_eq!(records[1].scale.denominators(), &[24000, 12000]);
    assert_eq!(records[1].date, date(1941, 6, 3));
    assert_eq!(records[2].date, None);
    assert_eq!(records[2].index_url, "http://mil.library.ucsb.edu/ap_indexes/axl44");
    assert_eq!(
        records[3].reference_image_url,
        "http://fixtures.test/images/butte_index.jpg"
    );
}

#[tokio::test]
async fn test_table_read_retried_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FixtureFetcher::library().with_responses(
        &county_url("alameda"),
        vec![fixture("del-norte.html"), fixture("alameda.html")],
    ));

    let summary = run_scrape(&config, SharedFetcher(fetcher.clone()))
        .await
        .unwrap();

    assert_eq!(fetcher.call_count(&county_url("alameda")), 2);
    assert_eq!(summary.entities_succeeded, 2);
    assert_eq!(summary.aggregated_rows, 4);
}

#[tokio::test]
async fn test_rerun_writes_identical_records() {
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();

    let first = test_config(first_dir.path());
    let second = test_config(second_dir.path());
    run_scrape(&first, FixtureFetcher::library()).await.unwrap();
    run_scrape(&second, FixtureFetcher::library()).await.unwrap();

    let first_bytes = std::fs::read(&first.output_path).unwrap();
    let second_bytes = std::fs::read(&second.output_path).unwrap();
    assert!(!first_bytes.is_empty());
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn test_scrape_reconciles_with_reference() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.reference_path = Some(fixture_path("reference.csv"));

    let summary = run_scrape(&config, FixtureFetcher::library()).await.unwrap();

    assert_eq!(summary.reference_rows, Some(4));
    assert_eq!(summary.reference_rows_skipped, 1);
    assert_eq!(summary.merged_rows, Some(6));
    let stats = summary.merge.clone().unwrap();
    assert_eq!(stats.matched, 3);
    assert_eq!(stats.scraped_only, 2);
    assert_eq!(stats.reference_only, 1);
    assert_eq!(stats.duplicate_reference_keys, 1);

    let merged = std::fs::read_to_string(&config.merged_output_path).unwrap();
    let lines: Vec<&str> = merged.lines().collect();
    assert_eq!(lines.len(), 7);
    assert_eq!(
        lines[0],
        "date,flight_id,scale,index_url,frame_status,county_name,county_url,reference_image_url,long,lat,frame,reference_scale,scan"
    );
    assert!(lines[1].starts_with("1939-05-01,AXL-1939,20000,"));
    assert!(lines[1].ends_with(
        ",-122.08,37.65,1-12,20000,http://mil.library.ucsb.edu/ap_images/axl-1939/axl-1939_1-12.jpg"
    ));
    assert!(lines[2].starts_with("1939-05-01,AXL-1939,"));
    assert!(lines[2].ends_with(",1-13,20000,"));
    assert!(lines[3].starts_with("1941-06-03,C-7000,\"[24000, 12000]\","));
    assert!(lines[3].ends_with(",,,,,"));
    assert!(lines[4].starts_with(",AXL-44,10000,"));
    assert!(lines[5].starts_with("1946-04-12,BUT-1946,20000,"));
    assert_eq!(lines[6], "1950-07-01,DN-1950,,,,,,,-124.02,41.75,1-1,20000,");
}

#[tokio::test]
async fn test_reconcile_previous_scrape() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    run_scrape(&config, FixtureFetcher::library()).await.unwrap();

    let merged_path = dir.path().join("reconciled").join("merged.csv");
    let summary = run_reconcile(
        &config.output_path,
        &fixture_path("reference.csv"),
        &merged_path,
    )
    .unwrap();

    assert_eq!(summary.entities_discovered, 0);
    assert_eq!(summary.aggregated_rows, 4);
    assert_eq!(summary.merged_rows, Some(6));
    assert!(merged_path.exists());
}

#[tokio::test]
async fn test_index_without_county_list_is_discovery_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = FixtureFetcher::default().with_page(
        INDEX_URL,
        "<html><body><p>This page has moved.</p></body></html>",
    );

    let err = run_scrape(&config, fetcher).await.unwrap_err();
    assert!(matches!(scrape_error(&err), ScrapeError::Discovery(_)));
    assert!(!config.output_path.exists());
}

#[tokio::test]
async fn test_unreachable_index_is_discovery_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let err = run_scrape(&config, FixtureFetcher::default()).await.unwrap_err();
    assert!(matches!(scrape_error(&err), ScrapeError::Discovery(_)));
}

#[tokio::test]
async fn test_every_county_failing_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let index = r#"<html><body><main id="content"><article><div>
        <h3>Counties</h3>
        <ul><li><a href="/airphotos/colusa">Colusa</a></li><li><a href="/airphotos/del-norte">Del Norte</a></li></ul>
        </div></article></main></body></html>"#;
    let fetcher = FixtureFetcher::default()
        .with_page(INDEX_URL, index)
        .with_page(&county_url("del-norte"), &fixture("del-norte.html"));

    let err = run_scrape(&config, fetcher).await.unwrap_err();
    assert!(matches!(
        scrape_error(&err),
        ScrapeError::EmptyAggregate { attempted: 2 }
    ));
    assert!(!config.output_path.exists());
}
