//! Integration tests for the page parsers and archive reader using frozen
//! exchange fixtures.

use chrono::NaiveDate;
use std::path::PathBuf;
use lilycast_core::data::{
    parse_archive_page, parse_company_page, parse_indices, parse_price_board, ArchiveReader, ContentSource, Page,
    SeriesMerger, StaticSource,
};
use lilycast_core::domain::{CanonicalField, FieldValue};

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_dir().join(name)).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ── Company page ─────────────────────────────────────────────────────

#[test]
fn company_fixture_normalizes_every_known_label() {
    let quote = parse_company_page("gp", &fixture("company_gp.html")).unwrap();
    let m = &quote.metrics;
    assert_eq!(quote.symbol, "GP");

    assert_eq!(m.number(CanonicalField::LastTradedPrice), Some(352.4));
    assert_eq!(m.number(CanonicalField::Close), Some(351.9));
    assert_eq!(m.number(CanonicalField::Open), Some(350.0));
    assert_eq!(m.number(CanonicalField::Low), Some(349.0));
    assert_eq!(m.number(CanonicalField::High), Some(355.1));
    assert_eq!(m.number(CanonicalField::Change), Some(2.4));
    assert_eq!(m.number(CanonicalField::PercentChange), Some(0.69));
    assert_eq!(m.number(CanonicalField::Week52Low), Some(280.0));
    assert_eq!(m.number(CanonicalField::Week52High), Some(410.5));
    assert_eq!(m.number(CanonicalField::Volume), Some(342_118.0));
    assert_eq!(m.number(CanonicalField::TradeCount), Some(2_931.0));
    assert_eq!(m.number(CanonicalField::TradedValue), Some(120.55));
    assert_eq!(m.number(CanonicalField::MarketCap), Some(475_837.28));
    assert_eq!(m.number(CanonicalField::YesterdayClose), Some(350.0));

    assert_eq!(m.number(CanonicalField::AuthorizedCapital), Some(40_000.0));
    assert_eq!(m.number(CanonicalField::PaidUpCapital), Some(13_503.01));
    assert_eq!(m.get(CanonicalField::FaceValue), Some(&FieldValue::Number(10.0)));
    assert_eq!(m.get(CanonicalField::MarketLot), Some(&FieldValue::Number(1.0)));
    assert_eq!(m.number(CanonicalField::OutstandingShares), Some(1_350_300_022.0));
    assert_eq!(m.text(CanonicalField::Sector), Some("Telecommunication"));

    assert_eq!(m.number(CanonicalField::DividendYield), Some(125.0));
    assert_eq!(m.number(CanonicalField::ListingYear), Some(2009.0));
    assert_eq!(m.text(CanonicalField::Category), Some("A"));

    assert_eq!(m.number(CanonicalField::EpsBasic), Some(15.71));
    assert_eq!(m.number(CanonicalField::Nav), Some(29.88));
    assert_eq!(m.number(CanonicalField::PeBasic), Some(11.21));
    assert_eq!(
        m.text(CanonicalField::ShareHolding),
        Some("Sponsor/Director: 90.00 Govt: 0.00 Institute: 5.27 Foreign: 2.41 Public: 2.32")
    );
}

#[test]
fn adjusted_prices_never_overwrite_raw_ones() {
    let quote = parse_company_page("GP", &fixture("company_gp.html")).unwrap();
    // "Adjusted Opening Price" is 348.00 in the fixture
    assert_eq!(quote.metrics.number(CanonicalField::Open), Some(350.0));
}

#[test]
fn company_live_bar_uses_page_range() {
    let quote = parse_company_page("GP", &fixture("company_gp.html")).unwrap();
    let bar = quote.live_bar(date(2025, 6, 3)).unwrap();
    assert_eq!((bar.open, bar.high, bar.low, bar.close), (350.0, 355.1, 349.0, 352.4));
    assert_eq!(bar.volume, 342_118.0);
}

// ── Price board ──────────────────────────────────────────────────────

#[test]
fn price_board_fixture() {
    let rows = parse_price_board(&fixture("latest_prices.html"));
    let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["GP", "SQURPHARMA", "BRACBANK"]);

    let squr = &rows[1];
    assert_eq!(squr.close, None);
    assert_eq!(squr.open, 211.0);
    assert_eq!(squr.percent_change, -0.24);
    assert_eq!(squr.volume, 418_020);

    let gp = &rows[0];
    assert_eq!(gp.close, Some(351.9));
    assert_eq!(gp.trade, 2_931);
}

// ── Home page indices ────────────────────────────────────────────────

#[test]
fn home_fixture_indices() {
    let indices = parse_indices(&fixture("home.html"));
    let names: Vec<&str> = indices.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["DSEX", "DSES", "DS30"]);
    assert_eq!(indices[0].value, 5210.74);
    assert_eq!(indices[0].change, -14.27);
    assert_eq!(indices[2].percent_change, -0.16);
}

// ── Archive sources and merge ────────────────────────────────────────

#[test]
fn archive_page_fixture_sorted_and_partial_rows_kept() {
    let bars = parse_archive_page(&fixture("day_end_archive_gp.html"));
    let dates: Vec<_> = bars.iter().filter_map(|b| b.date).collect();
    assert_eq!(dates, vec![date(2025, 4, 16), date(2025, 4, 17), date(2025, 4, 20)]);
    assert!(bars[0].complete().is_none(), "missing open stays partial");
    let last = bars[2].complete().unwrap();
    assert_eq!((last.open, last.high, last.low, last.close), (299.0, 303.0, 298.0, 302.0));
    assert_eq!(last.volume, 233_000.0);
}

#[test]
fn archive_csv_fixture_respects_cutoff() {
    let reader = ArchiveReader::new(date(2025, 4, 15));
    let bars = reader.read_path(fixture_dir().join("archive_sample.csv"), "gp").unwrap();
    let dates: Vec<_> = bars.iter().filter_map(|b| b.date).collect();
    assert_eq!(
        dates,
        vec![date(2025, 4, 10), date(2025, 4, 13), date(2025, 4, 14), date(2025, 4, 15)]
    );
    let close_only = bars[2].complete().unwrap();
    assert_eq!((close_only.open, close_only.close, close_only.volume), (295.5, 295.5, 0.0));
}

#[test]
fn archive_missing_file_is_an_error() {
    let reader = ArchiveReader::default();
    assert!(reader.read_path(fixture_dir().join("nope.csv"), "GP").is_err());
}

#[test]
fn fixtures_merge_into_one_series() {
    let archive = ArchiveReader::new(date(2025, 4, 15))
        .read_path(fixture_dir().join("archive_sample.csv"), "GP")
        .unwrap();
    let scraped = parse_archive_page(&fixture("day_end_archive_gp.html"));
    let live = parse_company_page("GP", &fixture("company_gp.html"))
        .and_then(|q| q.live_bar(date(2025, 4, 20)));

    let (series, stats) = SeriesMerger::new()
        .source("archive", archive)
        .source("scraped", scraped)
        .live_bar(live)
        .merge();

    // 4 archive days + 04-17 + 04-20; 04-16 is dropped for its missing open
    assert_eq!(series.len(), 6);
    assert_eq!(stats.incomplete, 1);
    assert!(stats.live_replaced);
    assert_eq!(series.last().unwrap().close, 352.4);
    assert!(series.get(date(2025, 4, 16)).is_none());
}

#[test]
fn static_source_serves_fixtures_by_page() {
    let source = StaticSource::new()
        .with_page(Page::Home, fixture("home.html"))
        .with_page(Page::LatestPrices, fixture("latest_prices.html"));
    assert_eq!(parse_indices(&source.fetch(&Page::Home).unwrap()).len(), 3);
    assert_eq!(parse_price_board(&source.fetch(&Page::LatestPrices).unwrap()).len(), 3);
    assert!(source.fetch(&Page::Company { symbol: "GP".into() }).is_err());
}
