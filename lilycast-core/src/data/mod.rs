//! Data acquisition: extraction, normalization, page parsing, archive, merging

pub mod archive;
pub mod extract;
pub mod http;
pub mod merge;
pub mod normalize;
pub mod pages;
pub mod source;

pub use archive::ArchiveReader;
pub use extract::{extract_tables, RawRow, RawTable, TableExtractor, TableSelector};
pub use http::HttpContentSource;
pub use merge::{merge_sources, MergeStats, SeriesMerger};
pub use normalize::{
    normalize_pair, normalize_rows, parse_number, FieldRule, KeyMatch, MatchRule, Outcome, HOLDING_RULES,
    QUOTE_RULES,
};
pub use pages::{
    parse_archive_page, parse_company_page, parse_indices, parse_price_board, CompanyQuote, IndexSnapshot,
    PriceBoardRow,
};
pub use source::{ContentSource, DataError, Page, StaticSource};
