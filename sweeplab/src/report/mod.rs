// src/report/mod.rs
//
// Turning raw simulator output into structured numbers.
//
// - rules:  declarative key-path classification (ReportSchema)
// - stats:  ReportAggregator, hierarchical stats report -> fixed-width MetricRecord
// - blocks: SegmentedBlockExtractor, marker-delimited blocks -> ExtractedBlockRecord
//
// The two outputs treat missing data differently on purpose: aggregated
// buckets with no samples read 0.0, extracted fields with no match are absent.

pub mod blocks;
pub mod rules;
pub mod stats;

pub use blocks::{
    write_block_records, BlockExtraction, BlockMarker, ExtractedBlockRecord, FieldPattern,
    SegmentedBlockExtractor, ALADDIN_FIELDS, ALADDIN_MARKER,
};
pub use rules::{
    Classified, KeyRule, LevelRule, LevelScope, MetricKind, ReportSchema, TokenPredicate,
};
pub use stats::{aggregate_report, MetricRecord, ReportAggregator, RolePolicy};
