pub mod config;
pub mod counter;
pub mod error;
pub mod merge;
pub mod pending;
pub mod sink;
pub mod worker;

pub use config::AggregatorConfig;
pub use counter::DailyCounter;
pub use error::SinkError;
pub use merge::{build_record, choose_best_text};
pub use pending::{InsertOutcome, PendingKey, PendingTable};
pub use sink::{CsvRecordSink, MemoryRecordSink, RecordSink};
pub use worker::{Aggregator, AggregatorStats};
