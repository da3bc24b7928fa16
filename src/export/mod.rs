pub mod job;
pub mod sink;
pub mod tables;

pub use job::{export_session, ExportReport, ExportedTable};
pub use sink::{CsvSink, TabularSink};
pub use tables::Table;
