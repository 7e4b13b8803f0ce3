/// Blank-line separated batch replay source.
pub mod batch_file;

/// External scraper process driven over a line protocol.
pub mod process;
