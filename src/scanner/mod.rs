pub mod source_scanner;
pub mod tag_list;

pub use source_scanner::{ScanStatistics, SourceFile, SourceScanner};
pub use tag_list::{parse_tag_list, read_tag_list, split_tags};
