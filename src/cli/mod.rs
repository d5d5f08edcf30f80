pub mod options;
pub mod report;
