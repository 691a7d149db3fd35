// Dataset curation stages

pub mod assembler;
pub mod export;
pub mod extractor;
pub mod preprocess;
pub mod split;
pub mod timespan;
pub mod types;
