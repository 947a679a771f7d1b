pub mod jsonl;

pub use jsonl::{ImportSummary, import_reader, open_input, spawn_file_import};
