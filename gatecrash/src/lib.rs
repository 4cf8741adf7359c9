pub mod targets;

pub use targets::{load_targets_from_file, parse_target_line};
