pub mod commands;
pub mod ui;
pub mod util;

pub use util::{agents_report_path, load_config, resolve_format};
