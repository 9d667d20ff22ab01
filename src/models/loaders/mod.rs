pub mod toml_loader;

pub use toml_loader::{load_term_list, TermList};
