pub mod catalog;
pub mod decollide;
pub mod expand;
pub mod infer;
pub mod processor;
pub mod types;
pub mod unexpand;

pub use catalog::{CatalogEntry, MacroCatalog};
pub use decollide::{collides, resolve, ResolveOutcome, MAX_ATTEMPTS};
pub use expand::{expand, used_macros};
pub use infer::{classify, DATETIME_FORMATS};
pub use processor::{MacroProcessor, RecordStore};
pub use types::*;
pub use unexpand::{render_header, unexpand};
