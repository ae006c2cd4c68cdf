pub mod allocation;
pub mod extract;
pub mod harness;
pub mod scanner;
pub mod settings;
mod utils;

pub use extract::{extract, ExtractedIdentifier, IdentifierSource, RawScanPayload};
pub use harness::run;
pub use scanner::{ScanError, ScanObserver, ScanSession, ScanState};
