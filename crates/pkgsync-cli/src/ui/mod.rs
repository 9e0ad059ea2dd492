//! Terminal output
//!
//! ```text
//! commands / TerminalReporter
//!        │ send events
//!        ▼
//!     Output ──► UiActor (one thread, renders in order)
//! ```
//!
//! Tabular listings (`repo list`, `apps`) are printed directly by [`list`].

pub mod actor;
pub mod list;
pub mod output;
pub mod theme;

pub use output::{Output, TerminalReporter};
pub use theme::Theme;
