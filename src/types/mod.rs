//! Core value types exchanged alongside sample data.
//!
//! - [`TimeValue`] is the two-part precision timestamp stamped on every packet
//! - [`StreamDescriptor`] describes a logical stream (SRI); [`sri::diff`] reports
//!   which fields changed between two descriptors
//! - [`Keyword`] and [`Value`] carry typed per-stream metadata
//!
//! All of these are plain values: `Send + Sync`, freely cloned and shared across
//! threads without locking.
//!
//! ## Usage Example
//!
//! ```rust
//! use sigport::types::{sri, StreamDescriptor, SriChanges, TimeValue, TimeCodeMode};
//!
//! let previous = StreamDescriptor::create("rx_0", 2_000_000.0, 1, false);
//! let next = previous.clone().with_keyword("COL_RF", 101.5e6);
//!
//! let changes = sri::diff(Some(&previous), Some(&next));
//! assert_eq!(changes, SriChanges::KEYWORDS);
//!
//! let first = TimeValue::create(100.0, 0.75, TimeCodeMode::Cpu);
//! let tenth = first.add_sample_offset(10, next.xdelta);
//! assert!(tenth.difference(&first) > 0.0);
//! ```

mod keyword;
pub mod sri;
mod time;

pub use keyword::{Keyword, Value};
pub use sri::{SriChanges, SriComparator, StreamDescriptor, UNITS_TIME};
pub use time::{TimeCodeMode, TimeCodeStatus, TimeValue};
