//! Stream combinators for descriptor updates

mod distinct;

pub use distinct::{DistinctSri, DistinctSriExt};
