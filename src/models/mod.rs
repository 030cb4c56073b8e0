//! Data models for marketplace meeting entities

mod envelope;
mod meeting;

#[cfg(test)]
pub(crate) use meeting::fixtures;

pub use envelope::*;
pub use meeting::*;
