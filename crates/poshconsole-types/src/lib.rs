pub mod ps_value;
pub mod records;

pub use ps_value::*;
pub use records::*;

#[cfg(test)]
mod tests;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("Unknown console color: {0}")]
    UnknownColor(String),
}
