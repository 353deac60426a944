mod object;
mod primitive;
mod value;

pub use object::*;
pub use primitive::*;
pub use value::*;
