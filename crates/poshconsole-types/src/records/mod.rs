mod color;
mod error_record;
mod key_info;
mod progress_record;

pub use color::*;
pub use error_record::*;
pub use key_info::*;
pub use progress_record::*;
