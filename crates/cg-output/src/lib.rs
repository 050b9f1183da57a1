pub mod color;
pub mod error;
pub mod json;
pub mod text;
pub mod validate;

pub use color::ColorScheme;
pub use error::OutputError;
pub use json::JsonFormatter;
pub use text::TextFormatter;
pub use validate::{validate_stream, ValidateError};
