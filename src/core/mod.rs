pub mod error;
pub mod types;
pub mod value;

pub use error::{Failure, Result, TxError};
pub use types::{Column, Params, Record, Row};
pub use value::{DataType, Value};
