pub mod eval;
pub mod pattern;

pub use eval::{Evaluator, RowScope};
pub use pattern::eval_like;
