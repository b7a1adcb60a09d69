pub mod adapter;
pub mod ast;
pub mod plugins;

pub use adapter::SqlParserAdapter;
pub use ast::Statement;
pub use plugins::{ExpressionConverter, ExpressionPlugin, ExpressionPluginRegistry};
