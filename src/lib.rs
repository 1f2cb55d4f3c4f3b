//! 聚合行上的 HAVING 过滤表达式
//!
//! 形如 `count(errors) > 10 AND avg(latency_ms) >= 500` 的表达式只编译一次，
//! 得到不可变的 [`CompiledExpression`]，然后对每个候选行求值。
//! 行是从规范键（`p99`、`avg(latency_ms)`）到数字的映射。
//!
//! ```
//! use having_expr::CompiledExpression;
//! use std::collections::HashMap;
//!
//! let expr = CompiledExpression::compile("count(errors) > 10 AND avg(latency_ms) >= 500").unwrap();
//!
//! let mut row = HashMap::new();
//! row.insert("count(errors)".to_string(), 12.0);
//! row.insert("avg(latency_ms)".to_string(), 730.0);
//! assert!(expr.evaluate(&row).unwrap());
//! ```

pub mod ast;
pub mod compiled;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{ArithOp, CompOp, Condition, Operand};
pub use compiled::CompiledExpression;
pub use config::{ErrorPolicy, FilterConfig};
pub use error::{CompileError, EvalError, LexError, SyntaxError};
pub use evaluator::{evaluate, RowLookup, RowValue};
pub use filter::{FilterError, FilterOutcome, RowFailure, RowFilter};

/// [`CompiledExpression::compile`] 的简写
pub fn compile(source: &str) -> Result<CompiledExpression, CompileError> {
    CompiledExpression::compile(source)
}
