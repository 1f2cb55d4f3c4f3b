//! 编译后的不可变 HAVING 表达式

use crate::ast::Condition;
use crate::error::{CompileError, EvalResult};
use crate::evaluator::{self, RowLookup};
use crate::lexer::tokenize;
use crate::parser::parse;
use log::debug;
use std::fmt;
use std::str::FromStr;

/// 语法树及其源文本
///
/// 构造后不再修改，可以通过 `Arc` 或引用共享，在多个线程中对不同的行求值
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    root: Condition,
}

impl CompiledExpression {
    /// 词法分析并解析 `source`，遇到第一个错误即停止
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        let tokens = tokenize(source)?;
        let root = parse(&tokens)?;
        let compiled = Self { source: source.to_string(), root };
        debug!(
            "compiled having expression {:?} ({} tokens, keys: {:?})",
            compiled.source,
            tokens.len(),
            compiled.referenced_keys()
        );
        Ok(compiled)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Condition {
        &self.root
    }

    /// 规范形式，重新编译得到相等的语法树
    pub fn canonical(&self) -> String {
        self.root.to_string()
    }

    pub fn referenced_keys(&self) -> Vec<String> {
        self.root.referenced_keys()
    }

    /// 判断 `row` 是否通过过滤
    pub fn evaluate<R: RowLookup + ?Sized>(&self, row: &R) -> EvalResult<bool> {
        evaluator::evaluate(self, row)
    }
}

impl FromStr for CompiledExpression {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LexError, SyntaxError};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_compile_keeps_source() {
        let expr = CompiledExpression::compile("count(errors)  >  10").unwrap();
        assert_eq!(expr.source(), "count(errors)  >  10");
        assert_eq!(expr.to_string(), "count(errors)  >  10");
        assert_eq!(expr.canonical(), "count(errors) > 10");
        assert_eq!(expr.referenced_keys(), vec!["count(errors)".to_string()]);
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            CompiledExpression::compile("a # 1").unwrap_err(),
            CompileError::Lex(LexError { position: 2, character: '#' })
        );
        assert!(matches!(
            CompiledExpression::compile("NOT a = 1").unwrap_err(),
            CompileError::Syntax(SyntaxError { position: 4, .. })
        ));
    }

    #[test]
    fn test_from_str() {
        let expr: CompiledExpression = "a < 1".parse().unwrap();
        assert_eq!(expr.canonical(), "a < 1");
        assert!("a <".parse::<CompiledExpression>().is_err());
    }

    #[test]
    fn test_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompiledExpression>();
    }

    #[test]
    fn test_concurrent_evaluation() {
        let expr = Arc::new(CompiledExpression::compile("a * 2 >= 10 AND b < 3").unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let expr = Arc::clone(&expr);
                thread::spawn(move || {
                    let mut row = HashMap::new();
                    row.insert("a".to_string(), i as f64);
                    row.insert("b".to_string(), 0.0);
                    expr.evaluate(&row).unwrap()
                })
            })
            .collect();
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![false, false, false, false, false, true, true, true]);
    }
}
