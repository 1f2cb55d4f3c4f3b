//! 聚合结果集的逐行过滤
//!
//! 求值器每次只判断一行，这里把同一个表达式应用到整批数据上，
//! 单行的失败不影响其他行

use crate::compiled::CompiledExpression;
use crate::config::{ErrorPolicy, FilterConfig};
use crate::error::{CompileError, EvalError, EvalResult};
use crate::evaluator::RowLookup;
use log::{debug, warn};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("expression is {len} bytes long, the limit is {limit}")]
    ExpressionTooLong { len: usize, limit: usize },

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// 仅在 [`ErrorPolicy::Surface`] 下返回
    #[error("row {index}: {source}")]
    Row { index: usize, source: EvalError },
}

/// 求值失败而被排除的行
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub index: usize,
    pub error: EvalError,
}

/// 按索引记录的批量过滤结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    /// 通过过滤的行索引，保持输入顺序
    pub kept: Vec<usize>,
    pub failures: Vec<RowFailure>,
}

/// 已编译的表达式及单行失败的处理策略
#[derive(Debug, Clone)]
pub struct RowFilter {
    expr: CompiledExpression,
    config: FilterConfig,
}

impl RowFilter {
    /// 在 `config` 的限制下编译 `source`
    pub fn new(source: &str, config: FilterConfig) -> Result<Self, FilterError> {
        if source.len() > config.max_expression_len {
            return Err(FilterError::ExpressionTooLong {
                len: source.len(),
                limit: config.max_expression_len,
            });
        }
        let expr = CompiledExpression::compile(source)?;
        Ok(Self { expr, config })
    }

    pub fn from_compiled(expr: CompiledExpression, config: FilterConfig) -> Self {
        Self { expr, config }
    }

    pub fn expression(&self) -> &CompiledExpression {
        &self.expr
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// 对单行求值，不应用错误策略
    pub fn test_row<R: RowLookup + ?Sized>(&self, row: &R) -> EvalResult<bool> {
        self.expr.evaluate(row)
    }

    /// 过滤借用的行，按索引返回保留的行
    pub fn apply<'r, R, I>(&self, rows: I) -> Result<FilterOutcome, FilterError>
    where
        R: RowLookup + 'r,
        I: IntoIterator<Item = &'r R>,
    {
        let mut outcome = FilterOutcome::default();
        let mut total = 0;
        for (index, row) in rows.into_iter().enumerate() {
            total += 1;
            if self.decide(index, self.expr.evaluate(row), &mut outcome.failures)? {
                outcome.kept.push(index);
            }
        }
        self.log_summary(total, outcome.kept.len(), outcome.failures.len());
        Ok(outcome)
    }

    /// 过滤拥有所有权的行，返回通过的行和失败记录
    pub fn retain<R: RowLookup>(
        &self,
        rows: Vec<R>,
    ) -> Result<(Vec<R>, Vec<RowFailure>), FilterError> {
        let total = rows.len();
        let mut kept = Vec::new();
        let mut failures = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            if self.decide(index, self.expr.evaluate(&row), &mut failures)? {
                kept.push(row);
            }
        }
        self.log_summary(total, kept.len(), failures.len());
        Ok((kept, failures))
    }

    fn decide(
        &self,
        index: usize,
        result: EvalResult<bool>,
        failures: &mut Vec<RowFailure>,
    ) -> Result<bool, FilterError> {
        match result {
            Ok(keep) => Ok(keep),
            Err(error) => match self.config.on_error {
                ErrorPolicy::Exclude => {
                    warn!("excluding row {} from having filter {:?}: {}", index, self.expr.source(), error);
                    failures.push(RowFailure { index, error });
                    Ok(false)
                }
                ErrorPolicy::Surface => Err(FilterError::Row { index, source: error }),
            },
        }
    }

    fn log_summary(&self, total: usize, kept: usize, failed: usize) {
        debug!(
            "having filter {:?}: {} rows in, {} kept, {} failed",
            self.expr.source(),
            total,
            kept,
            failed
        );
    }
}
