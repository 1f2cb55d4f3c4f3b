//! 求值器：对单个聚合行应用已编译的 HAVING 表达式

use crate::ast::{ArithOp, CompOp, Condition, Operand};
use crate::compiled::CompiledExpression;
use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// 行中某个规范键对应的值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowValue {
    Number(f64),
    Missing,
    NonNumeric,
}

impl From<f64> for RowValue {
    fn from(value: f64) -> Self {
        RowValue::Number(value)
    }
}

/// 按键读取单行的聚合值
///
/// 键精确匹配：裸标识符如 `p99`，或不含空格的函数形式 `name(arg1,arg2)`
pub trait RowLookup {
    fn lookup(&self, key: &str) -> RowValue;
}

impl<S: BuildHasher> RowLookup for HashMap<String, f64, S> {
    fn lookup(&self, key: &str) -> RowValue {
        self.get(key).map_or(RowValue::Missing, |v| RowValue::Number(*v))
    }
}

impl RowLookup for BTreeMap<String, f64> {
    fn lookup(&self, key: &str) -> RowValue {
        self.get(key).map_or(RowValue::Missing, |v| RowValue::Number(*v))
    }
}

impl<S: BuildHasher> RowLookup for HashMap<String, RowValue, S> {
    fn lookup(&self, key: &str) -> RowValue {
        self.get(key).copied().unwrap_or(RowValue::Missing)
    }
}

/// JSON 对象行：数字为数值，其他存在的值（包括 `null`）都视为非数值
impl RowLookup for serde_json::Map<String, serde_json::Value> {
    fn lookup(&self, key: &str) -> RowValue {
        match self.get(key) {
            None => RowValue::Missing,
            Some(value) => value.as_f64().map_or(RowValue::NonNumeric, RowValue::Number),
        }
    }
}

/// 针对单行遍历条件树
///
/// 只借用行数据，语法树本身可以在线程间共享
pub struct Evaluator<'r, R: RowLookup + ?Sized> {
    row: &'r R,
}

/// 对 `row` 求值 `expr`，决定该行是否保留
pub fn evaluate<R: RowLookup + ?Sized>(expr: &CompiledExpression, row: &R) -> EvalResult<bool> {
    Evaluator::new(row).evaluate(expr.root())
}

impl<'r, R: RowLookup + ?Sized> Evaluator<'r, R> {
    pub fn new(row: &'r R) -> Self {
        Self { row }
    }

    /// 条件求值，`OR` 和 `AND` 从左到右短路
    /// 结果确定之后的操作数不会被求值，也就不会出错
    pub fn evaluate(&self, condition: &Condition) -> EvalResult<bool> {
        match condition {
            Condition::Or(children) => {
                for child in children {
                    if self.evaluate(child)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::And(children) => {
                for child in children {
                    if !self.evaluate(child)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Not(inner) => Ok(!self.evaluate(inner)?),
            Condition::Comparison { left, op, right } => {
                let left = self.evaluate_operand(left)?;
                let right = self.evaluate_operand(right)?;
                Ok(compare(*op, left, right))
            }
        }
    }

    /// 算术操作数求值
    pub fn evaluate_operand(&self, operand: &Operand) -> EvalResult<f64> {
        match operand {
            Operand::Number(value) => Ok(*value),
            Operand::Paren(inner) => self.evaluate_operand(inner),
            Operand::Binary { op, left, right } => {
                let left = self.evaluate_operand(left)?;
                let right = self.evaluate_operand(right)?;
                apply_arith(*op, left, right)
            }
            Operand::Identifier(_) | Operand::FunctionRef { .. } => {
                let key = operand.canonical_key().unwrap_or_default();
                self.resolve(key)
            }
        }
    }

    fn resolve(&self, key: String) -> EvalResult<f64> {
        match self.row.lookup(&key) {
            RowValue::Number(value) => Ok(value),
            RowValue::Missing => Err(EvalError::UnresolvedIdentifier { name: key }),
            RowValue::NonNumeric => Err(EvalError::NonNumericValue { name: key }),
        }
    }
}

/// IEEE-754 比较：涉及 NaN 的大小和相等比较均为 false，`!=` 为其取反
fn compare(op: CompOp, left: f64, right: f64) -> bool {
    match op {
        CompOp::Eq => left == right,
        CompOp::NotEq => left != right,
        CompOp::Lt => left < right,
        CompOp::Lte => left <= right,
        CompOp::Gt => left > right,
        CompOp::Gte => left >= right,
    }
}

fn apply_arith(op: ArithOp, left: f64, right: f64) -> EvalResult<f64> {
    match op {
        ArithOp::Add => Ok(left + right),
        ArithOp::Sub => Ok(left - right),
        ArithOp::Mul => Ok(left * right),
        ArithOp::Div | ArithOp::Rem if right == 0.0 => {
            Err(EvalError::DivisionByZero { operator: op.symbol() })
        }
        ArithOp::Div => Ok(left / right),
        // 截断取余，符号与被除数相同
        ArithOp::Rem => Ok(left % right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn eval(source: &str, row: &HashMap<String, f64>) -> EvalResult<bool> {
        let expr = CompiledExpression::compile(source).unwrap();
        evaluate(&expr, row)
    }

    #[test]
    fn test_simple_comparisons() {
        let r = row(&[("a", 5.0)]);
        assert!(eval("a = 5", &r).unwrap());
        assert!(eval("a != 4", &r).unwrap());
        assert!(eval("a <> 4", &r).unwrap());
        assert!(eval("a < 6", &r).unwrap());
        assert!(eval("a <= 5", &r).unwrap());
        assert!(eval("a > 4.5", &r).unwrap());
        assert!(eval("a >= 5", &r).unwrap());
        assert!(!eval("a > 5", &r).unwrap());
    }

    #[test]
    fn test_arithmetic() {
        let r = row(&[("a", 7.0), ("b", 2.0)]);
        assert!(eval("a + b = 9", &r).unwrap());
        assert!(eval("a - b * 2 = 3", &r).unwrap());
        assert!(eval("(a - b) * 2 = 10", &r).unwrap());
        assert!(eval("a / b = 3.5", &r).unwrap());
        assert!(eval("a % b = 1", &r).unwrap());
        assert!(eval("a - -1 = 8", &r).unwrap());
    }

    #[test]
    fn test_remainder_follows_dividend_sign() {
        let r = row(&[("a", -7.0), ("b", 2.5)]);
        assert!(eval("a % 2 = -1", &r).unwrap());
        assert!(eval("b % 1 = 0.5", &r).unwrap());
    }

    #[test]
    fn test_division_by_zero() {
        let r = row(&[("a", 1.0), ("z", 0.0)]);
        assert_eq!(
            eval("a / 0 > 1", &r).unwrap_err(),
            EvalError::DivisionByZero { operator: '/' }
        );
        assert_eq!(
            eval("a % z > 1", &r).unwrap_err(),
            EvalError::DivisionByZero { operator: '%' }
        );
        // 负零同样是零除数
        assert!(eval("a / -0 > 1", &r).is_err());
    }

    #[test]
    fn test_short_circuit_or() {
        let r = row(&[("a", 1.0)]);
        assert!(eval("a > 0 OR b > 0", &r).unwrap());
        assert_eq!(
            eval("a < 0 OR b > 0", &r).unwrap_err(),
            EvalError::UnresolvedIdentifier { name: "b".to_string() }
        );
    }

    #[test]
    fn test_short_circuit_and() {
        let r = row(&[("a", 1.0)]);
        assert!(!eval("a < 0 AND b > 0", &r).unwrap());
        assert_eq!(
            eval("a > 0 AND b > 0", &r).unwrap_err(),
            EvalError::UnresolvedIdentifier { name: "b".to_string() }
        );
    }

    #[test]
    fn test_first_error_wins() {
        let r = row(&[]);
        assert_eq!(
            eval("x > 0 OR y > 0", &r).unwrap_err(),
            EvalError::UnresolvedIdentifier { name: "x".to_string() }
        );
    }

    #[test]
    fn test_not() {
        let r = row(&[("a", 1.0)]);
        assert!(!eval("NOT (a = 1)", &r).unwrap());
        assert!(eval("NOT (a = 2 OR a = 3)", &r).unwrap());
        assert!(eval("NOT (NOT (a = 1))", &r).unwrap());
        assert!(eval("NOT (b = 1)", &r).is_err());
    }

    #[test]
    fn test_function_refs_use_canonical_key() {
        let r = row(&[("count(x)", 6.0), ("quantile(p99,latency)", 120.0)]);
        assert!(eval("count(x) > 5", &r).unwrap());
        assert!(eval("quantile( p99 , latency ) < 200", &r).unwrap());
        assert_eq!(
            eval("count(y) > 5", &r).unwrap_err(),
            EvalError::UnresolvedIdentifier { name: "count(y)".to_string() }
        );
    }

    #[test]
    fn test_identifiers_are_case_sensitive() {
        let r = row(&[("Errors", 3.0)]);
        assert!(eval("Errors = 3", &r).is_ok());
        assert!(eval("errors = 3", &r).is_err());
    }

    #[test]
    fn test_nan_comparisons() {
        let r = row(&[("n", f64::NAN)]);
        assert!(!eval("n = n", &r).unwrap());
        assert!(!eval("n < 1", &r).unwrap());
        assert!(!eval("n >= 1", &r).unwrap());
        assert!(eval("n != 1", &r).unwrap());
    }

    #[test]
    fn test_row_value_map() {
        let mut r: HashMap<String, RowValue> = HashMap::new();
        r.insert("a".to_string(), RowValue::from(2.0));
        r.insert("label".to_string(), RowValue::NonNumeric);
        let expr = CompiledExpression::compile("a = 2").unwrap();
        assert!(evaluate(&expr, &r).unwrap());

        let expr = CompiledExpression::compile("label = 2").unwrap();
        assert_eq!(
            evaluate(&expr, &r).unwrap_err(),
            EvalError::NonNumericValue { name: "label".to_string() }
        );
    }

    #[test]
    fn test_json_row() {
        let value = json!({ "avg(latency_ms)": 512, "service": "api", "gap": null });
        let r = value.as_object().unwrap();

        let expr = CompiledExpression::compile("avg(latency_ms) >= 500").unwrap();
        assert!(evaluate(&expr, r).unwrap());

        let expr = CompiledExpression::compile("service > 0").unwrap();
        assert!(matches!(evaluate(&expr, r), Err(EvalError::NonNumericValue { .. })));

        let expr = CompiledExpression::compile("gap > 0").unwrap();
        assert!(matches!(evaluate(&expr, r), Err(EvalError::NonNumericValue { .. })));

        let expr = CompiledExpression::compile("absent > 0").unwrap();
        assert!(matches!(evaluate(&expr, r), Err(EvalError::UnresolvedIdentifier { .. })));
    }

    #[test]
    fn test_btree_row() {
        let mut r = BTreeMap::new();
        r.insert("sum(bytes)".to_string(), 2048.0);
        let expr = CompiledExpression::compile("sum(bytes) / 1024 = 2").unwrap();
        assert!(evaluate(&expr, &r).unwrap());
    }
}
