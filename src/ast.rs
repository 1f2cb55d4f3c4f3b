use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件表达式树，AST 的根节点
///
/// `Or`/`And` 保存扁平的子节点列表，解析器保证列表至少有两个元素
/// （单个子节点会被折叠为该子节点本身）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// 逻辑或运算 (OR)
    Or(Vec<Condition>),
    /// 逻辑与运算 (AND)
    And(Vec<Condition>),
    /// 逻辑非运算 (NOT)，只包裹括号内的子表达式
    Not(Box<Condition>),
    /// 基础比较运算, 这是条件的叶子节点
    Comparison {
        left: Operand,
        op: CompOp,
        right: Operand,
    },
}

/// 比较运算的算术操作数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Binary {
        op: ArithOp,
        left: Box<Operand>,
        right: Box<Operand>,
    },
    /// 使用括号分组的算术表达式
    Paren(Box<Operand>),
    /// 形如 `avg(duration)` 的函数引用，并不真正调用，只作为行中的键
    FunctionRef { name: String, args: Vec<String> },
    Identifier(String),
    Number(f64),
}

/// 比较运算符，`!=` 和 `<>` 都解析为 `NotEq`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompOp {
    Eq,    // =
    NotEq, // != 或 <>
    Lt,    // <
    Lte,   // <=
    Gt,    // >
    Gte,   // >=
}

/// 算术运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Rem, // %
}

impl CompOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompOp::Eq => "=",
            CompOp::NotEq => "!=",
            CompOp::Lt => "<",
            CompOp::Lte => "<=",
            CompOp::Gt => ">",
            CompOp::Gte => ">=",
        }
    }
}

impl ArithOp {
    pub fn symbol(self) -> char {
        match self {
            ArithOp::Add => '+',
            ArithOp::Sub => '-',
            ArithOp::Mul => '*',
            ArithOp::Div => '/',
            ArithOp::Rem => '%',
        }
    }
}

impl Operand {
    /// 行查找使用的规范键：标识符本身，或 `name(arg1,arg2)` 形式
    /// 其他操作数没有键
    pub fn canonical_key(&self) -> Option<String> {
        match self {
            Operand::Identifier(name) => Some(name.clone()),
            Operand::FunctionRef { name, args } => Some(function_key(name, args)),
            _ => None,
        }
    }

    fn collect_keys(&self, keys: &mut Vec<String>) {
        match self {
            Operand::Binary { left, right, .. } => {
                left.collect_keys(keys);
                right.collect_keys(keys);
            }
            Operand::Paren(inner) => inner.collect_keys(keys),
            Operand::Number(_) => {}
            Operand::Identifier(_) | Operand::FunctionRef { .. } => {
                if let Some(key) = self.canonical_key() {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
        }
    }
}

/// 拼接函数引用的规范键，参数之间不留空格
pub fn function_key(name: &str, args: &[String]) -> String {
    format!("{}({})", name, args.join(","))
}

impl Condition {
    /// 表达式读取的所有规范键（去重，按首次出现顺序）
    pub fn referenced_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys(&self, keys: &mut Vec<String>) {
        match self {
            Condition::Or(children) | Condition::And(children) => {
                for child in children {
                    child.collect_keys(keys);
                }
            }
            Condition::Not(inner) => inner.collect_keys(keys),
            Condition::Comparison { left, right, .. } => {
                left.collect_keys(keys);
                right.collect_keys(keys);
            }
        }
    }
}

// 规范化输出：对解析器产生的任意树，重新解析输出文本得到相同的树

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    // OR 内部的 OR 必须加括号，否则会被展平
                    if matches!(child, Condition::Or(_)) {
                        write!(f, "({})", child)?;
                    } else {
                        write!(f, "{}", child)?;
                    }
                }
                Ok(())
            }
            Condition::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    if matches!(child, Condition::Or(_) | Condition::And(_)) {
                        write!(f, "({})", child)?;
                    } else {
                        write!(f, "{}", child)?;
                    }
                }
                Ok(())
            }
            Condition::Not(inner) => write!(f, "NOT ({})", inner),
            Condition::Comparison { left, op, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // 解析器只会通过 Paren 改变结合方式，因此这里不需要额外括号
            Operand::Binary { op, left, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Operand::Paren(inner) => write!(f, "({})", inner),
            Operand::FunctionRef { name, args } => f.write_str(&function_key(name, args)),
            Operand::Identifier(name) => f.write_str(name),
            Operand::Number(value) => write!(f, "{}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Operand {
        Operand::Identifier(name.to_string())
    }

    fn cmp(left: Operand, op: CompOp, right: f64) -> Condition {
        Condition::Comparison { left, op, right: Operand::Number(right) }
    }

    #[test]
    fn test_canonical_key() {
        let func = Operand::FunctionRef {
            name: "quantile".to_string(),
            args: vec!["p99".to_string(), "latency".to_string()],
        };
        assert_eq!(func.canonical_key().as_deref(), Some("quantile(p99,latency)"));

        let empty = Operand::FunctionRef { name: "count".to_string(), args: vec![] };
        assert_eq!(empty.canonical_key().as_deref(), Some("count()"));

        assert_eq!(ident("a").canonical_key().as_deref(), Some("a"));
        assert_eq!(Operand::Number(1.0).canonical_key(), None);
    }

    #[test]
    fn test_referenced_keys_are_deduplicated_in_order() {
        let condition = Condition::Or(vec![
            cmp(ident("b"), CompOp::Gt, 1.0),
            Condition::And(vec![
                cmp(ident("a"), CompOp::Lt, 2.0),
                Condition::Not(Box::new(cmp(ident("b"), CompOp::Eq, 3.0))),
            ]),
        ]);
        assert_eq!(condition.referenced_keys(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_display_parenthesizes_nested_logic() {
        let condition = Condition::And(vec![
            cmp(ident("a"), CompOp::Gt, 1.0),
            Condition::Or(vec![
                cmp(ident("b"), CompOp::NotEq, 2.0),
                cmp(ident("c"), CompOp::Lte, -3.5),
            ]),
            Condition::Not(Box::new(cmp(ident("d"), CompOp::Eq, 0.0))),
        ]);
        assert_eq!(
            condition.to_string(),
            "a > 1 AND (b != 2 OR c <= -3.5) AND NOT (d = 0)"
        );
    }

    #[test]
    fn test_display_arithmetic() {
        let operand = Operand::Binary {
            op: ArithOp::Mul,
            left: Box::new(Operand::Paren(Box::new(Operand::Binary {
                op: ArithOp::Add,
                left: Box::new(ident("a")),
                right: Box::new(Operand::Number(2.0)),
            }))),
            right: Box::new(Operand::FunctionRef {
                name: "avg".to_string(),
                args: vec!["x".to_string()],
            }),
        };
        assert_eq!(operand.to_string(), "(a + 2) * avg(x)");
    }

    #[test]
    fn test_serde_shape() {
        let condition = cmp(ident("a"), CompOp::Gte, 5.0);
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "comparison": {
                    "left": { "identifier": "a" },
                    "op": "gte",
                    "right": { "number": 5.0 }
                }
            })
        );
        let back: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(back, condition);
    }
}
