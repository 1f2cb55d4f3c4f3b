//! HAVING 表达式编译与求值的错误类型

use thiserror::Error;

/// 词法错误：该字符不能开始任何 token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unexpected character {character:?} at position {position}")]
pub struct LexError {
    /// 出错字符的字节偏移
    pub position: usize,
    pub character: char,
}

/// 语法错误：当前位置的 token 不符合语法
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at position {position}: expected {expected}, found {found}")]
pub struct SyntaxError {
    pub position: usize,
    pub expected: String,
    pub found: String,
}

/// 编译错误，词法或语法错误之一
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl CompileError {
    pub fn position(&self) -> usize {
        match self {
            CompileError::Lex(e) => e.position,
            CompileError::Syntax(e) => e.position,
        }
    }

    /// 将错误与源文本一起渲染，在出错位置下方标出 `^`
    ///
    /// ```text
    /// a > 1 AND b ? 2
    ///             ^ unexpected character '?' at position 12
    /// ```
    pub fn render(&self, source: &str) -> String {
        let position = self.position().min(source.len());
        let column = source
            .get(..position)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(position);
        format!("{}\n{}^ {}", source, " ".repeat(column), self)
    }
}

/// 对单行求值时的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// 行中没有引用的键
    #[error("unresolved identifier: {name}")]
    UnresolvedIdentifier { name: String },

    /// `/` 或 `%` 的右操作数为零
    #[error("division by zero in '{operator}'")]
    DivisionByZero { operator: char },

    /// 行中有该键，但值不是数字
    #[error("value of {name} is not numeric")]
    NonNumericValue { name: String },
}

/// 求值结果类型
pub type EvalResult<T> = Result<T, EvalError>;
