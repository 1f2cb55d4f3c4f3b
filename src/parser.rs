//! HAVING 表达式的语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse()
//!   └─ parse_query()
//!        ├─ parse_or_expression()
//!        │    └─ parse_and_expression()          遇到 OR 时继续解析右侧
//!        │         └─ parse_primary_expression()  遇到 AND 时继续解析右侧
//!        │              ├─ "NOT" → 期望 '(' → parse_or_expression() → 期望 ')'
//!        │              ├─ "(" 且括号内含比较/逻辑运算 → 条件分组
//!        │              └─ 其他 → parse_comparison()
//!        │                         ├─ parse_operand()
//!        │                         ├─ parse_comparison_operator()
//!        │                         └─ parse_operand()
//!        │                              └─ parse_term()        ('+' | '-')
//!        │                                   └─ parse_factor() ('*' | '/' | '%')
//!        │                                        ├─ "(" → 算术分组
//!        │                                        └─ parse_atom()
//!        │                                             ├─ IDENTIFIER '(' 参数 ')' → 函数引用
//!        │                                             ├─ IDENTIFIER
//!        │                                             └─ NUMBER
//!        └─ 期望输入结束
//! ```
//!
//! ## 语法优先级（从低到高）
//!
//! 1. **OR**
//! 2. **AND**
//! 3. **比较操作** `=`, `!=`, `<>`, `<`, `<=`, `>`, `>=`
//! 4. **加减** `+`, `-`
//! 5. **乘除取余** `*`, `/`, `%`
//!
//! `NOT` 只能作用于括号分组，`NOT a = 1` 是语法错误。
//! 带引号的文本和 `true`/`false` 可以被词法分析，但没有任何语法规则接受它们。
//!
//! ## 嵌套深度
//!
//! 括号分组、`NOT (`、以及每个算术运算符都会让语法树加深一层。
//! 深度超过 [`MAX_NESTING_DEPTH`] 时返回语法错误，求值和渲染的递归因此有上界。
//!
//! ## 解析示例
//!
//! ```text
//! count(errors) > 10 AND avg(latency_ms) >= 500
//! NOT (status_code = 200) OR error_rate * 100 > 5
//! (sum(bytes) + sum(overhead)) / count() <= 1024
//! ```

use crate::ast::{ArithOp, CompOp, Condition, Operand};
use crate::error::SyntaxError;
use crate::token::{Token, TokenKind};

/// 语法树允许的最大嵌套层数
pub const MAX_NESTING_DEPTH: usize = 256;

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    /// 当前所在的嵌套层数
    depth: usize,
}

/// 解析以 `Eof` 结尾的 token 序列，参见 [`crate::lexer::tokenize`]
pub fn parse(tokens: &[Token<'_>]) -> Result<Condition, SyntaxError> {
    Parser::new(tokens).parse()
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self { tokens, position: 0, depth: 0 }
    }

    /// 返回当前 token，不推进位置；缺少 `Eof` 的序列在末尾返回 `None`
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position)
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    fn at_end(&self) -> bool {
        self.peek().map_or(true, |t| t.kind == TokenKind::Eof)
    }

    /// 推进位置一个 token
    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    /// 在当前位置构造语法错误
    fn error(&self, expected: impl Into<String>) -> SyntaxError {
        let (position, found) = match self.peek() {
            Some(token) if token.kind != TokenKind::Eof => {
                (token.position(), format!("'{}'", token.text))
            }
            Some(token) => (token.position(), "end of input".to_string()),
            None => (
                self.tokens.last().map_or(0, |t| t.span.end),
                "end of input".to_string(),
            ),
        };
        SyntaxError { position, expected: expected.into(), found }
    }

    /// 期望特定类型的 token 并推进，否则返回错误
    fn expect(&mut self, expected: TokenKind) -> Result<(), SyntaxError> {
        if self.at(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(expected.describe()))
        }
    }

    /// 进入一层嵌套，超过上限时在当前 token 处报错
    fn enter(&mut self) -> Result<(), SyntaxError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(format!("at most {} levels of nesting", MAX_NESTING_DEPTH)));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    pub fn parse(&mut self) -> Result<Condition, SyntaxError> {
        self.parse_query()
    }

    /// 语法: `expression EOF`
    fn parse_query(&mut self) -> Result<Condition, SyntaxError> {
        if self.at_end() {
            return Err(self.error("expression"));
        }
        let condition = self.parse_or_expression()?;
        if !self.at_end() {
            return Err(self.error("AND, OR or end of input"));
        }
        Ok(condition)
    }

    /// 解析OR表达式 (最低优先级)
    ///
    /// 语法: `and_expr (OR and_expr)*`
    /// 多个操作数展平为一个列表，单个操作数直接返回
    fn parse_or_expression(&mut self) -> Result<Condition, SyntaxError> {
        let mut children = vec![self.parse_and_expression()?];

        while self.at(&TokenKind::Or) {
            self.advance(); // 消费 OR
            children.push(self.parse_and_expression()?);
        }

        Ok(collapse(children, Condition::Or))
    }

    /// 解析AND表达式
    ///
    /// 语法: `primary (AND primary)*`
    fn parse_and_expression(&mut self) -> Result<Condition, SyntaxError> {
        let mut children = vec![self.parse_primary_expression()?];

        while self.at(&TokenKind::And) {
            self.advance(); // 消费 AND
            children.push(self.parse_primary_expression()?);
        }

        Ok(collapse(children, Condition::And))
    }

    /// 解析基础条件
    ///
    /// 语法: `NOT? '(' or_expr ')' | comparison`
    fn parse_primary_expression(&mut self) -> Result<Condition, SyntaxError> {
        if self.at(&TokenKind::Not) {
            self.enter()?;
            self.advance(); // 消费 NOT
            self.expect(TokenKind::LParen)?;
            let inner = self.parse_or_expression()?;
            self.expect(TokenKind::RParen)?;
            self.leave(1);
            return Ok(Condition::Not(Box::new(inner)));
        }

        if self.at(&TokenKind::LParen) && self.paren_encloses_condition() {
            self.enter()?;
            self.advance(); // 消费 (
            let inner = self.parse_or_expression()?;
            self.expect(TokenKind::RParen)?;
            self.leave(1);
            return Ok(inner);
        }

        self.parse_comparison()
    }

    /// 判断当前 '(' 开始的分组是条件还是算术表达式
    ///
    /// 算术括号内不可能出现比较运算符或逻辑关键字，所以扫描到匹配的 ')'
    /// 为止，只要出现其中之一就是条件分组
    fn paren_encloses_condition(&self) -> bool {
        let mut depth = 0usize;
        for token in &self.tokens[self.position..] {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return false;
                    }
                }
                TokenKind::And | TokenKind::Or | TokenKind::Not => return true,
                ref kind if kind.is_comparison_operator() => return true,
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    /// 语法: `operand comp_op operand`
    fn parse_comparison(&mut self) -> Result<Condition, SyntaxError> {
        let left = self.parse_operand()?;
        let op = self.parse_comparison_operator()?;
        let right = self.parse_operand()?;
        Ok(Condition::Comparison { left, op, right })
    }

    fn parse_comparison_operator(&mut self) -> Result<CompOp, SyntaxError> {
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Eq) => CompOp::Eq,
            Some(TokenKind::NeqBang) | Some(TokenKind::NeqAngle) => CompOp::NotEq,
            Some(TokenKind::Lt) => CompOp::Lt,
            Some(TokenKind::Le) => CompOp::Lte,
            Some(TokenKind::Gt) => CompOp::Gt,
            Some(TokenKind::Ge) => CompOp::Gte,
            _ => return Err(self.error("comparison operator")),
        };
        self.advance();
        Ok(op)
    }

    /// 加减 (左结合)
    ///
    /// 语法: `term (('+'|'-') term)*`
    /// 左结合的运算链每多一个运算符，左侧子树就深一层
    fn parse_operand(&mut self) -> Result<Operand, SyntaxError> {
        let mut left = self.parse_term()?;
        let mut levels = 0;

        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => ArithOp::Add,
                Some(TokenKind::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.enter()?;
            levels += 1;
            self.advance();
            let right = self.parse_term()?;
            left = Operand::Binary { op, left: Box::new(left), right: Box::new(right) };
        }

        self.leave(levels);
        Ok(left)
    }

    /// 乘除取余 (左结合)
    ///
    /// 语法: `factor (('*'|'/'|'%') factor)*`
    fn parse_term(&mut self) -> Result<Operand, SyntaxError> {
        let mut left = self.parse_factor()?;
        let mut levels = 0;

        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Star) => ArithOp::Mul,
                Some(TokenKind::Slash) => ArithOp::Div,
                Some(TokenKind::Percent) => ArithOp::Rem,
                _ => break,
            };
            self.enter()?;
            levels += 1;
            self.advance();
            let right = self.parse_factor()?;
            left = Operand::Binary { op, left: Box::new(left), right: Box::new(right) };
        }

        self.leave(levels);
        Ok(left)
    }

    /// 语法: `'(' operand ')' | atom`
    fn parse_factor(&mut self) -> Result<Operand, SyntaxError> {
        if self.at(&TokenKind::LParen) {
            self.enter()?;
            self.advance(); // 消费 (
            let inner = self.parse_operand()?;
            self.expect(TokenKind::RParen)?;
            self.leave(1);
            return Ok(Operand::Paren(Box::new(inner)));
        }
        self.parse_atom()
    }

    /// 语法: `IDENTIFIER '(' args? ')' | IDENTIFIER | NUMBER`
    fn parse_atom(&mut self) -> Result<Operand, SyntaxError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Identifier(name)) => {
                let name = name.to_string();
                self.advance();
                if self.at(&TokenKind::LParen) {
                    self.advance(); // 消费 (
                    let args = self.parse_function_args()?;
                    self.expect(TokenKind::RParen)?;
                    Ok(Operand::FunctionRef { name, args })
                } else {
                    Ok(Operand::Identifier(name))
                }
            }
            Some(TokenKind::Number(value)) => {
                let value = *value;
                self.advance();
                Ok(Operand::Number(value))
            }
            _ => Err(self.error("identifier, number or '('")),
        }
    }

    /// 解析逗号分隔的参数列表，参数只能是裸标识符
    fn parse_function_args(&mut self) -> Result<Vec<String>, SyntaxError> {
        let mut args = Vec::new();
        if self.at(&TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Identifier(arg)) => {
                    args.push(arg.to_string());
                    self.advance();
                }
                _ => return Err(self.error("identifier")),
            }
            if !self.at(&TokenKind::Comma) {
                break;
            }
            self.advance(); // 消费 ,
        }

        Ok(args)
    }
}

/// 单个子节点时直接返回该子节点
fn collapse(mut children: Vec<Condition>, wrap: fn(Vec<Condition>) -> Condition) -> Condition {
    if children.len() == 1 {
        if let Some(only) = children.pop() {
            return only;
        }
    }
    wrap(children)
}
