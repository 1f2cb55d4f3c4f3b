//! HAVING 表达式的词法分析器

use crate::error::LexError;
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
    /// 遇到错误后不再产生 token
    failed: bool,
}

/// 将整个输入切分为 token 序列，末尾总是附加一个 `Eof`
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut tokens = Lexer::new(input).collect::<Result<Vec<_>, _>>()?;
    let end = input.len();
    tokens.push(Token::new(TokenKind::Eof, "", Span::new(end, end)));
    Ok(tokens)
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0, failed: false }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 返回下一个位置的字符，不推进位置
    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 跳过空白字符（空格、制表符、回车、换行）
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if matches!(c, ' ' | '\t' | '\r' | '\n') {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn make(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token::new(kind, &self.input[start..self.position], Span::new(start, self.position))
    }

    fn bump_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// 读取数字字面量：`[+-]? DIGIT+ ('.' DIGIT+)?`
    /// 注意：可选的符号（如果有）已经被调用者消费
    fn read_number(&mut self, start: usize, first: char) -> Result<Token<'a>, LexError> {
        self.bump_digits();
        // 小数点后必须紧跟数字，否则 '.' 留给下一次扫描（并报错）
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.bump_digits();
        }
        let text = &self.input[start..self.position];
        // 超出 f64 范围的字面量会变成无穷大，无法再渲染回数字，直接拒绝
        let value = text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or(LexError { position: start, character: first })?;
        Ok(self.make(TokenKind::Number(value), start))
    }

    /// 读取单引号或双引号包围的文本
    /// 反斜杠转义其后的任意字符（包括引号本身）
    /// 注意：开始的引号已经被调用者消费
    fn read_quoted(&mut self, start: usize, quote: char) -> Result<Token<'a>, LexError> {
        let content_start = self.position;
        loop {
            match self.bump() {
                Some('\\') => {
                    if self.bump().is_none() {
                        break;
                    }
                }
                Some(c) if c == quote => {
                    let content = &self.input[content_start..self.position - quote.len_utf8()];
                    return Ok(self.make(TokenKind::QuotedText(content), start));
                }
                Some(_) => {}
                None => break,
            }
        }
        // 未闭合的引号：错误定位在开始的引号上
        Err(LexError { position: start, character: quote })
    }

    /// 读取标识符或关键字
    /// 标识符只能包含 ASCII 字母、数字和下划线
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        self.make(match_keyword(literal), start)
    }

    fn scan(&mut self, start: usize, c: char) -> Result<Token<'a>, LexError> {
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '=' => TokenKind::Eq,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    TokenKind::Le
                }
                Some('>') => {
                    self.bump();
                    TokenKind::NeqAngle
                }
                _ => TokenKind::Lt,
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NeqBang
                } else {
                    return Err(LexError { position: start, character: c });
                }
            }
            // 符号紧跟数字时属于数字字面量本身（最长匹配）
            '+' | '-' if self.peek().is_some_and(|n| n.is_ascii_digit()) => {
                return self.read_number(start, c);
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '"' | '\'' => return self.read_quoted(start, c),
            c if c.is_ascii_digit() => return self.read_number(start, c),
            c if c.is_ascii_alphabetic() || c == '_' => return Ok(self.read_identifier(start)),
            _ => return Err(LexError { position: start, character: c }),
        };
        Ok(self.make(kind, start))
    }
}

fn match_keyword(s: &str) -> TokenKind<'_> {
    match s.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "true" => TokenKind::Bool(true),
        "false" => TokenKind::Bool(false),
        _ => TokenKind::Identifier(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.skip_whitespace();
        let start = self.position;

        let Some(c) = self.bump() else {
            return None; // 到达输入末尾
        };

        let result = self.scan(start, c);
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
