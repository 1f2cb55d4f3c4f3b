//! HAVING 表达式语言的 token 定义

/// token 是语言的最小单元，包含类型和位置
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// 读取该 token 的源文本切片
    pub text: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind<'a>, text: &'a str, span: Span) -> Self {
        Self { kind, text, span }
    }

    /// token 第一个字符的字节偏移
    pub fn position(&self) -> usize {
        self.span.start
    }

    /// 解析转义后的引号文本内容，其他类型返回 `None`
    pub fn unescaped_text(&self) -> Option<String> {
        let TokenKind::QuotedText(raw) = self.kind else {
            return None;
        };
        let mut out = String::with_capacity(raw.len());
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else {
                out.push(c);
            }
        }
        Some(out)
    }
}

/// token 类型
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // 标点
    LParen, // (
    RParen, // )
    Comma,  // ,

    // 比较运算符
    Eq,       // =
    NeqBang,  // !=
    NeqAngle, // <>
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=

    // 算术运算符
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %

    // 关键字，不区分大小写
    Not,
    And,
    Or,
    Bool(bool),

    // 字面量
    Number(f64),
    /// 去掉两侧引号的文本，转义保持原样
    QuotedText(&'a str),
    Identifier(&'a str),

    Eof,
}

impl TokenKind<'_> {
    /// 用于语法错误信息的简短描述
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Comma => "','",
            TokenKind::Eq => "'='",
            TokenKind::NeqBang => "'!='",
            TokenKind::NeqAngle => "'<>'",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Not => "NOT",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Bool(_) => "boolean literal",
            TokenKind::Number(_) => "number",
            TokenKind::QuotedText(_) => "quoted text",
            TokenKind::Identifier(_) => "identifier",
            TokenKind::Eof => "end of input",
        }
    }

    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::NeqBang
                | TokenKind::NeqAngle
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge
        )
    }
}

/// 源文本中的区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// 起始字节偏移
    pub start: usize,
    /// 结束字节偏移
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
