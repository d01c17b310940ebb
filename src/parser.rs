//! 查询参数串的语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse()
//!   └─ 循环直到输入结束
//!        ├─ "&" → 空参数，跳过
//!        └─ parse_param()
//!             ├─ 解析参数名 (Word)
//!             ├─ parse_subscripts()
//!             │    └─ 遇到 '[' 时：可选的 Word，期望 ']'
//!             ├─ 可选 '=' → 值 (Value)
//!             └─ 期望 '&' 或输入结束
//! ```
//!
//! ## 支持的语法结构
//!
//! ```text
//! set_filter=1
//! f[]=status_id
//! op[status_id]=o
//! v[cf_1][]=foo
//! status_id=o                 // 简写：操作符前缀 + 以 '|' 分隔的值
//! sort=priority:desc,id
//! group_by=tracker
//! c[]=subject&t[]=estimated_hours
//! ```
//!
//! 名称、下标与值都做百分号解码，`+` 解码为空格。

use std::borrow::Cow;

use thiserror::Error;

use crate::ast::{Param, ParamKey, QueryParams, Subscript};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self {
            message,
            span: Some(span),
        }
    }
}

/// 百分号解码，`+` 视为空格
fn decode(raw: &str, span: Span) -> Result<String, ParseError> {
    let raw: Cow<'_, str> = if raw.contains('+') {
        Cow::Owned(raw.replace('+', " "))
    } else {
        Cow::Borrowed(raw)
    };
    urlencoding::decode(&raw)
        .map(Cow::into_owned)
        .map_err(|e| ParseError::at_position(format!("Invalid percent-encoding: {e}"), span))
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// 期望特定类型的 token 并推进，否则返回错误
    fn expect(&mut self, expected: TokenKind<'_>) -> Result<&'a Token<'a>, ParseError> {
        match self.peek() {
            Some(token)
                if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) =>
            {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::at_position(
                format!("Expected {:?}, found {:?}", expected, token.kind),
                token.span,
            )),
            None => Err(ParseError::new(
                format!("Expected {:?}, but reached end of input", expected),
                None,
            )),
        }
    }

    /// 检查当前 token 是否匹配给定类型
    fn match_token(&self, kind: &TokenKind<'_>) -> bool {
        self.peek().is_some_and(|token| {
            std::mem::discriminant(&token.kind) == std::mem::discriminant(kind)
        })
    }

    pub fn parse(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Amp {
                self.advance(); // 空参数，如 "a=1&&b=2"
                continue;
            }
            params.push(self.parse_param()?);
            if let Some(token) = self.peek() {
                if token.kind != TokenKind::Amp {
                    return Err(ParseError::at_position(
                        format!("Expected '&', found {:?}", token.kind),
                        token.span,
                    ));
                }
            }
        }
        Ok(params)
    }

    fn parse_param(&mut self) -> Result<Param, ParseError> {
        let name_token = self.expect(TokenKind::Word(""))?;
        let TokenKind::Word(raw_name) = name_token.kind else {
            return Err(ParseError::at_position(
                "Expected parameter name".to_string(),
                name_token.span,
            ));
        };
        let name = decode(raw_name, name_token.span)?;
        let subscripts = self.parse_subscripts()?;

        let value = if self.match_token(&TokenKind::Eq) {
            self.advance(); // 消费 '='
            match self.advance() {
                Some(Token {
                    kind: TokenKind::Value(raw),
                    span,
                }) => decode(raw, *span)?,
                // 词法分析器总会在 '=' 之后产生值 token
                Some(token) => {
                    return Err(ParseError::at_position(
                        format!("Expected value, found {:?}", token.kind),
                        token.span,
                    ))
                }
                None => String::new(),
            }
        } else {
            String::new()
        };

        Ok(Param {
            key: ParamKey { name, subscripts },
            value,
        })
    }

    /// 解析零个或多个 `[...]` 下标
    fn parse_subscripts(&mut self) -> Result<Vec<Subscript>, ParseError> {
        let mut subscripts = Vec::new();
        while self.match_token(&TokenKind::LBracket) {
            self.advance(); // 消费 '['
            let subscript = match self.peek() {
                Some(Token {
                    kind: TokenKind::Word(raw),
                    span,
                }) => {
                    self.advance();
                    Subscript::Index(decode(raw, *span)?)
                }
                _ => Subscript::Push,
            };
            self.expect(TokenKind::RBracket)?;
            subscripts.push(subscript);
        }
        Ok(subscripts)
    }
}

/// 词法分析 + 语法分析 + 分组
pub fn parse_query_string(input: &str) -> Result<QueryParams, ParseError> {
    let input = input.strip_prefix('?').unwrap_or(input);
    let tokens: Vec<Token<'_>> = Lexer::new(input).collect();
    let params = Parser::new(&tokens).parse()?;
    Ok(QueryParams::from_params(params))
}
