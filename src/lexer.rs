//! 查询参数串的词法分析器
//!
//! 键部分按 `[`、`]`、`=`、`&` 切分（`%5B`/`%5D` 视同方括号），
//! `=` 之后直到下一个 `&` 的内容整体作为一个值 token。

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
    /// 刚消费了 `=`，下一个 token 是值
    in_value: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            position: 0,
            in_value: false,
        }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 当前位置是否为编码后的方括号，返回对应的 token 类型
    fn encoded_bracket(&self) -> Option<TokenKind<'a>> {
        let rest = self.input.get(self.position..self.position + 3)?;
        if rest.eq_ignore_ascii_case("%5B") {
            Some(TokenKind::LBracket)
        } else if rest.eq_ignore_ascii_case("%5D") {
            Some(TokenKind::RBracket)
        } else {
            None
        }
    }

    /// 读取值：直到 `&` 或输入结束，可以为空
    fn read_value(&mut self) -> Token<'a> {
        let start = self.position;
        while let Some(c) = self.peek() {
            if c == '&' {
                break;
            }
            self.bump();
        }
        Token {
            kind: TokenKind::Value(&self.input[start..self.position]),
            span: Span::new(start, self.position),
        }
    }

    /// 读取键片段
    fn read_word(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if matches!(c, '[' | ']' | '=' | '&') || self.encoded_bracket().is_some() {
                break;
            }
            self.bump();
        }
        Token {
            kind: TokenKind::Word(&self.input[start..self.position]),
            span: Span::new(start, self.position),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.in_value {
            self.in_value = false;
            return Some(self.read_value());
        }

        let start = self.position;
        if let Some(kind) = self.encoded_bracket() {
            self.position += 3;
            return Some(Token {
                kind,
                span: Span::new(start, self.position),
            });
        }

        let c = self.peek()?; // 到达输入末尾

        let token = match c {
            '[' | ']' | '=' | '&' => {
                self.bump();
                let kind = match c {
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '=' => {
                        self.in_value = true;
                        TokenKind::Eq
                    }
                    _ => TokenKind::Amp,
                };
                Token {
                    kind,
                    span: Span::new(start, self.position),
                }
            }
            _ => self.read_word(start),
        };
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(input).map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_pair() {
        assert_eq!(
            kinds("status_id=o"),
            vec![TokenKind::Word("status_id"), TokenKind::Eq, TokenKind::Value("o")]
        );
    }

    #[test]
    fn test_subscripts_and_pairs() {
        assert_eq!(
            kinds("f[]=status_id&op[status_id]=%3D"),
            vec![
                TokenKind::Word("f"),
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Eq,
                TokenKind::Value("status_id"),
                TokenKind::Amp,
                TokenKind::Word("op"),
                TokenKind::LBracket,
                TokenKind::Word("status_id"),
                TokenKind::RBracket,
                TokenKind::Eq,
                TokenKind::Value("%3D"),
            ]
        );
    }

    #[test]
    fn test_encoded_brackets() {
        assert_eq!(
            kinds("v%5bcf_1%5D%5B%5D=x"),
            vec![
                TokenKind::Word("v"),
                TokenKind::LBracket,
                TokenKind::Word("cf_1"),
                TokenKind::RBracket,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Eq,
                TokenKind::Value("x"),
            ]
        );
    }

    #[test]
    fn test_value_keeps_brackets_and_equals() {
        assert_eq!(
            kinds("subject=a[b]=c&x"),
            vec![
                TokenKind::Word("subject"),
                TokenKind::Eq,
                TokenKind::Value("a[b]=c"),
                TokenKind::Amp,
                TokenKind::Word("x"),
            ]
        );
    }

    #[test]
    fn test_empty_value_at_end() {
        assert_eq!(
            kinds("f[]="),
            vec![
                TokenKind::Word("f"),
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Eq,
                TokenKind::Value(""),
            ]
        );
    }

    #[test]
    fn test_spans() {
        let tokens: Vec<_> = Lexer::new("ab=cd").collect();
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[1].span, Span::new(2, 3));
        assert_eq!(tokens[2].span, Span::new(3, 5));
    }
}
