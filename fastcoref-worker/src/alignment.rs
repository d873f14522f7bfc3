//! Token 与字符偏移对齐
//!
//! 模型以 token 下标区间给出 mention，对外接口使用字符偏移。
//! 字符偏移按 Unicode 标量值计数（与 Python `str` 下标一致），不是 UTF-8 字节。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 字符偏移区间：`start` 包含，`end` 不包含
///
/// 序列化为 `[start, end]`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl From<(usize, usize)> for CharSpan {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl From<CharSpan> for (usize, usize) {
    fn from(span: CharSpan) -> Self {
        (span.start, span.end)
    }
}

/// token 下标区间，两端都包含（模型原生格式）
///
/// 序列化为 `[start_token, end_token]`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

impl TokenSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl From<(usize, usize)> for TokenSpan {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl From<TokenSpan> for (usize, usize) {
    fn from(span: TokenSpan) -> Self {
        (span.start, span.end)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("token span [{start}, {end}] is inverted")]
    InvertedSpan { start: usize, end: usize },
    #[error("token index {index} is out of range ({token_count} tokens)")]
    TokenOutOfRange { index: usize, token_count: usize },
    #[error("char span ({start}, {end}) is not a valid mention in a text of {char_len} chars")]
    InvalidCharSpan {
        start: usize,
        end: usize,
        char_len: usize,
    },
}

/// 单条文本的字符索引（字符偏移 -> 字节偏移）
pub struct CharIndex<'a> {
    text: &'a str,
    // 长度为字符数 + 1，最后一项是 text.len()
    byte_offsets: Vec<usize>,
}

impl<'a> CharIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        byte_offsets.push(text.len());
        Self { text, byte_offsets }
    }

    /// 文本的字符数
    pub fn char_len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    /// 校验 mention 区间：`0 <= start < end <= char_len`
    pub fn check(&self, span: CharSpan) -> Result<CharSpan, AlignmentError> {
        if span.start >= span.end || span.end > self.char_len() {
            return Err(AlignmentError::InvalidCharSpan {
                start: span.start,
                end: span.end,
                char_len: self.char_len(),
            });
        }
        Ok(span)
    }

    /// 按字符偏移截取子串，区间非法时返回 None
    pub fn slice(&self, span: CharSpan) -> Option<&'a str> {
        self.check(span).ok()?;
        Some(&self.text[self.byte_offsets[span.start]..self.byte_offsets[span.end]])
    }

    /// 将 token 区间转换为字符区间，并返回对应的 mention 文本
    ///
    /// `tokens[i]` 是第 i 个 token 的字符区间；mention 从首 token 的起点到末 token 的终点。
    pub fn align(
        &self,
        tokens: &[CharSpan],
        span: TokenSpan,
    ) -> Result<(CharSpan, &'a str), AlignmentError> {
        if span.start > span.end {
            return Err(AlignmentError::InvertedSpan {
                start: span.start,
                end: span.end,
            });
        }
        let first = tokens.get(span.start).ok_or(AlignmentError::TokenOutOfRange {
            index: span.start,
            token_count: tokens.len(),
        })?;
        let last = tokens.get(span.end).ok_or(AlignmentError::TokenOutOfRange {
            index: span.end,
            token_count: tokens.len(),
        })?;

        let char_span = self.check(CharSpan::new(first.start, last.end))?;
        let surface = &self.text[self.byte_offsets[char_span.start]..self.byte_offsets[char_span.end]];
        Ok((char_span, surface))
    }
}

/// 简单的词级切分：连续的字母数字为一个 token，其余非空白字符各自成为一个 token
///
/// 只用于进程内模拟模型；真实模型的 token 对齐由 sidecar 返回。
pub fn word_tokens(text: &str) -> Vec<CharSpan> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    for (i, c) in text.chars().enumerate() {
        if c.is_alphanumeric() {
            if word_start.is_none() {
                word_start = Some(i);
            }
            continue;
        }
        if let Some(start) = word_start.take() {
            tokens.push(CharSpan::new(start, i));
        }
        if !c.is_whitespace() {
            tokens.push(CharSpan::new(i, i + 1));
        }
    }
    if let Some(start) = word_start {
        tokens.push(CharSpan::new(start, text.chars().count()));
    }

    tokens
}
