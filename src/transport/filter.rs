//! Capture filter expressions.
//!
//! Only the subset the codecs need is understood: `arp`, `rarp`, `ip`,
//! `ip6` and `ether proto <n>`, joined with `or`. An empty expression
//! matches everything.

use std::fmt;

use crate::error::{Error, Result};
use crate::protocol::ethertype;

/// Compiled capture filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFilter {
    expr: String,
    /// Accepted ethertypes. Empty means accept all.
    accept: Vec<u16>,
}

impl CaptureFilter {
    /// Filter that accepts every capture.
    pub fn any() -> Self {
        Self {
            expr: String::new(),
            accept: Vec::new(),
        }
    }

    /// Compile a filter expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(Self::any());
        }

        let mut accept = Vec::new();
        for term in expr.split(" or ") {
            let words: Vec<&str> = term.split_whitespace().collect();
            let proto = match words.as_slice() {
                ["arp"] => ethertype::ARP,
                ["rarp"] => ethertype::RARP,
                ["ip"] => ethertype::IPV4,
                ["ip6"] => ethertype::IPV6,
                ["ether", "proto", n] => parse_proto(n)
                    .ok_or_else(|| Error::Filter(format!("bad protocol '{}' in '{}'", n, expr)))?,
                _ => {
                    return Err(Error::Filter(format!(
                        "can't parse '{}' in '{}'",
                        term.trim(),
                        expr
                    )))
                }
            };
            if !accept.contains(&proto) {
                accept.push(proto);
            }
        }

        Ok(Self {
            expr: expr.to_string(),
            accept,
        })
    }

    /// Whether a capture with this ethertype passes.
    ///
    /// Captures whose ethertype cannot be determined only pass the empty
    /// filter.
    pub fn matches(&self, ethertype: Option<u16>) -> bool {
        if self.accept.is_empty() {
            return true;
        }
        ethertype.is_some_and(|t| self.accept.contains(&t))
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }
}

impl fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

fn parse_proto(word: &str) -> Option<u16> {
    match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => word.parse().ok(),
    }
}
