//! Rendering values into the context's shared transient buffer.

use std::fmt::Write;

use crate::context::Context;
use crate::value::{CellRef, Kind};

/// Size of the shared format buffer, in bytes.
pub(crate) const FORMAT_LEN: usize = 64;

impl Context {
    /// Format `v` into the shared buffer. The returned slice is overwritten
    /// by the next call, so hosts must consume it immediately.
    pub fn format(&mut self, v: CellRef) -> &str {
        self.render(v);
        &self.format_buf
    }

    pub(crate) fn render(&mut self, v: CellRef) {
        self.format_buf.clear();
        match self.kind(v) {
            Kind::Number(n) => render_number(&mut self.format_buf, n),
            Kind::Str(span) => {
                let s = self.text.slice(span);
                let mut cut = s.len().min(FORMAT_LEN - 1);
                while !s.is_char_boundary(cut) {
                    cut -= 1;
                }
                self.format_buf.push_str(&s[..cut]);
            }
            kind => self.format_buf.push_str(kind.tag_name()),
        }
    }

    pub(crate) fn print_value(&mut self, v: CellRef) {
        self.render(v);
        (self.printer)(&self.format_buf);
    }

    pub(crate) fn print_str(&mut self, s: &str) {
        (self.printer)(s);
    }
}

/// Decimal rendering: integer part, then at most six fractional digits when
/// the fraction's magnitude exceeds 1e-5. Digits come from repeated
/// multiply-by-ten, so `3.0` renders as `3` and one-third as `0.333333`.
fn render_number(out: &mut String, n: f64) {
    if n < 0.0 {
        out.push('-');
    }
    let int_part = (n as i64).abs();
    let _ = write!(out, "{int_part}");

    let mut frac = (n - n.trunc()).abs();
    if frac > 0.00001 {
        out.push('.');
        let mut decimals = 0;
        while frac > 0.0 && decimals < 6 {
            frac *= 10.0;
            let digit = frac as i64;
            frac -= digit as f64;
            out.push((b'0' + digit as u8) as char);
            decimals += 1;
        }
    }
}
