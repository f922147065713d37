//! f-string template splitting and the format mini-language.
//!
//! f-strings are lexed as a single token holding the raw template. At
//! evaluation time the template is split into literal fragments and
//! interpolation fields; each field's expression source is re-lexed and
//! re-parsed on demand by the evaluator. The same format-spec engine backs
//! the `format()` builtin and `str.format`.

use crate::{
    exc::PyExc,
    lex::decode_escapes,
    value::{Value, format_float},
};

/// One piece of a split f-string template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FPart {
    Literal(String),
    Field {
        /// The expression source text between the braces.
        expr: String,
        /// `!r` or `!s` conversion flag.
        conversion: Option<char>,
        /// Text after `:`, applied through [`format_value`].
        spec: Option<String>,
    },
}

/// Splits an f-string template into literal and field parts.
///
/// `{{` and `}}` are brace escapes. Escape sequences in literal fragments are
/// decoded unless the string was raw.
pub(crate) fn split_fstring(template: &str, raw: bool) -> Result<Vec<FPart>, PyExc> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    literal.push('{');
                    continue;
                }
                if !literal.is_empty() {
                    parts.push(FPart::Literal(finish_literal(&literal, raw)?));
                    literal.clear();
                }
                // Collect the field up to the matching close brace, tracking
                // nesting from subscripts, calls, and nested displays.
                let mut depth = 0u32;
                let mut field = String::new();
                let mut in_string: Option<char> = None;
                loop {
                    let Some(fc) = chars.next() else {
                        return Err(PyExc::new(
                            crate::exc::ExcType::SyntaxError,
                            "f-string: expecting '}'",
                        ));
                    };
                    if let Some(quote) = in_string {
                        field.push(fc);
                        if fc == quote {
                            in_string = None;
                        }
                        continue;
                    }
                    match fc {
                        '\'' | '"' => {
                            in_string = Some(fc);
                            field.push(fc);
                        }
                        '{' | '[' | '(' => {
                            depth += 1;
                            field.push(fc);
                        }
                        ']' | ')' => {
                            depth = depth.saturating_sub(1);
                            field.push(fc);
                        }
                        '}' if depth == 0 => break,
                        '}' => {
                            depth -= 1;
                            field.push(fc);
                        }
                        _ => field.push(fc),
                    }
                }
                parts.push(parse_field(&field)?);
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    literal.push('}');
                } else {
                    return Err(PyExc::new(
                        crate::exc::ExcType::SyntaxError,
                        "f-string: single '}' is not allowed",
                    ));
                }
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push(FPart::Literal(finish_literal(&literal, raw)?));
    }
    Ok(parts)
}

fn finish_literal(text: &str, raw: bool) -> Result<String, PyExc> {
    if raw {
        Ok(text.to_string())
    } else {
        decode_escapes(text).map_err(|m| PyExc::new(crate::exc::ExcType::SyntaxError, m))
    }
}

/// Splits a field body into expression, conversion, and format spec.
fn parse_field(field: &str) -> Result<FPart, PyExc> {
    // The format-spec separator is the first top-level `:`; a conversion
    // flag `!r` or `!s` sits immediately before it (or at the end).
    let mut depth = 0u32;
    let mut in_string: Option<char> = None;
    let mut colon = None;
    for (i, c) in field.char_indices() {
        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => {
                colon = Some(i);
                break;
            }
            _ => {}
        }
    }
    let (head, spec) = match colon {
        Some(i) => (&field[..i], Some(field[i + 1..].to_string())),
        None => (field, None),
    };
    let (expr, conversion) = if let Some(stripped) = head.strip_suffix("!r") {
        (stripped, Some('r'))
    } else if let Some(stripped) = head.strip_suffix("!s") {
        (stripped, Some('s'))
    } else {
        (head, None)
    };
    // An empty expression is legal for `str.format` (`{}`); the f-string
    // evaluator rejects it at interpolation time.
    let expr = expr.trim();
    Ok(FPart::Field {
        expr: expr.to_string(),
        conversion,
        spec,
    })
}

/// Applies a format spec to a value: `[[fill]align][sign][0][width][,][.precision][type]`.
pub(crate) fn format_value(value: &Value, spec: &str) -> Result<String, PyExc> {
    if spec.is_empty() {
        return Ok(value.py_str());
    }
    let spec = FormatSpec::parse(spec)?;
    spec.apply(value)
}

#[derive(Debug, Default)]
struct FormatSpec {
    fill: char,
    align: Option<char>,
    sign: Option<char>,
    zero_pad: bool,
    width: Option<usize>,
    thousands: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Result<Self, PyExc> {
        let mut out = Self {
            fill: ' ',
            ..Self::default()
        };
        let chars: Vec<char> = spec.chars().collect();
        let mut i = 0;
        // [[fill]align]
        if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
            out.fill = chars[0];
            out.align = Some(chars[1]);
            i = 2;
        } else if !chars.is_empty() && matches!(chars[0], '<' | '>' | '^') {
            out.align = Some(chars[0]);
            i = 1;
        }
        if i < chars.len() && matches!(chars[i], '+' | '-' | ' ') {
            out.sign = Some(chars[i]);
            i += 1;
        }
        if i < chars.len() && chars[i] == '0' {
            out.zero_pad = true;
            i += 1;
        }
        let mut width = String::new();
        while i < chars.len() && chars[i].is_ascii_digit() {
            width.push(chars[i]);
            i += 1;
        }
        if !width.is_empty() {
            out.width = width.parse().ok();
        }
        if i < chars.len() && chars[i] == ',' {
            out.thousands = true;
            i += 1;
        }
        if i < chars.len() && chars[i] == '.' {
            i += 1;
            let mut precision = String::new();
            while i < chars.len() && chars[i].is_ascii_digit() {
                precision.push(chars[i]);
                i += 1;
            }
            out.precision = Some(precision.parse().map_err(|_| {
                PyExc::value_error("Format specifier missing precision")
            })?);
        }
        if i < chars.len() {
            out.kind = Some(chars[i]);
            i += 1;
        }
        if i != chars.len() {
            return Err(PyExc::value_error(format!("Invalid format specifier '{spec}'")));
        }
        Ok(out)
    }

    fn apply(&self, value: &Value) -> Result<String, PyExc> {
        let body = self.render(value)?;
        Ok(self.pad(&body, value))
    }

    fn render(&self, value: &Value) -> Result<String, PyExc> {
        let kind = self.kind.unwrap_or(match value {
            Value::Float(_) => if self.precision.is_some() { 'f' } else { '\0' },
            _ => '\0',
        });
        let text = match kind {
            'd' => {
                let n = value.as_index("format value")?;
                let base = n.unsigned_abs().to_string();
                let base = if self.thousands { group_thousands(&base) } else { base };
                self.signed(n < 0, base)
            }
            'f' | 'F' => {
                let f = float_of(value)?;
                let precision = self.precision.unwrap_or(6);
                let base = format!("{:.*}", precision, f.abs());
                let base = if self.thousands { group_float(&base) } else { base };
                self.signed(f.is_sign_negative() && f != 0.0, base)
            }
            'e' | 'E' => {
                let f = float_of(value)?;
                let precision = self.precision.unwrap_or(6);
                let mut s = format!("{:.*e}", precision, f.abs());
                // Rust writes `1.5e2`; Python writes `1.5e+02`.
                if let Some(pos) = s.find('e') {
                    let exp: i32 = s[pos + 1..].parse().unwrap_or(0);
                    s.truncate(pos);
                    if exp < 0 {
                        s.push_str(&format!("e-{:02}", -exp));
                    } else {
                        s.push_str(&format!("e+{exp:02}"));
                    }
                }
                let s = if kind == 'E' { s.to_uppercase() } else { s };
                self.signed(f.is_sign_negative(), s)
            }
            'g' => {
                let f = float_of(value)?;
                self.signed(f.is_sign_negative(), format_float(f.abs()))
            }
            '%' => {
                let f = float_of(value)?;
                let precision = self.precision.unwrap_or(6);
                let base = format!("{:.*}%", precision, (f * 100.0).abs());
                self.signed(f < 0.0, base)
            }
            'x' => {
                let n = value.as_index("format value")?;
                self.signed(n < 0, format!("{:x}", n.unsigned_abs()))
            }
            'X' => {
                let n = value.as_index("format value")?;
                self.signed(n < 0, format!("{:X}", n.unsigned_abs()))
            }
            'o' => {
                let n = value.as_index("format value")?;
                self.signed(n < 0, format!("{:o}", n.unsigned_abs()))
            }
            'b' => {
                let n = value.as_index("format value")?;
                self.signed(n < 0, format!("{:b}", n.unsigned_abs()))
            }
            's' => {
                let mut s = value.py_str();
                if let Some(p) = self.precision {
                    s.truncate(s.chars().take(p).map(char::len_utf8).sum());
                }
                s
            }
            '\0' => match value {
                Value::Int(n) => {
                    let base = n.magnitude().to_string();
                    let base = if self.thousands { group_thousands(&base) } else { base };
                    self.signed(n.sign() == num_bigint::Sign::Minus, base)
                }
                Value::Float(f) => self.signed(f.is_sign_negative() && *f != 0.0, format_float(f.abs())),
                other => {
                    let mut s = other.py_str();
                    if let Some(p) = self.precision {
                        s.truncate(s.chars().take(p).map(char::len_utf8).sum());
                    }
                    s
                }
            },
            other => {
                return Err(PyExc::value_error(format!(
                    "Unknown format code '{other}' for object of type '{}'",
                    value.type_name()
                )));
            }
        };
        Ok(text)
    }

    fn signed(&self, negative: bool, body: String) -> String {
        if negative {
            format!("-{body}")
        } else {
            match self.sign {
                Some('+') => format!("+{body}"),
                Some(' ') => format!(" {body}"),
                _ => body,
            }
        }
    }

    fn pad(&self, body: &str, value: &Value) -> String {
        let Some(width) = self.width else {
            return body.to_string();
        };
        let len = body.chars().count();
        if len >= width {
            return body.to_string();
        }
        let missing = width - len;
        let numeric = !matches!(value, Value::Str(_));
        if self.zero_pad && self.align.is_none() && numeric {
            // Zero padding goes between the sign and the digits.
            let (sign, digits) = match body.chars().next() {
                Some(c @ ('-' | '+' | ' ')) => (Some(c), &body[c.len_utf8()..]),
                _ => (None, body),
            };
            let mut out = String::new();
            if let Some(s) = sign {
                out.push(s);
            }
            out.push_str(&"0".repeat(missing));
            out.push_str(digits);
            return out;
        }
        let align = self.align.unwrap_or(if numeric { '>' } else { '<' });
        let fill: String = self.fill.to_string();
        match align {
            '>' => format!("{}{}", fill.repeat(missing), body),
            '^' => {
                let left = missing / 2;
                format!("{}{}{}", fill.repeat(left), body, fill.repeat(missing - left))
            }
            _ => format!("{}{}", body, fill.repeat(missing)),
        }
    }
}

fn float_of(value: &Value) -> Result<f64, PyExc> {
    match value {
        Value::Bool(b) => Ok(f64::from(i8::from(*b))),
        Value::Int(n) => Ok(num_traits::ToPrimitive::to_f64(n).unwrap_or(f64::INFINITY)),
        Value::Float(f) => Ok(*f),
        other => Err(PyExc::value_error(format!(
            "Unknown format code 'f' for object of type '{}'",
            other.type_name()
        ))),
    }
}

fn group_thousands(digits: &str) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*c);
    }
    out
}

fn group_float(text: &str) -> String {
    match text.split_once('.') {
        Some((int_part, frac)) => format!("{}.{frac}", group_thousands(int_part)),
        None => group_thousands(text),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn split_basic() {
        let parts = split_fstring("x={x} and y={y!r}", false).unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], FPart::Literal("x=".to_string()));
        assert_eq!(
            parts[1],
            FPart::Field {
                expr: "x".to_string(),
                conversion: None,
                spec: None
            }
        );
        assert_eq!(
            parts[3],
            FPart::Field {
                expr: "y".to_string(),
                conversion: Some('r'),
                spec: None
            }
        );
    }

    #[test]
    fn brace_escapes() {
        let parts = split_fstring("{{literal}} {v}", false).unwrap();
        assert_eq!(parts[0], FPart::Literal("{literal} ".to_string()));
    }

    #[test]
    fn nested_subscript_in_field() {
        let parts = split_fstring("{d['key']}", false).unwrap();
        assert_eq!(
            parts[0],
            FPart::Field {
                expr: "d['key']".to_string(),
                conversion: None,
                spec: None
            }
        );
    }

    #[test]
    fn spec_extraction() {
        let parts = split_fstring("{total:.2f}", false).unwrap();
        assert_eq!(
            parts[0],
            FPart::Field {
                expr: "total".to_string(),
                conversion: None,
                spec: Some(".2f".to_string())
            }
        );
        // A colon inside a subscript is not a spec separator.
        let parts = split_fstring("{d[1:2]}", false).unwrap();
        assert_eq!(
            parts[0],
            FPart::Field {
                expr: "d[1:2]".to_string(),
                conversion: None,
                spec: None
            }
        );
    }

    #[test]
    fn unterminated_field_errors() {
        assert!(split_fstring("{x", false).is_err());
        assert!(split_fstring("}", false).is_err());
    }

    #[test]
    fn format_floats() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Float(0.5), ".0%").unwrap(), "50%");
        assert_eq!(format_value(&Value::Float(-2.5), "+.1f").unwrap(), "-2.5");
        assert_eq!(format_value(&Value::Float(2.5), "+.1f").unwrap(), "+2.5");
        assert_eq!(format_value(&Value::Float(1234.5), ",.1f").unwrap(), "1,234.5");
    }

    #[test]
    fn format_ints() {
        assert_eq!(format_value(&Value::int(42), "05d").unwrap(), "00042");
        assert_eq!(format_value(&Value::int(-42), "05d").unwrap(), "-0042");
        assert_eq!(format_value(&Value::int(255), "x").unwrap(), "ff");
        assert_eq!(format_value(&Value::int(255), "X").unwrap(), "FF");
        assert_eq!(format_value(&Value::int(5), "b").unwrap(), "101");
        assert_eq!(format_value(&Value::int(1_234_567), ",").unwrap(), "1,234,567");
    }

    #[test]
    fn format_alignment() {
        assert_eq!(format_value(&Value::str("ab"), "5").unwrap(), "ab   ");
        assert_eq!(format_value(&Value::str("ab"), ">5").unwrap(), "   ab");
        assert_eq!(format_value(&Value::str("ab"), "^6").unwrap(), "  ab  ");
        assert_eq!(format_value(&Value::str("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_value(&Value::int(7), "3d").unwrap(), "  7");
    }

    #[test]
    fn scientific_matches_python() {
        assert_eq!(format_value(&Value::Float(1234.5), ".2e").unwrap(), "1.23e+03");
        assert_eq!(format_value(&Value::Float(0.00015), ".1e").unwrap(), "1.5e-04");
    }
}
