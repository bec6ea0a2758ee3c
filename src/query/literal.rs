//! Client-side parameter binding.
//!
//! The server has no prepared-statement protocol, so bound values are
//! rendered as SQL literals and spliced into the statement text in place of
//! `?` placeholders.

use crate::error::{FireboltError, FireboltErrorKind};

use chrono::{NaiveDate, NaiveDateTime};


/// Conversion of a Rust value into SQL literal text.
///
/// ```rust
/// use firebolt_driver::ToSqlLiteral;
///
/// assert_eq!(42i32.to_sql_literal(), "42");
/// assert_eq!("it's".to_sql_literal(), "'it''s'");
/// assert_eq!(None::<i64>.to_sql_literal(), "NULL");
/// ```
pub trait ToSqlLiteral {
    fn to_sql_literal(self) -> String;
}

/// Macro to implement ToSqlLiteral for types whose `Display` is already a valid literal.
macro_rules! impl_to_sql_literal {
    ($($ty:ty),*) => {
        $(
            impl ToSqlLiteral for $ty {
                fn to_sql_literal(self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_to_sql_literal!(i8, i16, i32, i64, u16, u32, u64, bool);

impl ToSqlLiteral for f32 {
    fn to_sql_literal(self) -> String {
        (self as f64).to_sql_literal()
    }
}

impl ToSqlLiteral for f64 {
    fn to_sql_literal(self) -> String {
        if self.is_nan() {
            "'nan'".to_string()
        } else if self.is_infinite() {
            if self > 0.0 { "'inf'".to_string() } else { "'-inf'".to_string() }
        } else {
            self.to_string()
        }
    }
}

impl ToSqlLiteral for &str {
    fn to_sql_literal(self) -> String {
        format!("'{}'", self.replace('\\', "\\\\").replace('\'', "''"))
    }
}

impl ToSqlLiteral for String {
    fn to_sql_literal(self) -> String {
        self.as_str().to_sql_literal()
    }
}

impl ToSqlLiteral for &String {
    fn to_sql_literal(self) -> String {
        self.as_str().to_sql_literal()
    }
}

impl ToSqlLiteral for &[u8] {
    fn to_sql_literal(self) -> String {
        format!("'\\x{}'::BYTEA", hex::encode(self))
    }
}

impl ToSqlLiteral for Vec<u8> {
    fn to_sql_literal(self) -> String {
        self.as_slice().to_sql_literal()
    }
}

impl ToSqlLiteral for NaiveDate {
    fn to_sql_literal(self) -> String {
        format!("'{}'", self.format("%Y-%m-%d"))
    }
}

impl ToSqlLiteral for NaiveDateTime {
    fn to_sql_literal(self) -> String {
        format!("'{}'", self.format("%Y-%m-%d %H:%M:%S%.f"))
    }
}

impl<T: ToSqlLiteral> ToSqlLiteral for Option<T> {
    fn to_sql_literal(self) -> String {
        match self {
            Some(value) => value.to_sql_literal(),
            None => "NULL".to_string(),
        }
    }
}

impl<T: ToSqlLiteral> ToSqlLiteral for Vec<T> {
    fn to_sql_literal(self) -> String {
        let items: Vec<String> = self.into_iter().map(ToSqlLiteral::to_sql_literal).collect();
        format!("[{}]", items.join(","))
    }
}

/// Double-quote an identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}


#[derive(Clone, Copy, PartialEq)]
enum Scan {
    Code,
    Text,
    Identifier,
    LineComment,
    BlockComment,
}

/// Replace each `?` placeholder in `sql` with the next literal.
///
/// Question marks inside string literals, quoted identifiers and comments
/// are left alone.
pub fn substitute(sql: &str, literals: &[String]) -> Result<String, FireboltError> {
    let mut output = String::with_capacity(sql.len());
    let mut state = Scan::Code;
    let mut placeholders = 0;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match (state, c) {
            (Scan::Code, '?') => {
                if let Some(literal) = literals.get(placeholders) {
                    output.push_str(literal);
                }
                placeholders += 1;
                continue;
            },
            (Scan::Code, '\'') => state = Scan::Text,
            (Scan::Code, '"') => state = Scan::Identifier,
            (Scan::Code, '-') if chars.peek() == Some(&'-') => state = Scan::LineComment,
            (Scan::Code, '/') if chars.peek() == Some(&'*') => {
                output.push(c);
                output.push('*');
                chars.next();
                state = Scan::BlockComment;
                continue;
            },
            (Scan::Text, '\\') => {
                output.push(c);
                if let Some(escaped) = chars.next() {
                    output.push(escaped);
                }
                continue;
            },
            (Scan::Text, '\'') => state = Scan::Code,
            (Scan::Identifier, '"') => state = Scan::Code,
            (Scan::LineComment, '\n') => state = Scan::Code,
            (Scan::BlockComment, '*') if chars.peek() == Some(&'/') => {
                output.push(c);
                output.push('/');
                chars.next();
                state = Scan::Code;
                continue;
            },
            _ => {},
        }
        output.push(c);
    }

    if placeholders != literals.len() {
        return Err(FireboltErrorKind::ParameterCount {
            expected: placeholders,
            supplied: literals.len(),
        }.into());
    }
    Ok(output)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_literals() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let cases: Vec<(String, &str)> = vec![
            (7i8.to_sql_literal(), "7"),
            ((-12i64).to_sql_literal(), "-12"),
            (true.to_sql_literal(), "true"),
            (1.5f64.to_sql_literal(), "1.5"),
            (f64::NAN.to_sql_literal(), "'nan'"),
            (f32::INFINITY.to_sql_literal(), "'inf'"),
            (f64::NEG_INFINITY.to_sql_literal(), "'-inf'"),
            ("O'Brien".to_sql_literal(), "'O''Brien'"),
            ("C:\\temp".to_sql_literal(), "'C:\\\\temp'"),
            (String::from("x").to_sql_literal(), "'x'"),
            (None::<String>.to_sql_literal(), "NULL"),
            (Some(3i32).to_sql_literal(), "3"),
            (b"hi".as_slice().to_sql_literal(), "'\\x6869'::BYTEA"),
            (vec![0xde_u8, 0xad].to_sql_literal(), "'\\xdead'::BYTEA"),
            (Some(vec![0x01_u8]).to_sql_literal(), "'\\x01'::BYTEA"),
            (date.to_sql_literal(), "'2024-02-29'"),
            (date.and_hms_micro_opt(1, 2, 3, 500).unwrap().to_sql_literal(), "'2024-02-29 01:02:03.000500'"),
            (vec![1i32, 2, 3].to_sql_literal(), "[1,2,3]"),
            (vec![Some("a"), None].to_sql_literal(), "['a',NULL]"),
        ];

        for (rendered, expected) in cases {
            assert_eq!(rendered, expected);
        }
    }

    #[test]
    fn substitutes_placeholders_in_code_only() {
        let sql = r#"SELECT ?, '?', "a?b", ? -- trailing ?
/* block ? */ FROM t WHERE x = ?"#;
        let literals = vec!["1".to_string(), "'two'".to_string(), "NULL".to_string()];

        let result = substitute(sql, &literals).unwrap();

        assert_eq!(
            result,
            r#"SELECT 1, '?', "a?b", 'two' -- trailing ?
/* block ? */ FROM t WHERE x = NULL"#
        );
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        let sql = r"SELECT 'it''s ?', 'back\'slash ?', ?";
        let result = substitute(sql, &["42".to_string()]).unwrap();
        assert_eq!(result, r"SELECT 'it''s ?', 'back\'slash ?', 42");
    }

    #[test]
    fn placeholder_count_must_match() {
        let cases: Vec<(&str, usize, usize, usize)> = vec![
            ("SELECT ?, ?", 1, 2, 1),
            ("SELECT 1", 1, 0, 1),
        ];

        for (sql, supplied, expected_count, supplied_count) in cases {
            let literals = vec!["1".to_string(); supplied];
            let error = substitute(sql, &literals).unwrap_err();
            assert!(matches!(
                error.kind,
                FireboltErrorKind::ParameterCount { expected, supplied }
                    if expected == expected_count && supplied == supplied_count
            ));
        }
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("my engine"), "\"my engine\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
