use std::error::Error;
use std::fmt;

use super::BaseKind;


/// Failure to parse a wire type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeGrammarError {
    Malformed(String),
    UnknownBaseType(String),
}

impl fmt::Display for TypeGrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(wire_type) => write!(f, "Malformed type descriptor: '{wire_type}'"),
            Self::UnknownBaseType(token) => write!(f, "Unknown base type: '{token}'"),
        }
    }
}

impl Error for TypeGrammarError {}


/// Failure to turn a raw cell into a native value.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercionError {
    InvalidArray(String),
    InvalidBoolean(String),
    InvalidNumber { raw: String, target: BaseKind },
    InvalidTemporal { raw: String, target: BaseKind },
    NonFiniteValue { value: f64, target: BaseKind },
    NotAnArray(BaseKind),
    Overflow { value: String, target: BaseKind },
    Unsupported { from: &'static str, target: BaseKind },
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArray(raw) => write!(f, "Invalid array literal: '{raw}'"),
            Self::InvalidBoolean(raw) => write!(f, "Invalid boolean: '{raw}'"),
            Self::InvalidNumber { raw, target } => write!(f, "Cannot parse '{raw}' as {target}"),
            Self::InvalidTemporal { raw, target } => write!(f, "Cannot parse '{raw}' as {target}"),
            Self::NonFiniteValue { value, target } => {
                write!(f, "Non-finite value {value} cannot be cast to {target}")
            }
            Self::NotAnArray(target) => write!(f, "Array value found where {target} was expected"),
            Self::Overflow { value, target } => write!(f, "Value {value} is out of range for {target}"),
            Self::Unsupported { from, target } => write!(f, "Cannot cast {from} to {target}"),
        }
    }
}

impl Error for CoercionError {}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_error_display_formats_correctly() {
        let cases: Vec<(CoercionError, &str)> = vec![
            (CoercionError::InvalidBoolean("maybe".into()), "Invalid boolean: 'maybe'"),
            (
                CoercionError::NonFiniteValue { value: f64::NAN, target: BaseKind::Int },
                "Non-finite value NaN cannot be cast to int",
            ),
            (
                CoercionError::Overflow { value: "70000".into(), target: BaseKind::Short },
                "out of range for short",
            ),
            (
                CoercionError::InvalidTemporal { raw: "yesterday".into(), target: BaseKind::Date },
                "Cannot parse 'yesterday' as date",
            ),
        ];

        for (error, expect) in cases {
            let text = error.to_string();
            assert!(text.contains(expect), "Expected `{}` in `{}`", expect, text);
        }
    }

    #[test]
    fn grammar_error_display_names_the_input() {
        let error = TypeGrammarError::UnknownBaseType("geography".into());
        assert_eq!(error.to_string(), "Unknown base type: 'geography'");
    }
}
