//! Parser for the textual column types the server reports in result metadata.
//!
//! A wire type looks like `int`, `decimal(38, 2) not null` or
//! `array(array(text null)) null`. Parsing strips the trailing nullability
//! clause, then peels `array(...)` layers one at a time, then splits the
//! parameter list off the base token and resolves the token in a fixed table.

use super::error::TypeGrammarError;

use phf::phf_map;
use std::fmt;


/// Scalar kind underlying a column, after all array layers are removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    String,
    Date,
    DateTime,
    Bytea,
}

impl BaseKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::String => "text",
            Self::Date => "date",
            Self::DateTime => "timestamp",
            Self::Bytea => "bytea",
        }
    }

    /// True for the kinds that take part in the numeric cast matrix.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Boolean
                | Self::Byte
                | Self::Short
                | Self::Int
                | Self::Long
                | Self::Float
                | Self::Double
                | Self::Decimal
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}


static BASE_KINDS: phf::Map<&'static str, BaseKind> = phf_map! {
    "boolean" => BaseKind::Boolean,
    "bool" => BaseKind::Boolean,
    "byte" => BaseKind::Byte,
    "short" => BaseKind::Short,
    "int16" => BaseKind::Short,
    "int" => BaseKind::Int,
    "integer" => BaseKind::Int,
    "int32" => BaseKind::Int,
    "bigint" => BaseKind::Long,
    "long" => BaseKind::Long,
    "int64" => BaseKind::Long,
    "float" => BaseKind::Float,
    "real" => BaseKind::Float,
    "float32" => BaseKind::Float,
    "double" => BaseKind::Double,
    "double precision" => BaseKind::Double,
    "float64" => BaseKind::Double,
    "decimal" => BaseKind::Decimal,
    "numeric" => BaseKind::Decimal,
    "string" => BaseKind::String,
    "text" => BaseKind::String,
    "date" => BaseKind::Date,
    "pgdate" => BaseKind::Date,
    "datetime" => BaseKind::DateTime,
    "timestamp" => BaseKind::DateTime,
    "timestamptz" => BaseKind::DateTime,
    "timestampntz" => BaseKind::DateTime,
    "bytea" => BaseKind::Bytea,
};


/// Structured form of a wire type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub base_kind: BaseKind,
    pub nullable: bool,
    pub array_depth: usize,
    pub precision_params: Option<Vec<u32>>,
}

impl TypeDescriptor {
    pub fn scalar(base_kind: BaseKind) -> Self {
        Self { base_kind, nullable: true, array_depth: 0, precision_params: None }
    }

    pub fn is_array(&self) -> bool {
        self.array_depth > 0
    }

    /// Descriptor of one element of this array type.
    pub fn element(&self) -> Self {
        Self {
            array_depth: self.array_depth.saturating_sub(1),
            nullable: true,
            ..self.clone()
        }
    }

    /// Declared scale for decimals, if the server sent one.
    pub fn scale(&self) -> Option<u32> {
        match self.base_kind {
            BaseKind::Decimal => self.precision_params.as_ref().and_then(|p| p.get(1).copied()),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.array_depth {
            write!(f, "array(")?;
        }
        write!(f, "{}", self.base_kind)?;
        if let Some(params) = &self.precision_params {
            let params: Vec<String> = params.iter().map(u32::to_string).collect();
            write!(f, "({})", params.join(", "))?;
        }
        for _ in 0..self.array_depth {
            write!(f, ")")?;
        }
        if self.nullable { write!(f, " null") } else { write!(f, " not null") }
    }
}


/// Parse a wire type string into a [`TypeDescriptor`].
pub fn parse(wire_type: &str) -> Result<TypeDescriptor, TypeGrammarError> {
    // Collapse runs of whitespace so suffix matching is position independent.
    let normalized = wire_type.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Err(TypeGrammarError::Malformed(wire_type.to_string()));
    }
    check_balanced(&normalized)?;

    let (mut rest, declared) = strip_nullability(&normalized);
    let mut nullable = declared.unwrap_or(true);
    let mut array_depth = 0;

    loop {
        // Element nullability inside array layers is not tracked.
        rest = strip_nullability(rest).0;

        if let Some(inner) = strip_wrapper(rest, "array")? {
            array_depth += 1;
            rest = inner;
        } else if let Some(inner) = strip_wrapper(rest, "nullable")? {
            if array_depth == 0 {
                nullable = true;
            }
            rest = inner;
        } else {
            break;
        }
    }

    let (token, precision_params) = split_params(rest, wire_type)?;
    let base_kind = BASE_KINDS
        .get(token.to_ascii_lowercase().as_str())
        .copied()
        .ok_or_else(|| TypeGrammarError::UnknownBaseType(token.to_string()))?;

    Ok(TypeDescriptor { base_kind, nullable, array_depth, precision_params })
}

fn check_balanced(text: &str) -> Result<(), TypeGrammarError> {
    let mut depth: i32 = 0;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(TypeGrammarError::Malformed(text.to_string()));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(TypeGrammarError::Malformed(text.to_string()));
    }
    Ok(())
}

fn ends_with_ignore_case(text: &str, suffix: &str) -> Option<usize> {
    let start = text.len().checked_sub(suffix.len())?;
    text.get(start..)
        .filter(|tail| tail.eq_ignore_ascii_case(suffix))
        .map(|_| start)
}

fn strip_nullability(text: &str) -> (&str, Option<bool>) {
    if let Some(start) = ends_with_ignore_case(text, " not null") {
        (text[..start].trim_end(), Some(false))
    } else if let Some(start) = ends_with_ignore_case(text, " null") {
        (text[..start].trim_end(), Some(true))
    } else {
        (text, None)
    }
}

/// Index of the parenthesis closing the one opened at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Peel `name(...)` off `text`, returning the inside when it wraps the whole string.
fn strip_wrapper<'a>(text: &'a str, name: &str) -> Result<Option<&'a str>, TypeGrammarError> {
    let Some(head) = text.get(..name.len()) else {
        return Ok(None);
    };
    if !head.eq_ignore_ascii_case(name) {
        return Ok(None);
    }
    let after = text[name.len()..].trim_start();
    if !after.starts_with('(') {
        return Ok(None);
    }
    let offset = text.len() - after.len();
    match matching_paren(text, offset) {
        Some(close) if close == text.len() - 1 => {
            let inner = text[offset + 1..close].trim();
            if inner.is_empty() {
                return Err(TypeGrammarError::Malformed(text.to_string()));
            }
            Ok(Some(inner))
        },
        _ => Err(TypeGrammarError::Malformed(text.to_string())),
    }
}

fn split_params<'a>(
    text: &'a str,
    original: &str,
) -> Result<(&'a str, Option<Vec<u32>>), TypeGrammarError> {
    let malformed = || TypeGrammarError::Malformed(original.to_string());

    let Some(open) = text.find('(') else {
        return Ok((text.trim(), None));
    };
    let token = text[..open].trim();
    if token.is_empty() || matching_paren(text, open) != Some(text.len() - 1) {
        return Err(malformed());
    }

    let inner = text[open + 1..text.len() - 1].trim();
    if inner.is_empty() {
        return Ok((token, None));
    }
    let params = inner
        .split(',')
        .map(|p| p.trim().parse::<u32>().map_err(|_| malformed()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((token, Some(params)))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_aliases() {
        let cases: Vec<(&str, BaseKind)> = vec![
            ("boolean", BaseKind::Boolean),
            ("INT", BaseKind::Int),
            ("integer", BaseKind::Int),
            ("int16", BaseKind::Short),
            ("bigint", BaseKind::Long),
            ("Int64", BaseKind::Long),
            ("real", BaseKind::Float),
            ("double precision", BaseKind::Double),
            ("DOUBLE   PRECISION", BaseKind::Double),
            ("numeric", BaseKind::Decimal),
            ("text", BaseKind::String),
            ("timestamptz", BaseKind::DateTime),
            ("pgdate", BaseKind::Date),
            ("bytea", BaseKind::Bytea),
        ];

        for (wire, expected) in cases {
            let parsed = parse(wire).unwrap_or_else(|e| panic!("{wire}: {e}"));
            assert_eq!(parsed.base_kind, expected, "{wire}");
            assert_eq!(parsed.array_depth, 0);
            assert!(parsed.nullable, "{wire} should default to nullable");
        }
    }

    #[test]
    fn nullability_suffix_is_case_insensitive() {
        assert!(!parse("int NOT NULL").unwrap().nullable);
        assert!(!parse("int not null").unwrap().nullable);
        assert!(parse("int Null").unwrap().nullable);
        assert!(parse("nullable(int)").unwrap().nullable);
    }

    #[test]
    fn array_depth_matches_wrapper_count() {
        let cases: Vec<(&str, usize, BaseKind)> = vec![
            ("array(int)", 1, BaseKind::Int),
            ("array(int) not null", 1, BaseKind::Int),
            ("array(array(text null) null) not null", 2, BaseKind::String),
            ("ARRAY(ARRAY(ARRAY(decimal(38, 2))))", 3, BaseKind::Decimal),
            ("array( nullable(bigint) )", 1, BaseKind::Long),
        ];

        for (wire, depth, kind) in cases {
            let parsed = parse(wire).unwrap();
            assert_eq!(parsed.array_depth, depth, "{wire}");
            assert_eq!(parsed.array_depth, wire.to_ascii_lowercase().matches("array(").count());
            assert_eq!(parsed.base_kind, kind);
        }
        assert!(!parse("array(int null) not null").unwrap().nullable);
    }

    #[test]
    fn keeps_precision_params() {
        let parsed = parse("decimal(38, 9) not null").unwrap();
        assert_eq!(parsed.precision_params, Some(vec![38, 9]));
        assert_eq!(parsed.scale(), Some(9));
        assert_eq!(parse("text(255)").unwrap().precision_params, Some(vec![255]));
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert_eq!(
            parse("geography"),
            Err(TypeGrammarError::UnknownBaseType("geography".into()))
        );
        assert_eq!(
            parse("array(struct)"),
            Err(TypeGrammarError::UnknownBaseType("struct".into()))
        );

        for wire in ["", "   ", "array(int", "array(int))", "decimal(38,", "decimal(a, b)", "(int)",
                     "array()", "array(  )", "array(array()) null", "nullable()"] {
            assert!(
                matches!(parse(wire), Err(TypeGrammarError::Malformed(_))),
                "{wire:?} should be malformed"
            );
        }
    }

    #[test]
    fn parsing_is_deterministic_and_displays_back() {
        let wire = "array(array(decimal(10, 2))) not null";
        assert_eq!(parse(wire).unwrap(), parse(wire).unwrap());
        assert_eq!(parse(wire).unwrap().to_string(), "array(array(decimal(10, 2))) not null");
    }

    #[test]
    fn element_drops_one_layer() {
        let parsed = parse("array(array(int))").unwrap();
        assert_eq!(parsed.element().array_depth, 1);
        assert_eq!(parsed.element().element().array_depth, 0);
        assert!(!parsed.element().element().is_array());
    }
}
