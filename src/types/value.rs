//! Native values produced from wire cells, and the cast matrix between them.

use super::coerce::{parse_bool, parse_bytes, parse_date, parse_datetime};
use super::error::CoercionError;
use super::BaseKind;

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;


/// Exact decimal stored as a scaled integer: `value / 10^scale`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Decimal {
    pub value: i128,
    pub scale: u32,
}

impl Decimal {
    pub fn new(value: i128, scale: u32) -> Self {
        Self { value, scale }
    }

    /// Parse plain decimal notation (`-12.340`). Exponents are not accepted here.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return None;
        }

        let mut value: i128 = 0;
        for c in whole.chars().chain(fraction.chars()) {
            value = value.checked_mul(10)?.checked_add(c.to_digit(10)? as i128)?;
        }
        let value = if negative { -value } else { value };

        Some(Self { value, scale: fraction.len() as u32 })
    }

    fn divisor(&self) -> Option<i128> {
        10i128.checked_pow(self.scale)
    }

    /// Integer part, truncated toward zero.
    pub fn trunc(&self) -> i128 {
        match self.divisor() {
            Some(d) => self.value / d,
            None => 0,
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.value as f64 / 10f64.powi(self.scale as i32)
    }

    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // f64's Display never uses exponent notation.
        Self::parse(&value.to_string())
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.value);
        }
        // Place the point in the digit string; 10^scale may not fit in i128.
        let scale = self.scale as usize;
        let sign = if self.value < 0 { "-" } else { "" };
        let digits = format!("{:0>width$}", self.value.unsigned_abs(), width = scale + 1);
        let (whole, fraction) = digits.split_at(digits.len() - scale);
        write!(f, "{sign}{whole}.{fraction}")
    }
}


/// A typed value read from a result cell.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeValue {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
    Array(Vec<Option<NativeValue>>),
}

/// Intermediate form every numeric source is reduced to before narrowing.
enum Numeric {
    Integral(i128),
    Floating(f64),
    Exact(Decimal),
}

impl NativeValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "text",
            Self::Date(_) => "date",
            Self::DateTime(_) => "timestamp",
            Self::Bytes(_) => "bytea",
            Self::Array(_) => "array",
        }
    }

    /// Convert this value to `target`, applying the numeric cast matrix.
    ///
    /// Integral targets truncate fractional sources toward zero and reject
    /// out-of-range values; NaN and infinities never reach an integral or
    /// decimal target.
    pub fn cast(self, target: BaseKind) -> Result<NativeValue, CoercionError> {
        if let Self::Array(_) = self {
            return Err(CoercionError::NotAnArray(target));
        }

        match target {
            BaseKind::String => Ok(Self::String(self.into_text(target)?)),
            BaseKind::Date => match self {
                Self::Date(d) => Ok(Self::Date(d)),
                Self::DateTime(dt) => Ok(Self::Date(dt.date())),
                Self::String(s) => parse_date(&s).map(Self::Date),
                other => Err(other.unsupported(target)),
            },
            BaseKind::DateTime => match self {
                Self::DateTime(dt) => Ok(Self::DateTime(dt)),
                Self::Date(d) => Ok(Self::DateTime(d.and_time(chrono::NaiveTime::MIN))),
                Self::String(s) => parse_datetime(&s).map(Self::DateTime),
                other => Err(other.unsupported(target)),
            },
            BaseKind::Bytea => match self {
                Self::Bytes(b) => Ok(Self::Bytes(b)),
                Self::String(s) => Ok(Self::Bytes(parse_bytes(&s))),
                other => Err(other.unsupported(target)),
            },
            BaseKind::Boolean => match self {
                Self::Boolean(b) => Ok(Self::Boolean(b)),
                Self::String(s) => parse_bool(&s).map(Self::Boolean),
                other => Ok(Self::Boolean(match other.into_numeric(target)? {
                    Numeric::Integral(i) => i != 0,
                    Numeric::Floating(f) => f != 0.0,
                    Numeric::Exact(d) => d.value != 0,
                })),
            },
            BaseKind::Float => match self {
                Self::String(s) => parse_floating::<f32>(&s, target).map(Self::Float),
                other => narrow(other.into_numeric(target)?, target),
            },
            BaseKind::Double => match self {
                Self::String(s) => parse_floating::<f64>(&s, target).map(Self::Double),
                other => narrow(other.into_numeric(target)?, target),
            },
            _ => narrow(self.into_numeric(target)?, target),
        }
    }

    fn unsupported(&self, target: BaseKind) -> CoercionError {
        CoercionError::Unsupported { from: self.kind_name(), target }
    }

    fn into_numeric(self, target: BaseKind) -> Result<Numeric, CoercionError> {
        Ok(match self {
            Self::Boolean(b) => Numeric::Integral(b as i128),
            Self::Byte(v) => Numeric::Integral(v as i128),
            Self::Short(v) => Numeric::Integral(v as i128),
            Self::Int(v) => Numeric::Integral(v as i128),
            Self::Long(v) => Numeric::Integral(v as i128),
            Self::Float(v) => Numeric::Floating(v as f64),
            Self::Double(v) => Numeric::Floating(v),
            Self::Decimal(d) => Numeric::Exact(d),
            Self::String(s) => parse_numeric(&s, target)?,
            other => return Err(other.unsupported(target)),
        })
    }

    fn into_text(self, target: BaseKind) -> Result<String, CoercionError> {
        match self {
            Self::String(s) => Ok(s),
            Self::Bytes(b) => String::from_utf8(b).map_err(|_| CoercionError::Unsupported {
                from: "bytea",
                target,
            }),
            other => Ok(other.to_string()),
        }
    }

    /// JSON rendering used by the command-line output.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Byte(v) => Value::from(*v),
            Self::Short(v) => Value::from(*v),
            Self::Int(v) => Value::from(*v),
            Self::Long(v) => Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v as f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(v.to_string())),
            Self::Double(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(v.to_string())),
            Self::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.as_ref().map_or(Value::Null, NativeValue::to_json))
                    .collect(),
            ),
            other => Value::String(other.to_string()),
        }
    }
}

fn overflow(value: impl fmt::Display, target: BaseKind) -> CoercionError {
    CoercionError::Overflow { value: value.to_string(), target }
}

fn parse_numeric(text: &str, target: BaseKind) -> Result<Numeric, CoercionError> {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i128>() {
        return Ok(Numeric::Integral(i));
    }
    if let Some(d) = Decimal::parse(trimmed) {
        return Ok(Numeric::Exact(d));
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "nan" | "+nan" | "-nan" => return Ok(Numeric::Floating(f64::NAN)),
        "inf" | "+inf" | "infinity" | "+infinity" => return Ok(Numeric::Floating(f64::INFINITY)),
        "-inf" | "-infinity" => return Ok(Numeric::Floating(f64::NEG_INFINITY)),
        _ => {}
    }
    trimmed
        .parse::<f64>()
        .map(Numeric::Floating)
        .map_err(|_| CoercionError::InvalidNumber { raw: text.to_string(), target })
}

/// Direct float parsing avoids rounding twice through the decimal path.
fn parse_floating<T: std::str::FromStr>(text: &str, target: BaseKind) -> Result<T, CoercionError> {
    let trimmed = text.trim();
    let normalized = match trimmed.to_ascii_lowercase().as_str() {
        "+nan" | "-nan" => "nan",
        "+inf" | "+infinity" => "inf",
        _ => trimmed,
    };
    normalized
        .parse::<T>()
        .map_err(|_| CoercionError::InvalidNumber { raw: text.to_string(), target })
}

fn float_to_integral(value: f64, target: BaseKind) -> Result<i128, CoercionError> {
    if !value.is_finite() {
        return Err(CoercionError::NonFiniteValue { value, target });
    }
    let truncated = value.trunc();
    // 2^63 is exactly representable; anything at or past it cannot be a long.
    if truncated < i64::MIN as f64 || truncated >= -(i64::MIN as f64) {
        return Err(overflow(value, target));
    }
    Ok(truncated as i128)
}

fn narrow(source: Numeric, target: BaseKind) -> Result<NativeValue, CoercionError> {
    match target {
        BaseKind::Float => Ok(NativeValue::Float(match source {
            Numeric::Integral(i) => i as f32,
            Numeric::Floating(f) => f as f32,
            Numeric::Exact(d) => d.to_f64() as f32,
        })),
        BaseKind::Double => Ok(NativeValue::Double(match source {
            Numeric::Integral(i) => i as f64,
            Numeric::Floating(f) => f,
            Numeric::Exact(d) => d.to_f64(),
        })),
        BaseKind::Decimal => match source {
            Numeric::Integral(i) => Ok(NativeValue::Decimal(Decimal::new(i, 0))),
            Numeric::Exact(d) => Ok(NativeValue::Decimal(d)),
            Numeric::Floating(f) if !f.is_finite() => {
                Err(CoercionError::NonFiniteValue { value: f, target })
            }
            Numeric::Floating(f) => Decimal::from_f64(f)
                .map(NativeValue::Decimal)
                .ok_or_else(|| overflow(f, target)),
        },
        _ => {
            let integral = match source {
                Numeric::Integral(i) => i,
                Numeric::Floating(f) => float_to_integral(f, target)?,
                Numeric::Exact(d) => d.trunc(),
            };
            integral_to(integral, target)
        }
    }
}

fn integral_to(value: i128, target: BaseKind) -> Result<NativeValue, CoercionError> {
    let converted = match target {
        BaseKind::Byte => i8::try_from(value).map(NativeValue::Byte),
        BaseKind::Short => i16::try_from(value).map(NativeValue::Short),
        BaseKind::Int => i32::try_from(value).map(NativeValue::Int),
        BaseKind::Long => i64::try_from(value).map(NativeValue::Long),
        other => return Err(CoercionError::Unsupported { from: "integer", target: other }),
    };
    converted.map_err(|_| overflow(value, target))
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::Bytes(b) => write!(f, "\\x{}", hex::encode(b)),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        Some(value) => write!(f, "{value}")?,
                        None => write!(f, "NULL")?,
                    }
                }
                write!(f, "]")
            }
        }
    }
}


/// Rust types a [`NativeValue`] can be extracted into.
pub trait FromNative: Sized {
    const KIND: BaseKind;

    fn from_native(value: NativeValue) -> Result<Self, CoercionError>;
}

/// Macro to implement FromNative for a type mapping to a NativeValue variant.
macro_rules! impl_from_native {
    ($ty:ty => $variant:ident, $kind:expr) => {
        impl FromNative for $ty {
            const KIND: BaseKind = $kind;

            fn from_native(value: NativeValue) -> Result<Self, CoercionError> {
                match value.cast(Self::KIND)? {
                    NativeValue::$variant(v) => Ok(v),
                    other => Err(CoercionError::Unsupported {
                        from: other.kind_name(),
                        target: Self::KIND,
                    }),
                }
            }
        }
    };
}

impl_from_native!(bool => Boolean, BaseKind::Boolean);
impl_from_native!(i8 => Byte, BaseKind::Byte);
impl_from_native!(i16 => Short, BaseKind::Short);
impl_from_native!(i32 => Int, BaseKind::Int);
impl_from_native!(i64 => Long, BaseKind::Long);
impl_from_native!(f32 => Float, BaseKind::Float);
impl_from_native!(f64 => Double, BaseKind::Double);
impl_from_native!(Decimal => Decimal, BaseKind::Decimal);
impl_from_native!(String => String, BaseKind::String);
impl_from_native!(NaiveDate => Date, BaseKind::Date);
impl_from_native!(NaiveDateTime => DateTime, BaseKind::DateTime);
impl_from_native!(Vec<u8> => Bytes, BaseKind::Bytea);


#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_sources() -> Vec<NativeValue> {
        vec![
            NativeValue::Boolean(true),
            NativeValue::Byte(7),
            NativeValue::Short(7),
            NativeValue::Int(7),
            NativeValue::Long(7),
            NativeValue::Float(7.9),
            NativeValue::Double(7.9),
            NativeValue::Decimal(Decimal::new(79, 1)),
            NativeValue::String("1".into()),
        ]
    }

    #[test]
    fn every_numeric_source_reaches_every_numeric_target() {
        let targets = [
            BaseKind::Boolean,
            BaseKind::Byte,
            BaseKind::Short,
            BaseKind::Int,
            BaseKind::Long,
            BaseKind::Float,
            BaseKind::Double,
            BaseKind::Decimal,
        ];
        for source in numeric_sources() {
            for target in targets {
                let result = source.clone().cast(target);
                assert!(result.is_ok(), "{source:?} -> {target}: {result:?}");
            }
        }
    }

    #[test]
    fn fractional_sources_truncate_toward_zero() {
        assert_eq!(NativeValue::Float(7.9).cast(BaseKind::Short), Ok(NativeValue::Short(7)));
        assert_eq!(NativeValue::Double(-7.9).cast(BaseKind::Int), Ok(NativeValue::Int(-7)));
        assert_eq!(
            NativeValue::Decimal(Decimal::new(-79, 1)).cast(BaseKind::Long),
            Ok(NativeValue::Long(-7))
        );
        assert_eq!(NativeValue::String("3.99".into()).cast(BaseKind::Byte), Ok(NativeValue::Byte(3)));
    }

    #[test]
    fn narrowing_out_of_range_overflows() {
        let cases: Vec<(NativeValue, BaseKind)> = vec![
            (NativeValue::Int(70_000), BaseKind::Short),
            (NativeValue::Long(300), BaseKind::Byte),
            (NativeValue::Double(1e20), BaseKind::Long),
            (NativeValue::String("99999999999".into()), BaseKind::Int),
        ];
        for (source, target) in cases {
            assert!(
                matches!(source.clone().cast(target), Err(CoercionError::Overflow { .. })),
                "{source:?} -> {target}"
            );
        }
    }

    #[test]
    fn non_finite_values_never_become_integral() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            for target in [BaseKind::Byte, BaseKind::Short, BaseKind::Int, BaseKind::Long, BaseKind::Decimal] {
                assert!(matches!(
                    NativeValue::Double(value).cast(target),
                    Err(CoercionError::NonFiniteValue { .. })
                ));
            }
        }
        assert!(matches!(
            NativeValue::String("-inf".into()).cast(BaseKind::Int),
            Err(CoercionError::NonFiniteValue { .. })
        ));
        assert!(matches!(
            NativeValue::Float(f32::NAN).cast(BaseKind::Double),
            Ok(NativeValue::Double(v)) if v.is_nan()
        ));
    }

    #[test]
    fn boolean_conversions() {
        assert_eq!(NativeValue::Int(0).cast(BaseKind::Boolean), Ok(NativeValue::Boolean(false)));
        assert_eq!(NativeValue::Double(0.5).cast(BaseKind::Boolean), Ok(NativeValue::Boolean(true)));
        assert_eq!(NativeValue::Boolean(true).cast(BaseKind::Long), Ok(NativeValue::Long(1)));
        assert!(matches!(
            NativeValue::String("maybe".into()).cast(BaseKind::Boolean),
            Err(CoercionError::InvalidBoolean(_))
        ));
    }

    #[test]
    fn decimal_parse_and_display() {
        assert_eq!(Decimal::parse("-12.340"), Some(Decimal::new(-12340, 3)));
        assert_eq!(Decimal::parse(".5"), Some(Decimal::new(5, 1)));
        assert_eq!(Decimal::parse("abc"), None);
        assert_eq!(Decimal::parse("-"), None);
        assert_eq!(Decimal::new(-12340, 3).to_string(), "-12.340");
        assert_eq!(Decimal::new(-5, 2).to_string(), "-0.05");
        assert_eq!(Decimal::new(42, 0).to_string(), "42");
    }

    #[test]
    fn decimal_beyond_i128_scale_keeps_its_point() {
        let text = format!("0.{}1", "0".repeat(40));
        let decimal = Decimal::parse(&text).unwrap();

        assert_eq!(decimal, Decimal::new(1, 41));
        assert_eq!(decimal.to_string(), text);
        assert_eq!(Decimal::parse(&decimal.to_string()), Some(decimal));
        assert_eq!(Decimal::new(-123, 40).to_string(), format!("-0.{}123", "0".repeat(37)));
        assert_eq!(decimal.trunc(), 0);
    }

    #[test]
    fn non_numeric_sources_are_rejected() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert!(matches!(
            NativeValue::Date(date).cast(BaseKind::Int),
            Err(CoercionError::Unsupported { from: "date", .. })
        ));
        assert!(matches!(
            NativeValue::Array(vec![]).cast(BaseKind::String),
            Err(CoercionError::NotAnArray(BaseKind::String))
        ));
        assert_eq!(
            NativeValue::Date(date).cast(BaseKind::String),
            Ok(NativeValue::String("2024-02-29".into()))
        );
    }

    #[test]
    fn from_native_extracts_rust_types() {
        assert_eq!(i16::from_native(NativeValue::Double(12.7)), Ok(12));
        assert_eq!(String::from_native(NativeValue::Long(5)), Ok("5".to_string()));
        assert_eq!(bool::from_native(NativeValue::String("t".into())), Ok(true));
        assert!(i8::from_native(NativeValue::Long(1_000)).is_err());
    }
}
