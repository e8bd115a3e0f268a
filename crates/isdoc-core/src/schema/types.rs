//! Built-in XSD datatypes and constraining facets.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::warn;

lazy_static! {
    static ref DECIMAL: Regex = Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap();
    static ref INTEGER: Regex = Regex::new(r"^[+-]?\d+$").unwrap();
    static ref FLOAT: Regex =
        Regex::new(r"^([+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?|[+-]?INF|NaN)$").unwrap();
    static ref DATE: Regex =
        Regex::new(r"^(-?\d{4,}-\d{2}-\d{2})(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref DATE_TIME: Regex = Regex::new(
        r"^(-?\d{4,}-\d{2}-\d{2})T(\d{2}:\d{2}:\d{2}(\.\d+)?)(Z|[+-]\d{2}:\d{2})?$"
    )
    .unwrap();
    static ref TIME: Regex =
        Regex::new(r"^(\d{2}:\d{2}:\d{2}(\.\d+)?)(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_YEAR: Regex = Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_YEAR_MONTH: Regex =
        Regex::new(r"^-?\d{4,}-(\d{2})(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_MONTH: Regex = Regex::new(r"^--(\d{2})(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_MONTH_DAY: Regex =
        Regex::new(r"^--(\d{2})-(\d{2})(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref G_DAY: Regex = Regex::new(r"^---(\d{2})(Z|[+-]\d{2}:\d{2})?$").unwrap();
    static ref DURATION: Regex = Regex::new(
        r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$"
    )
    .unwrap();
    static ref LANGUAGE: Regex = Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap();
    static ref NCNAME: Regex = Regex::new(r"^[\p{L}_][\p{L}\p{N}\p{M}._\-]*$").unwrap();
    static ref NAME: Regex = Regex::new(r"^[\p{L}_:][\p{L}\p{N}\p{M}._:\-]*$").unwrap();
    static ref NMTOKEN: Regex = Regex::new(r"^[\p{L}\p{N}\p{M}._:\-]+$").unwrap();
    static ref HEX_BINARY: Regex = Regex::new(r"^([0-9a-fA-F]{2})*$").unwrap();
    static ref BASE64: Regex =
        Regex::new(r"^([A-Za-z0-9+/]{4})*([A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$").unwrap();
}

/// White space handling applied before lexical checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preserve" => Some(WhiteSpace::Preserve),
            "replace" => Some(WhiteSpace::Replace),
            "collapse" => Some(WhiteSpace::Collapse),
            _ => None,
        }
    }

    pub fn normalize(&self, value: &str) -> String {
        match self {
            WhiteSpace::Preserve => value.to_string(),
            WhiteSpace::Replace => value.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => value.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// The built-in datatypes of XML Schema 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    AnyType,
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NcName,
    NmToken,
    NmTokens,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    QName,
    Notation,
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    PositiveInteger,
    Float,
    Double,
    Duration,
    DateTime,
    Date,
    Time,
    GYear,
    GYearMonth,
    GMonth,
    GMonthDay,
    GDay,
    HexBinary,
    Base64Binary,
    AnyUri,
}

impl Builtin {
    /// Look up a built-in type by its local name in the XSD namespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let builtin = match name {
            "anyType" => Builtin::AnyType,
            "anySimpleType" => Builtin::AnySimpleType,
            "string" => Builtin::String,
            "normalizedString" => Builtin::NormalizedString,
            "token" => Builtin::Token,
            "language" => Builtin::Language,
            "Name" => Builtin::Name,
            "NCName" => Builtin::NcName,
            "NMTOKEN" => Builtin::NmToken,
            "NMTOKENS" => Builtin::NmTokens,
            "ID" => Builtin::Id,
            "IDREF" => Builtin::IdRef,
            "IDREFS" => Builtin::IdRefs,
            "ENTITY" => Builtin::Entity,
            "ENTITIES" => Builtin::Entities,
            "QName" => Builtin::QName,
            "NOTATION" => Builtin::Notation,
            "boolean" => Builtin::Boolean,
            "decimal" => Builtin::Decimal,
            "integer" => Builtin::Integer,
            "nonPositiveInteger" => Builtin::NonPositiveInteger,
            "negativeInteger" => Builtin::NegativeInteger,
            "long" => Builtin::Long,
            "int" => Builtin::Int,
            "short" => Builtin::Short,
            "byte" => Builtin::Byte,
            "nonNegativeInteger" => Builtin::NonNegativeInteger,
            "unsignedLong" => Builtin::UnsignedLong,
            "unsignedInt" => Builtin::UnsignedInt,
            "unsignedShort" => Builtin::UnsignedShort,
            "unsignedByte" => Builtin::UnsignedByte,
            "positiveInteger" => Builtin::PositiveInteger,
            "float" => Builtin::Float,
            "double" => Builtin::Double,
            "duration" => Builtin::Duration,
            "dateTime" => Builtin::DateTime,
            "date" => Builtin::Date,
            "time" => Builtin::Time,
            "gYear" => Builtin::GYear,
            "gYearMonth" => Builtin::GYearMonth,
            "gMonth" => Builtin::GMonth,
            "gMonthDay" => Builtin::GMonthDay,
            "gDay" => Builtin::GDay,
            "hexBinary" => Builtin::HexBinary,
            "base64Binary" => Builtin::Base64Binary,
            "anyURI" => Builtin::AnyUri,
            _ => return None,
        };
        Some(builtin)
    }

    /// Default white space handling of the type.
    pub fn white_space(&self) -> WhiteSpace {
        match self {
            Builtin::String | Builtin::AnyType | Builtin::AnySimpleType => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Whether the type's values are ordered numerically.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Builtin::Decimal
                | Builtin::Integer
                | Builtin::NonPositiveInteger
                | Builtin::NegativeInteger
                | Builtin::Long
                | Builtin::Int
                | Builtin::Short
                | Builtin::Byte
                | Builtin::NonNegativeInteger
                | Builtin::UnsignedLong
                | Builtin::UnsignedInt
                | Builtin::UnsignedShort
                | Builtin::UnsignedByte
                | Builtin::PositiveInteger
                | Builtin::Float
                | Builtin::Double
        )
    }

    /// Number of units the length facets count for `value`.
    pub fn measure(&self, value: &str) -> usize {
        match self {
            Builtin::HexBinary => value.len() / 2,
            Builtin::Base64Binary => {
                let data: Vec<char> = value.chars().filter(|c| !c.is_whitespace()).collect();
                let padding = data.iter().rev().take_while(|c| **c == '=').count();
                ((data.len() / 4) * 3).saturating_sub(padding.min(2))
            }
            Builtin::NmTokens | Builtin::IdRefs | Builtin::Entities => {
                value.split_whitespace().count()
            }
            _ => value.chars().count(),
        }
    }

    /// Check the lexical form of an already normalized value.
    pub fn check(&self, value: &str) -> Result<(), String> {
        let ok = match self {
            Builtin::AnyType
            | Builtin::AnySimpleType
            | Builtin::String
            | Builtin::NormalizedString
            | Builtin::Token
            | Builtin::AnyUri => true,
            Builtin::Language => LANGUAGE.is_match(value),
            Builtin::Name => NAME.is_match(value),
            Builtin::NcName | Builtin::Id | Builtin::IdRef | Builtin::Entity => {
                NCNAME.is_match(value)
            }
            Builtin::NmToken => NMTOKEN.is_match(value),
            Builtin::NmTokens => {
                !value.is_empty() && value.split_whitespace().all(|t| NMTOKEN.is_match(t))
            }
            Builtin::IdRefs | Builtin::Entities => {
                !value.is_empty() && value.split_whitespace().all(|t| NCNAME.is_match(t))
            }
            Builtin::QName | Builtin::Notation => match value.split_once(':') {
                Some((prefix, local)) => NCNAME.is_match(prefix) && NCNAME.is_match(local),
                None => NCNAME.is_match(value),
            },
            Builtin::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Builtin::Decimal => DECIMAL.is_match(value),
            Builtin::Float | Builtin::Double => FLOAT.is_match(value),
            Builtin::Integer => INTEGER.is_match(value),
            Builtin::NonPositiveInteger => integer_in(value, None, Some(0)),
            Builtin::NegativeInteger => integer_in(value, None, Some(-1)),
            Builtin::Long => integer_in(value, Some(i64::MIN as i128), Some(i64::MAX as i128)),
            Builtin::Int => integer_in(value, Some(i32::MIN as i128), Some(i32::MAX as i128)),
            Builtin::Short => integer_in(value, Some(i16::MIN as i128), Some(i16::MAX as i128)),
            Builtin::Byte => integer_in(value, Some(i8::MIN as i128), Some(i8::MAX as i128)),
            Builtin::NonNegativeInteger => integer_in(value, Some(0), None),
            Builtin::PositiveInteger => integer_in(value, Some(1), None),
            Builtin::UnsignedLong => integer_in(value, Some(0), Some(u64::MAX as i128)),
            Builtin::UnsignedInt => integer_in(value, Some(0), Some(u32::MAX as i128)),
            Builtin::UnsignedShort => integer_in(value, Some(0), Some(u16::MAX as i128)),
            Builtin::UnsignedByte => integer_in(value, Some(0), Some(u8::MAX as i128)),
            Builtin::Duration => {
                DURATION.is_match(value) && !value.ends_with('P') && !value.ends_with('T')
            }
            Builtin::DateTime => DATE_TIME
                .captures(value)
                .is_some_and(|caps| valid_date(&caps[1]) && valid_time(&caps[2])),
            Builtin::Date => DATE.captures(value).is_some_and(|caps| valid_date(&caps[1])),
            Builtin::Time => TIME.captures(value).is_some_and(|caps| valid_time(&caps[1])),
            Builtin::GYear => G_YEAR.is_match(value),
            Builtin::GYearMonth => G_YEAR_MONTH
                .captures(value)
                .is_some_and(|caps| in_range(&caps[1], 1, 12)),
            Builtin::GMonth => G_MONTH
                .captures(value)
                .is_some_and(|caps| in_range(&caps[1], 1, 12)),
            Builtin::GMonthDay => G_MONTH_DAY
                .captures(value)
                .is_some_and(|caps| in_range(&caps[1], 1, 12) && in_range(&caps[2], 1, 31)),
            Builtin::GDay => G_DAY
                .captures(value)
                .is_some_and(|caps| in_range(&caps[1], 1, 31)),
            Builtin::HexBinary => HEX_BINARY.is_match(value),
            Builtin::Base64Binary => {
                let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
                BASE64.is_match(&compact)
            }
        };

        if ok {
            Ok(())
        } else {
            Err(format!("'{}' is not a valid value of the atomic type 'xs:{}'", value, self.name()))
        }
    }

    /// Local name in the XSD namespace.
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::AnyType => "anyType",
            Builtin::AnySimpleType => "anySimpleType",
            Builtin::String => "string",
            Builtin::NormalizedString => "normalizedString",
            Builtin::Token => "token",
            Builtin::Language => "language",
            Builtin::Name => "Name",
            Builtin::NcName => "NCName",
            Builtin::NmToken => "NMTOKEN",
            Builtin::NmTokens => "NMTOKENS",
            Builtin::Id => "ID",
            Builtin::IdRef => "IDREF",
            Builtin::IdRefs => "IDREFS",
            Builtin::Entity => "ENTITY",
            Builtin::Entities => "ENTITIES",
            Builtin::QName => "QName",
            Builtin::Notation => "NOTATION",
            Builtin::Boolean => "boolean",
            Builtin::Decimal => "decimal",
            Builtin::Integer => "integer",
            Builtin::NonPositiveInteger => "nonPositiveInteger",
            Builtin::NegativeInteger => "negativeInteger",
            Builtin::Long => "long",
            Builtin::Int => "int",
            Builtin::Short => "short",
            Builtin::Byte => "byte",
            Builtin::NonNegativeInteger => "nonNegativeInteger",
            Builtin::UnsignedLong => "unsignedLong",
            Builtin::UnsignedInt => "unsignedInt",
            Builtin::UnsignedShort => "unsignedShort",
            Builtin::UnsignedByte => "unsignedByte",
            Builtin::PositiveInteger => "positiveInteger",
            Builtin::Float => "float",
            Builtin::Double => "double",
            Builtin::Duration => "duration",
            Builtin::DateTime => "dateTime",
            Builtin::Date => "date",
            Builtin::Time => "time",
            Builtin::GYear => "gYear",
            Builtin::GYearMonth => "gYearMonth",
            Builtin::GMonth => "gMonth",
            Builtin::GMonthDay => "gMonthDay",
            Builtin::GDay => "gDay",
            Builtin::HexBinary => "hexBinary",
            Builtin::Base64Binary => "base64Binary",
            Builtin::AnyUri => "anyURI",
        }
    }
}

fn integer_in(value: &str, min: Option<i128>, max: Option<i128>) -> bool {
    if !INTEGER.is_match(value) {
        return false;
    }
    let Ok(number) = value.trim_start_matches('+').parse::<i128>() else {
        // out of i128 range: only the unbounded types accept it
        return min.is_none() && max.is_none();
    };
    min.is_none_or(|min| number >= min) && max.is_none_or(|max| number <= max)
}

fn in_range(digits: &str, min: u32, max: u32) -> bool {
    digits.parse::<u32>().is_ok_and(|n| (min..=max).contains(&n))
}

fn valid_date(value: &str) -> bool {
    // chrono handles four-digit positive years only; wider years pass lexically
    let unsigned = value.trim_start_matches('-');
    if unsigned.len() != 10 || value.starts_with('-') {
        return true;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn valid_time(value: &str) -> bool {
    if value.starts_with("24:00:00") {
        return value[8..].trim_start_matches('.').chars().all(|c| c == '0');
    }
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f").is_ok()
}

/// Restriction facets declared on one derivation step.
#[derive(Debug, Clone, Default)]
pub struct Facets {
    pub enumeration: Vec<String>,
    /// Patterns of one step; a value must match at least one.
    pub patterns: Vec<Regex>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub total_digits: Option<u32>,
    pub fraction_digits: Option<u32>,
    pub min_inclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_exclusive: Option<String>,
    pub white_space: Option<WhiteSpace>,
}

impl Facets {
    /// Record one facet element by its local name. Unknown facets are ignored.
    pub fn add(&mut self, facet: &str, value: &str) {
        match facet {
            "enumeration" => self.enumeration.push(value.to_string()),
            "pattern" => match compile_pattern(value) {
                Some(regex) => self.patterns.push(regex),
                None => warn!("Pattern facet '{}' is not supported, ignoring it", value),
            },
            "length" => self.length = value.trim().parse().ok(),
            "minLength" => self.min_length = value.trim().parse().ok(),
            "maxLength" => self.max_length = value.trim().parse().ok(),
            "totalDigits" => self.total_digits = value.trim().parse().ok(),
            "fractionDigits" => self.fraction_digits = value.trim().parse().ok(),
            "minInclusive" => self.min_inclusive = Some(value.trim().to_string()),
            "maxInclusive" => self.max_inclusive = Some(value.trim().to_string()),
            "minExclusive" => self.min_exclusive = Some(value.trim().to_string()),
            "maxExclusive" => self.max_exclusive = Some(value.trim().to_string()),
            "whiteSpace" => self.white_space = WhiteSpace::parse(value.trim()),
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enumeration.is_empty()
            && self.patterns.is_empty()
            && self.length.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.total_digits.is_none()
            && self.fraction_digits.is_none()
            && self.min_inclusive.is_none()
            && self.max_inclusive.is_none()
            && self.min_exclusive.is_none()
            && self.max_exclusive.is_none()
    }

    /// Check a normalized value. `primitive` is the built-in type at the
    /// bottom of the derivation chain, `items` the item count for lists.
    pub fn check(&self, value: &str, primitive: Builtin, items: Option<usize>) -> Result<(), String> {
        if !self.enumeration.is_empty() && !self.enumeration.iter().any(|e| same_value(e, value, primitive)) {
            return Err(format!(
                "'{}' is not an element of the set {{{}}}",
                value,
                self.enumeration
                    .iter()
                    .map(|e| format!("'{}'", e))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        if !self.patterns.is_empty() && !self.patterns.iter().any(|p| p.is_match(value)) {
            return Err(format!("'{}' is not accepted by the pattern facet", value));
        }

        let length = items.unwrap_or_else(|| primitive.measure(value));
        if let Some(expected) = self.length {
            if length != expected {
                return Err(format!("'{}' has a length of {}; this differs from the allowed length of {}", value, length, expected));
            }
        }
        if let Some(min) = self.min_length {
            if length < min {
                return Err(format!("'{}' has a length of {}; this underruns the allowed minimum length of {}", value, length, min));
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(format!("'{}' has a length of {}; this exceeds the allowed maximum length of {}", value, length, max));
            }
        }

        if self.total_digits.is_some() || self.fraction_digits.is_some() {
            let (total, fraction) = digit_counts(value);
            if let Some(max) = self.total_digits {
                if total > max {
                    return Err(format!("'{}' has more digits than are allowed ('{}')", value, max));
                }
            }
            if let Some(max) = self.fraction_digits {
                if fraction > max {
                    return Err(format!("'{}' has more fractional digits than are allowed ('{}')", value, max));
                }
            }
        }

        let bounds: [(&Option<String>, &str, fn(Ordering) -> bool); 4] = [
            (&self.min_inclusive, "less than the minimum value allowed", Ordering::is_lt),
            (&self.max_inclusive, "greater than the maximum value allowed", Ordering::is_gt),
            (&self.min_exclusive, "not greater than the exclusive minimum", Ordering::is_le),
            (&self.max_exclusive, "not less than the exclusive maximum", Ordering::is_ge),
        ];
        for (bound, message, violates) in bounds {
            let Some(bound) = bound else {
                continue;
            };
            if let Some(ordering) = compare(value, bound, primitive) {
                if violates(ordering) {
                    return Err(format!("The value '{}' is {} ('{}')", value, message, bound));
                }
            }
        }

        Ok(())
    }
}

fn same_value(enumerated: &str, value: &str, primitive: Builtin) -> bool {
    if primitive.is_numeric() {
        if let (Some(a), Some(b)) = (parse_decimal(enumerated), parse_decimal(value)) {
            return a == b;
        }
    }
    enumerated == value
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    if !DECIMAL.is_match(value) {
        return None;
    }
    Decimal::from_str(value.trim_start_matches('+')).ok()
}

fn compare(value: &str, bound: &str, primitive: Builtin) -> Option<Ordering> {
    if primitive.is_numeric() {
        if let (Some(a), Some(b)) = (parse_decimal(value), parse_decimal(bound)) {
            return Some(a.cmp(&b));
        }
        let a: f64 = value.parse().ok()?;
        let b: f64 = bound.parse().ok()?;
        return a.partial_cmp(&b);
    }
    // date and time values of equal shape order lexically
    (value.len() == bound.len()).then(|| value.cmp(bound))
}

/// Significant digits and fraction digits of a decimal lexical form.
fn digit_counts(value: &str) -> (u32, u32) {
    let unsigned = value.trim_start_matches(['+', '-']);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_digits = int_part.trim_start_matches('0');
    let frac_digits = frac_part.trim_end_matches('0');
    let total = (int_digits.len() + frac_digits.len()).max(1) as u32;
    (total, frac_digits.len() as u32)
}

/// Translate an XSD regular expression into an anchored `regex` pattern.
///
/// Returns `None` for constructs the `regex` crate cannot express
/// (character class subtraction, Unicode block escapes).
pub fn compile_pattern(pattern: &str) -> Option<Regex> {
    if pattern.contains("-[") || pattern.contains("\\p{Is") || pattern.contains("\\P{Is") {
        return None;
    }

    let mut translated = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('i') => translated.push_str(r"[\p{L}_:]"),
                Some('I') => translated.push_str(r"[^\p{L}_:]"),
                Some('c') => translated.push_str(r"[\p{L}\p{N}\p{M}._:\-]"),
                Some('C') => translated.push_str(r"[^\p{L}\p{N}\p{M}._:\-]"),
                Some(other) => {
                    translated.push('\\');
                    translated.push(other);
                }
                None => return None,
            },
            // XSD has no anchors; a bare ^ or $ outside a class is a literal
            '^' if !translated.ends_with('[') => translated.push_str(r"\^"),
            '$' => translated.push_str(r"\$"),
            _ => translated.push(c),
        }
    }

    Regex::new(&format!("^(?:{})$", translated)).ok()
}
