//! Single-predicate property filters (`pop > 1000000`, `country == 'FR'`).

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use geojson::{Feature, JsonValue};
use regex::Regex;

use crate::error::QueryError;

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+)\s*(==|!=|>=|<=|>|<)\s*(.+)$")
        .unwrap_or_else(|err| panic!("invalid filter pattern: {err}"))
});

/// Comparison operators of the filter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Operator {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "==" => Self::Eq,
            "!=" => Self::Ne,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

/// A parsed `<column> <op> <value>` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    pub column: String,
    pub op: Operator,
    pub value: Literal,
}

impl FromStr for FilterExpr {
    type Err = QueryError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let syntax_error = || QueryError::FilterSyntax {
            expression: expression.to_string(),
        };
        let captures = EXPRESSION
            .captures(expression.trim())
            .ok_or_else(syntax_error)?;
        let op = Operator::parse(&captures[2]).ok_or_else(syntax_error)?;
        let raw = captures[3].trim();

        let value = if let Some(text) = unquote(raw) {
            Literal::Text(text.to_string())
        } else if let Some(number) = parse_number(raw) {
            Literal::Number(number)
        } else {
            Literal::Text(raw.to_string())
        };

        Ok(Self {
            column: captures[1].to_string(),
            op,
            value,
        })
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Literal::Number(n) => write!(f, "{} {} {n}", self.column, self.op.as_str()),
            Literal::Text(s) => write!(f, "{} {} '{s}'", self.column, self.op.as_str()),
        }
    }
}

impl FilterExpr {
    /// Evaluate the predicate against one feature.
    ///
    /// A missing or null property only satisfies `!=`.
    #[must_use]
    pub fn matches(&self, feature: &Feature) -> bool {
        let Some(property) = feature.property(&self.column).filter(|v| !v.is_null()) else {
            return self.op == Operator::Ne;
        };

        match self.op {
            Operator::Eq => self.equals(property),
            Operator::Ne => !self.equals(property),
            Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => {
                let (Some(left), Some(right)) = (as_number(property), self.number()) else {
                    return false;
                };
                match self.op {
                    Operator::Gt => left > right,
                    Operator::Lt => left < right,
                    Operator::Ge => left >= right,
                    _ => left <= right,
                }
            },
        }
    }

    fn equals(&self, property: &JsonValue) -> bool {
        match &self.value {
            #[allow(clippy::float_cmp)]
            Literal::Number(number) => as_number(property).is_some_and(|v| v == *number),
            Literal::Text(text) => text_form(property) == *text,
        }
    }

    fn number(&self) -> Option<f64> {
        match &self.value {
            Literal::Number(n) => Some(*n),
            Literal::Text(text) => parse_number(text),
        }
    }
}

fn unquote(raw: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|quote| {
        raw.strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
    })
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Numeric view of a property; numeric strings coerce, booleans do not.
fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => parse_number(s),
        _ => None,
    }
}

fn text_form(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
