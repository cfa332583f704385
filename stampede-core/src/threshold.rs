use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Aggregate of a metric that a threshold compares against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Statistic {
    Avg,
    Min,
    Max,
    Med,
    Sum,
    Count,
    /// Percentile in `[0, 100]`, written `p(95)`.
    Percentile(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
            Self::Eq => observed == bound,
            Self::Ne => observed != bound,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

/// A predicate such as `avg<200` or `p(95) <= 350`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdExpr {
    pub statistic: Statistic,
    pub comparison: Comparison,
    pub value: f64,
}

impl ThresholdExpr {
    pub fn new(statistic: Statistic, comparison: Comparison, value: f64) -> Self {
        Self {
            statistic,
            comparison,
            value,
        }
    }
}

/// A pass/fail predicate bound to one metric name.
#[derive(Clone, Debug, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expr: ThresholdExpr,
}

impl Threshold {
    pub fn new(metric: &str, expr: ThresholdExpr) -> Self {
        Self {
            metric: metric.to_string(),
            expr,
        }
    }

    /// Parse `expr` (for example `"avg<200"`) for `metric`.
    pub fn parse(metric: &str, expr: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(metric, expr.parse()?))
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => write!(f, "avg"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Med => write!(f, "med"),
            Self::Sum => write!(f, "sum"),
            Self::Count => write!(f, "count"),
            Self::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.statistic, self.comparison.as_str(), self.value)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expr)
    }
}

impl FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "med" => Ok(Self::Med),
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            _ => {
                let inner = s
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| format!("unknown statistic \"{s}\""))?;
                let p: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid percentile \"{inner}\""))?;
                if (0. ..=100.).contains(&p) {
                    Ok(Self::Percentile(p))
                } else {
                    Err(format!("percentile {p} is outside [0, 100]"))
                }
            }
        }
    }
}

impl FromStr for ThresholdExpr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidThreshold {
            expr: s.to_string(),
            reason,
        };

        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let op_start = compact
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| invalid("missing comparison operator".to_string()))?;
        let (lhs, rest) = compact.split_at(op_start);

        // Longest operators first so `<=` is not read as `<`.
        let (comparison, rhs) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .into_iter()
        .find_map(|(token, comparison)| rest.strip_prefix(token).map(|rhs| (comparison, rhs)))
        .ok_or_else(|| invalid(format!("unknown operator in \"{rest}\"")))?;

        let statistic = lhs.parse::<Statistic>().map_err(invalid)?;
        let value = rhs
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(format!("\"{rhs}\" is not a number")))?;

        Ok(Self {
            statistic,
            comparison,
            value,
        })
    }
}
