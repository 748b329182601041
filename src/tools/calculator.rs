//! 计算器：安全表达式求值，失败时按历史年份计算距今年数
//!
//! 表达式交给 evalexpr。先做写法归一：`**` 改为 `^`，`sqrt` / `ln` / `sin` 等补上 `math::` 前缀，
//! `pi` 换成数值，数字字面量一律写成浮点，使 `2+2` 得到 `4.0`、`3.5e2` 得到 `350.0`。
//! 只有形如「数字 + 可选纪元标记」的输入才进入年份模式；
//! 公元前标记（a.C. / a. C. / aC / a.n.e. / BC / BCE，不区分大小写）取负。

use std::fmt;
use std::sync::OnceLock;

use chrono::Datelike;
use regex::Regex;

use crate::tools::CapabilityError;

const EMPTY_INPUT: &str = "No hay expresión para calcular";
const YEAR_OUT_OF_RANGE: &str = "Error: año fuera de rango";

/// 可直接写的函数名，对应 evalexpr 的 `math::` 内建函数；`log` 按自然对数处理
const MATH_FUNCTIONS: &[(&str, &str)] = &[
    ("sqrt", "math::sqrt"),
    ("cbrt", "math::cbrt"),
    ("ln", "math::ln"),
    ("log", "math::ln"),
    ("log2", "math::log2"),
    ("log10", "math::log10"),
    ("exp", "math::exp"),
    ("sin", "math::sin"),
    ("cos", "math::cos"),
    ("tan", "math::tan"),
    ("asin", "math::asin"),
    ("acos", "math::acos"),
    ("atan", "math::atan"),
];

/// 计算结果：表达式得浮点，年份差得整数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Calculation {
    Value(f64),
    Years(i64),
}

impl fmt::Display for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Debug 保留 ".0"
            Calculation::Value(v) => write!(f, "{v:?}"),
            Calculation::Years(y) => write!(f, "{y}"),
        }
    }
}

static TOKEN_RE: OnceLock<Option<Regex>> = OnceLock::new();
static YEAR_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// 标识符（可带 `::` 路径）或数字字面量（可带指数）
fn token() -> Option<&'static Regex> {
    TOKEN_RE
        .get_or_init(|| {
            Regex::new(
                r"(?P<ident>[A-Za-z_][A-Za-z0-9_]*(?:::[A-Za-z_][A-Za-z0-9_]*)*)|(?P<num>\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)",
            )
            .ok()
        })
        .as_ref()
}

/// 整个输入只是一个年份，可带「año」前缀与纪元标记
fn year_pattern() -> Option<&'static Regex> {
    YEAR_RE
        .get_or_init(|| {
            Regex::new(
                r"(?i)^(?:(?:el\s+)?año\s+)?(?P<year>\d+)\s*(?:(?P<bce>a\.\s?c\.?|ac|a\.\s?n\.\s?e\.?|bce|bc)|(?P<ce>d\.\s?c\.?|dc|n\.\s?e\.?|ce|ad))?$",
            )
            .ok()
        })
        .as_ref()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator {
    /// None 时取本地当前年份
    current_year: Option<i32>,
}

impl Calculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_current_year(year: i32) -> Self {
        Self {
            current_year: Some(year),
        }
    }

    fn current_year(&self) -> i64 {
        self.current_year
            .unwrap_or_else(|| chrono::Local::now().year()) as i64
    }

    pub fn evaluate(&self, input: &str) -> Result<Calculation, CapabilityError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(CapabilityError::EmptyInput(EMPTY_INPUT));
        }
        match evaluate_expression(input) {
            Ok(v) => Ok(Calculation::Value(v)),
            Err(expr_err) => match self.years_since(input) {
                Some(years) => years.map(Calculation::Years),
                None => {
                    tracing::debug!(input, error = %expr_err, "neither an expression nor a year");
                    Err(CapabilityError::Backend(format!("Error: {expr_err}")))
                }
            },
        }
    }

    /// 不是年份写法时返回 None
    fn years_since(&self, input: &str) -> Option<Result<i64, CapabilityError>> {
        let caps = year_pattern()?.captures(input)?;
        let out_of_range = || CapabilityError::Backend(YEAR_OUT_OF_RANGE.to_string());
        let year = match caps["year"].parse::<i64>() {
            Ok(y) => y,
            Err(_) => return Some(Err(out_of_range())),
        };
        let year = if caps.name("bce").is_some() { -year } else { year };
        Some(self.current_year().checked_sub(year).ok_or_else(out_of_range))
    }
}

/// 浮点字面量始终带小数点，evalexpr 才按 Float 解析
fn float_literal(v: f64) -> String {
    let text = format!("{v}");
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

fn normalize_expression(input: &str) -> String {
    let input = input.replace("**", "^").replace('π', "pi");
    let Some(re) = token() else {
        return input;
    };
    re.replace_all(&input, |caps: &regex::Captures| {
        if let Some(ident) = caps.name("ident") {
            let name = ident.as_str();
            if name.eq_ignore_ascii_case("pi") {
                return float_literal(std::f64::consts::PI);
            }
            return MATH_FUNCTIONS
                .iter()
                .find(|(short, _)| *short == name)
                .map_or_else(|| name.to_string(), |(_, full)| full.to_string());
        }
        let lit = &caps["num"];
        match lit.parse::<f64>() {
            Ok(v) if v.is_finite() && lit.contains(['e', 'E']) => float_literal(v),
            _ if lit.contains('.') => lit.to_string(),
            _ => format!("{lit}.0"),
        }
    })
    .into_owned()
}

fn evaluate_expression(input: &str) -> Result<f64, String> {
    match evalexpr::eval(&normalize_expression(input)) {
        Ok(evalexpr::Value::Float(f)) if f.is_finite() => Ok(f),
        Ok(evalexpr::Value::Float(_)) => Err("resultado no finito".to_string()),
        Ok(evalexpr::Value::Int(i)) => Ok(i as f64),
        Ok(other) => Err(format!("no es un número: {other}")),
        Err(e) => Err(e.to_string()),
    }
}
