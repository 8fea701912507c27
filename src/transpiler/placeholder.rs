use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OnedbError;
use crate::value::Value;

/// How bound parameters are spelled in generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceholderStyle {
    /// `%s`
    Format,
    /// `$1`, `$2`, ...
    Dollar,
    /// `?`
    Question,
    /// `:1`, `:2`, ...
    Numeric,
    /// `:p1`, `:p2`, ...
    Named,
    /// `@p1`, `@p2`, ...
    At,
}

impl PlaceholderStyle {
    /// The placeholder for the 1-based parameter `index`.
    pub fn render(&self, index: usize) -> String {
        match self {
            PlaceholderStyle::Format => "%s".to_string(),
            PlaceholderStyle::Dollar => format!("${}", index),
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Numeric => format!(":{}", index),
            PlaceholderStyle::Named => format!(":p{}", index),
            PlaceholderStyle::At => format!("@p{}", index),
        }
    }
}

impl fmt::Display for PlaceholderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaceholderStyle::Format => "format",
            PlaceholderStyle::Dollar => "dollar",
            PlaceholderStyle::Question => "qmark",
            PlaceholderStyle::Numeric => "numeric",
            PlaceholderStyle::Named => "named",
            PlaceholderStyle::At => "at",
        };
        f.write_str(name)
    }
}

impl FromStr for PlaceholderStyle {
    type Err = OnedbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "%s" | "format" | "pyformat" => Ok(PlaceholderStyle::Format),
            "$" | "$n" | "$1" | "dollar" => Ok(PlaceholderStyle::Dollar),
            "?" | "qmark" | "question" => Ok(PlaceholderStyle::Question),
            ":n" | ":1" | "numeric" => Ok(PlaceholderStyle::Numeric),
            ":name" | ":p1" | "named" => Ok(PlaceholderStyle::Named),
            "@" | "@p1" | "at" => Ok(PlaceholderStyle::At),
            other => Err(OnedbError::InvalidQuery(format!(
                "unknown placeholder style '{}'",
                other
            ))),
        }
    }
}

/// Collects bound parameters while a statement is rendered.
#[derive(Debug)]
pub struct ParamContext {
    style: PlaceholderStyle,
    params: Vec<Value>,
}

impl ParamContext {
    pub fn new(style: PlaceholderStyle) -> Self {
        Self {
            style,
            params: Vec::new(),
        }
    }

    /// Bind `value` and return the placeholder that refers to it.
    pub fn add_param(&mut self, value: Value) -> String {
        self.params.push(value);
        self.style.render(self.params.len())
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_render() {
        assert_eq!(PlaceholderStyle::Dollar.render(3), "$3");
        assert_eq!(PlaceholderStyle::At.render(1), "@p1");
        assert_eq!(PlaceholderStyle::Named.render(2), ":p2");
        assert_eq!(PlaceholderStyle::Format.render(9), "%s");
    }

    #[test]
    fn test_placeholder_parse() {
        assert_eq!("%s".parse::<PlaceholderStyle>().unwrap(), PlaceholderStyle::Format);
        assert_eq!("qmark".parse::<PlaceholderStyle>().unwrap(), PlaceholderStyle::Question);
        assert!("{}".parse::<PlaceholderStyle>().is_err());
    }

    #[test]
    fn test_param_context_numbers_in_order() {
        let mut ctx = ParamContext::new(PlaceholderStyle::Dollar);
        assert_eq!(ctx.add_param(Value::from(1)), "$1");
        assert_eq!(ctx.add_param(Value::from("x")), "$2");
        assert_eq!(ctx.into_params().len(), 2);
    }
}
