//! Declarative environment-variable override rules with typed coercion.

use std::num::ParseIntError;

use serde_json::Value;
use thiserror::Error;

use crate::env::Environment;

/// Strings recognised as `true` by the boolean coercion.
pub const TRUE_WORDS: [&str; 5] = ["1", "true", "yes", "y", "on"];

/// Type coercion applied to an environment override value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Keep the value as a string.
    None,
    /// Parse the value as a base-10 signed integer; failure is fatal.
    Integer,
    /// Map the value through the [`TRUE_WORDS`] vocabulary; anything else
    /// coerces to `false`.
    Boolean,
}

impl Coercion {
    fn apply(self, variable: &str, raw: &str) -> Result<Value, CoercionError> {
        match self {
            Self::None => Ok(Value::String(raw.to_owned())),
            Self::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|source| CoercionError::Integer {
                    variable: variable.to_owned(),
                    value: raw.to_owned(),
                    source,
                }),
            Self::Boolean => Ok(Value::Bool(truthy(raw))),
        }
    }
}

fn truthy(raw: &str) -> bool {
    let token = raw.trim().to_ascii_lowercase();
    TRUE_WORDS.contains(&token.as_str())
}

/// Declarative mapping from one environment variable to one document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideRule {
    /// Environment variable consulted.
    pub variable: &'static str,
    /// Document key written when the variable is set and non-empty.
    pub key: &'static str,
    /// Coercion applied to the raw value.
    pub coercion: Coercion,
}

impl OverrideRule {
    /// Builds a rule.
    pub const fn new(variable: &'static str, key: &'static str, coercion: Coercion) -> Self {
        Self {
            variable,
            key,
            coercion,
        }
    }

    /// Reads and coerces the rule's variable.
    ///
    /// Returns `Ok(None)` when the variable is unset or empty, leaving any
    /// existing document key untouched.
    pub fn evaluate(&self, env: &impl Environment) -> Result<Option<Value>, CoercionError> {
        match env.non_empty(self.variable) {
            Some(raw) => self.coercion.apply(self.variable, &raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Fatal coercion failure of an environment override value.
#[derive(Debug, Error)]
pub enum CoercionError {
    /// The value was not a base-10 integer.
    #[error("environment variable {variable} must be a base-10 integer, got '{value}': {source}")]
    Integer {
        /// Variable holding the malformed value.
        variable: String,
        /// The raw value that failed to parse.
        value: String,
        /// Underlying parse error.
        #[source]
        source: ParseIntError,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn env_with(variable: &str, value: &str) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert(variable.to_owned(), value.to_owned());
        vars
    }

    #[rstest]
    #[case("1", true)]
    #[case("true", true)]
    #[case("Yes", true)]
    #[case("  Y  ", true)]
    #[case("ON", true)]
    #[case("off", false)]
    #[case("0", false)]
    #[case("maybe", false)]
    fn boolean_coercion_uses_fixed_vocabulary(#[case] raw: &str, #[case] expected: bool) {
        let rule = OverrideRule::new("FLAG", "flag", Coercion::Boolean);
        let value = rule
            .evaluate(&env_with("FLAG", raw))
            .expect("boolean coercion never fails");
        assert_eq!(value, Some(Value::Bool(expected)));
    }

    #[rstest]
    #[case("4", json!(4))]
    #[case(" 42 ", json!(42))]
    #[case("-7", json!(-7))]
    fn integer_coercion_parses_base_ten(#[case] raw: &str, #[case] expected: Value) {
        let rule = OverrideRule::new("COUNT", "count", Coercion::Integer);
        let value = rule
            .evaluate(&env_with("COUNT", raw))
            .expect("integer should parse");
        assert_eq!(value, Some(expected));
    }

    #[rstest]
    #[case("four")]
    #[case("4.5")]
    #[case("99999999999999999999")]
    fn integer_coercion_failures_are_fatal(#[case] raw: &str) {
        let rule = OverrideRule::new("COUNT", "count", Coercion::Integer);
        let error = rule
            .evaluate(&env_with("COUNT", raw))
            .expect_err("malformed integer should fail");
        assert!(matches!(error, CoercionError::Integer { .. }));
    }

    #[test]
    fn unset_or_empty_variables_do_not_fire() {
        let rule = OverrideRule::new("NAME", "name", Coercion::None);
        assert_eq!(rule.evaluate(&HashMap::new()).ok(), Some(None));
        assert_eq!(rule.evaluate(&env_with("NAME", "")).ok(), Some(None));
    }

    #[test]
    fn verbatim_values_stay_strings() {
        let rule = OverrideRule::new("NAME", "name", Coercion::None);
        let value = rule
            .evaluate(&env_with("NAME", "qwen3-coder"))
            .expect("verbatim values never fail");
        assert_eq!(value, Some(json!("qwen3-coder")));
    }
}
