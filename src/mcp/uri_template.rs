//! RFC 6570 subset used to resolve concrete resource URIs
//!
//! Supports simple string expansion `{var}`, matching exactly one non-empty path
//! component, and path explosion `{var*}`, matching one or more non-empty
//! components joined by `/`. Templates are compiled to an anchored regex once,
//! at registration time.

use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

/// Variables bound by a successful match, keyed by template variable name.
pub type UriVariables = BTreeMap<String, String>;

const SEGMENT_PATTERN: &str = "[^/]+";
const EXPLODED_PATTERN: &str = "[^/]+(?:/[^/]+)*";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriTemplateError {
    #[error("template is empty")]
    Empty,
    #[error("unclosed variable expression")]
    UnclosedVariable,
    #[error("unexpected closing brace")]
    UnexpectedCloseBrace,
    #[error("variable name must not be empty")]
    EmptyVariable,
    #[error("invalid variable name {0}")]
    InvalidVariableName(String),
    #[error("unsupported expression operator in {0}")]
    UnsupportedOperator(String),
    #[error("variable {0} appears more than once")]
    DuplicateVariable(String),
    #[error("variables {0} and {1} are not separated by literal text")]
    AdjacentVariables(String, String),
    #[error("template did not compile: {0}")]
    Compile(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Variable { name: String, explode: bool },
}

#[derive(Debug, Clone)]
pub struct UriTemplate {
    template: String,
    parts: Vec<Part>,
    variables: Vec<String>,
    matcher: Regex,
}

impl UriTemplate {
    pub fn parse(template: &str) -> Result<Self, UriTemplateError> {
        if template.is_empty() {
            return Err(UriTemplateError::Empty);
        }

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }

                    let mut expression = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        expression.push(inner);
                    }
                    if !closed {
                        return Err(UriTemplateError::UnclosedVariable);
                    }

                    parts.push(parse_expression(&expression)?);
                }
                '}' => return Err(UriTemplateError::UnexpectedCloseBrace),
                _ => literal.push(ch),
            }
        }

        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        let mut variables: Vec<String> = Vec::new();
        let mut previous_variable: Option<&str> = None;
        for part in &parts {
            match part {
                Part::Literal(_) => previous_variable = None,
                Part::Variable { name, .. } => {
                    if let Some(previous) = previous_variable {
                        return Err(UriTemplateError::AdjacentVariables(
                            previous.to_string(),
                            name.clone(),
                        ));
                    }
                    if variables.contains(name) {
                        return Err(UriTemplateError::DuplicateVariable(name.clone()));
                    }
                    variables.push(name.clone());
                    previous_variable = Some(name);
                }
            }
        }

        let mut pattern = String::from("^");
        for part in &parts {
            match part {
                Part::Literal(text) => pattern.push_str(&regex::escape(text)),
                Part::Variable { explode: false, .. } => {
                    pattern.push('(');
                    pattern.push_str(SEGMENT_PATTERN);
                    pattern.push(')');
                }
                Part::Variable { explode: true, .. } => {
                    pattern.push('(');
                    pattern.push_str(EXPLODED_PATTERN);
                    pattern.push(')');
                }
            }
        }
        pattern.push('$');

        let matcher =
            Regex::new(&pattern).map_err(|err| UriTemplateError::Compile(err.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            parts,
            variables,
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Literal text before the first variable expression.
    pub fn literal_prefix(&self) -> &str {
        match self.parts.first() {
            Some(Part::Literal(text)) => text,
            _ => "",
        }
    }

    /// Structural match of a whole URI. Returns the bound variables, or `None`
    /// when any literal differs or a variable would bind an empty component.
    pub fn matches(&self, uri: &str) -> Option<UriVariables> {
        let captures = self.matcher.captures(uri)?;

        let mut bound = UriVariables::new();
        for (index, name) in self.variables.iter().enumerate() {
            let value = captures.get(index + 1)?;
            bound.insert(name.clone(), value.as_str().to_string());
        }

        Some(bound)
    }
}

impl PartialEq for UriTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

fn parse_expression(expression: &str) -> Result<Part, UriTemplateError> {
    if expression.is_empty() {
        return Err(UriTemplateError::EmptyVariable);
    }

    if let Some(first) = expression.chars().next() {
        if matches!(
            first,
            '+' | '#' | '.' | '/' | ';' | '?' | '&' | '=' | ',' | '!' | '@' | '|'
        ) {
            return Err(UriTemplateError::UnsupportedOperator(expression.to_string()));
        }
    }

    let (name, explode) = match expression.strip_suffix('*') {
        Some(name) => (name, true),
        None => (expression, false),
    };

    if name.is_empty() {
        return Err(UriTemplateError::EmptyVariable);
    }

    if !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(UriTemplateError::InvalidVariableName(name.to_string()));
    }

    Ok(Part::Variable {
        name: name.to_string(),
        explode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_variable_binds_one_component() {
        let template = UriTemplate::parse("note://{id}").expect("valid template");

        let bound = template.matches("note://abc").expect("should match");
        assert_eq!(bound.get("id").map(String::as_str), Some("abc"));
        assert!(template.matches("note://a/b/c").is_none());
    }

    #[test]
    fn exploded_variable_consumes_remaining_components() {
        let template = UriTemplate::parse("note://{path*}").expect("valid template");

        let bound = template.matches("note://a/b/c").expect("should match");
        assert_eq!(bound.get("path").map(String::as_str), Some("a/b/c"));

        let single = template.matches("note://abc").expect("single component");
        assert_eq!(single.get("path").map(String::as_str), Some("abc"));
    }

    #[test]
    fn empty_components_never_match() {
        let single = UriTemplate::parse("note://{id}").expect("valid template");
        let exploded = UriTemplate::parse("note://{path*}").expect("valid template");

        assert!(single.matches("note://").is_none());
        assert!(exploded.matches("note://").is_none());
        assert!(exploded.matches("note://a//b").is_none());
        assert!(exploded.matches("note://a/b/").is_none());
    }

    #[test]
    fn literal_suffix_after_exploded_variable() {
        let template = UriTemplate::parse("note:///{path*}.md").expect("valid template");

        let bound = template
            .matches("note:///projects/rust/ideas.md")
            .expect("should match");
        assert_eq!(
            bound.get("path").map(String::as_str),
            Some("projects/rust/ideas")
        );
        assert!(template.matches("note:///projects/ideas.txt").is_none());
    }

    #[test]
    fn literals_are_not_regex_syntax() {
        let template = UriTemplate::parse("file://docs.v1/{name}").expect("valid template");

        assert!(template.matches("file://docs.v1/readme").is_some());
        assert!(template.matches("file://docsXv1/readme").is_none());
    }

    #[test]
    fn multiple_variables_bind_in_order() {
        let template =
            UriTemplate::parse("timeline://{start}/{end}").expect("valid template");

        let bound = template.matches("timeline://10/20").expect("should match");
        assert_eq!(bound.get("start").map(String::as_str), Some("10"));
        assert_eq!(bound.get("end").map(String::as_str), Some("20"));
        assert_eq!(template.variables(), ["start", "end"]);
    }

    #[test]
    fn literal_prefix_is_text_before_first_variable() {
        let template = UriTemplate::parse("note:///{path*}.md").expect("valid template");
        assert_eq!(template.literal_prefix(), "note:///");

        let bare = UriTemplate::parse("{id}").expect("valid template");
        assert_eq!(bare.literal_prefix(), "");
    }

    #[test]
    fn rejects_malformed_templates() {
        assert_eq!(UriTemplate::parse("").unwrap_err(), UriTemplateError::Empty);
        assert_eq!(
            UriTemplate::parse("note://{id").unwrap_err(),
            UriTemplateError::UnclosedVariable
        );
        assert_eq!(
            UriTemplate::parse("note://id}").unwrap_err(),
            UriTemplateError::UnexpectedCloseBrace
        );
        assert_eq!(
            UriTemplate::parse("note://{}").unwrap_err(),
            UriTemplateError::EmptyVariable
        );
        assert_eq!(
            UriTemplate::parse("note://{+path}").unwrap_err(),
            UriTemplateError::UnsupportedOperator("+path".to_string())
        );
        assert_eq!(
            UriTemplate::parse("note://{a-b}").unwrap_err(),
            UriTemplateError::InvalidVariableName("a-b".to_string())
        );
        assert_eq!(
            UriTemplate::parse("note://{a}/{a}").unwrap_err(),
            UriTemplateError::DuplicateVariable("a".to_string())
        );
        assert_eq!(
            UriTemplate::parse("note://{a}{b}").unwrap_err(),
            UriTemplateError::AdjacentVariables("a".to_string(), "b".to_string())
        );
    }
}
