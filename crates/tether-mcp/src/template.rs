//! URI templates for parameterized resources
//!
//! Two template shapes are understood:
//!
//! - query style, e.g. `res://shot{?view,width}`: the expressions are dropped and
//!   the remaining base must equal the candidate URI with its query removed
//! - path style, e.g. `res://parts/{id}/faces`: each `{var}` matches exactly one
//!   path segment and is captured under its name

use regex::Regex;
use serde_json::Value;
use url::form_urlencoded;

use crate::item::Arguments;

/// Errors raised while compiling a template
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unclosed expression at byte {position} in template: {template}")]
    UnclosedExpression { template: String, position: usize },

    #[error("Empty expression in template: {0}")]
    EmptyExpression(String),

    #[error("Invalid variable name '{name}' in template: {template}")]
    InvalidVariable { template: String, name: String },

    #[error("Duplicate variable '{name}' in template: {template}")]
    DuplicateVariable { template: String, name: String },

    #[error("Unsupported operator '{operator}' in template: {template}")]
    UnsupportedOperator { template: String, operator: char },

    #[error("Invalid template pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone)]
enum Matcher {
    Query { base: String },
    Path { pattern: Regex },
}

/// Compiled URI template
#[derive(Debug, Clone)]
pub struct UriTemplate {
    raw: String,
    variables: Vec<String>,
    matcher: Matcher,
}

enum Segment<'a> {
    Literal(&'a str),
    Expression(&'a str),
}

impl UriTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let segments = split(template)?;

        let query_style = segments
            .iter()
            .any(|s| matches!(s, Segment::Expression(e) if e.starts_with(['?', '&'])));

        let mut variables: Vec<String> = Vec::new();
        for segment in &segments {
            let Segment::Expression(expr) = segment else {
                continue;
            };
            let body = match expr.chars().next() {
                Some('?') | Some('&') if query_style => &expr[1..],
                Some(op) if !op.is_ascii_alphanumeric() && op != '_' => {
                    return Err(TemplateError::UnsupportedOperator {
                        template: template.to_string(),
                        operator: op,
                    })
                }
                _ => expr,
            };
            for name in body.split(',') {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(TemplateError::InvalidVariable {
                        template: template.to_string(),
                        name: name.to_string(),
                    });
                }
                if variables.iter().any(|v| v == name) {
                    return Err(TemplateError::DuplicateVariable {
                        template: template.to_string(),
                        name: name.to_string(),
                    });
                }
                variables.push(name.to_string());
            }
        }

        let matcher = if query_style {
            let base: String = segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Literal(text) => Some(*text),
                    Segment::Expression(_) => None,
                })
                .collect();
            Matcher::Query {
                base: base.trim_end_matches('/').to_string(),
            }
        } else {
            let mut pattern = String::from("^");
            for segment in &segments {
                match segment {
                    Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                    Segment::Expression(expr) => {
                        // `{a,b}` in path position still occupies one segment per name
                        let groups = vec!["([^/]+)"; expr.split(',').count()];
                        pattern.push_str(&groups.join(","));
                    }
                }
            }
            pattern.push('$');
            Matcher::Path {
                pattern: Regex::new(&pattern)?,
            }
        };

        Ok(Self {
            raw: template.to_string(),
            variables,
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn is_query_style(&self) -> bool {
        matches!(self.matcher, Matcher::Query { .. })
    }

    /// Match a concrete URI, returning the captured path variables.
    ///
    /// Query-style templates capture nothing here; their values come from
    /// [`query_arguments`].
    pub fn matches(&self, uri: &str) -> Option<Arguments> {
        let path = strip_query(uri);
        match &self.matcher {
            Matcher::Query { base } => {
                (path.trim_end_matches('/') == base).then(Arguments::new)
            }
            Matcher::Path { pattern } => {
                let captures = pattern.captures(path)?;
                let mut arguments = Arguments::new();
                for (name, capture) in self.variables.iter().zip(captures.iter().skip(1)) {
                    if let Some(capture) = capture {
                        arguments.insert(name.clone(), Value::String(capture.as_str().to_string()));
                    }
                }
                Some(arguments)
            }
        }
    }
}

impl std::fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        let Some(len) = rest[open..].find('}') else {
            return Err(TemplateError::UnclosedExpression {
                template: template.to_string(),
                position: offset + open,
            });
        };
        let expr = &rest[open + 1..open + len];
        if expr.is_empty() {
            return Err(TemplateError::EmptyExpression(template.to_string()));
        }
        segments.push(Segment::Expression(expr));
        offset += open + len + 1;
        rest = &rest[open + len + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

/// URI without its query string and fragment
pub fn strip_query(uri: &str) -> &str {
    match uri.find(['?', '#']) {
        Some(idx) => &uri[..idx],
        None => uri,
    }
}

/// Parse the query string of `uri` into string arguments.
///
/// The first value of a repeated key wins and blank values are skipped.
pub fn query_arguments(uri: &str) -> Arguments {
    let mut arguments = Arguments::new();
    let uri = match uri.find('#') {
        Some(idx) => &uri[..idx],
        None => uri,
    };
    let Some(start) = uri.find('?') else {
        return arguments;
    };
    let query = &uri[start + 1..];

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        arguments
            .entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    arguments
}
