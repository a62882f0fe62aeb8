// ABOUTME: Structured per-table row filters for the export query
// ABOUTME: Parses predicate strings into conditions and renders parameterized WHERE clauses

use crate::error::SyncError;
use crate::mysql::quote_identifier;
use serde::Deserialize;
use std::fmt;

/// Literal compared against a column in a filter condition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Integer(i) => write!(f, "{}", i),
            FilterValue::Float(v) => write!(f, "{}", v),
            FilterValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl FilterOperator {
    fn sql(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "<>",
            FilterOperator::Lt => "<",
            FilterOperator::Le => "<=",
            FilterOperator::Gt => ">",
            FilterOperator::Ge => ">=",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
        }
    }

    fn is_list(self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::NotIn)
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(FilterOperator::Eq),
            "!=" | "<>" => Some(FilterOperator::Ne),
            "<" => Some(FilterOperator::Lt),
            "<=" => Some(FilterOperator::Le),
            ">" => Some(FilterOperator::Gt),
            ">=" => Some(FilterOperator::Ge),
            _ => None,
        }
    }
}

/// One `column <op> value(s)` condition
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub op: FilterOperator,
    #[serde(default)]
    pub values: Vec<FilterValue>,
}

impl FilterCondition {
    fn validate(&self) -> Result<(), SyncError> {
        if self.column.trim().is_empty() {
            return Err(SyncError::Config(
                "Filter condition is missing a column name".to_string(),
            ));
        }
        if self.op.is_list() {
            if self.values.is_empty() {
                return Err(SyncError::Config(format!(
                    "Filter on '{}' uses {} with an empty value list",
                    self.column,
                    self.op.sql()
                )));
            }
        } else if self.values.len() != 1 {
            return Err(SyncError::Config(format!(
                "Filter on '{}' uses '{}' and needs exactly one value, got {}",
                self.column,
                self.op.sql(),
                self.values.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        if self.op.is_list() {
            write!(f, "{} {} ({})", self.column, self.op.sql(), values.join(", "))
        } else {
            write!(f, "{} {} {}", self.column, self.op.sql(), values.join(""))
        }
    }
}

/// WHERE clause text (without the keyword) plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<FilterValue>,
}

/// Row filter applied to a table's count and export queries
#[derive(Debug, Clone, PartialEq)]
pub enum TableFilter {
    /// ANDed conditions, rendered with quoted identifiers and bound parameters
    Conditions(Vec<FilterCondition>),
    /// Caller-trusted expression appended verbatim
    Raw(String),
}

impl TableFilter {
    /// Parse a predicate string such as `removed_by_user_id IN (106, 109)`
    ///
    /// Accepted grammar: conditions joined by `AND`, each one of
    /// `column <op> value` (op is `=`, `!=`, `<>`, `<`, `<=`, `>`, `>=`) or
    /// `column [NOT] IN (value, ...)`. Columns are bare or backtick-quoted,
    /// values are numbers or single-quoted strings (`''` escapes a quote).
    ///
    /// # Examples
    ///
    /// ```
    /// # use mysql_sqlite_exporter::filters::{FilterOperator, TableFilter};
    /// let filter = TableFilter::parse("uploaded_by IN (106, 109)").unwrap();
    /// let clause = filter.where_clause();
    /// assert_eq!(clause.sql, "`uploaded_by` IN (?, ?)");
    /// assert_eq!(clause.params.len(), 2);
    /// ```
    pub fn parse(expression: &str) -> Result<Self, SyncError> {
        let tokens = tokenize(expression)?;
        let conditions = Parser {
            tokens,
            position: 0,
            source: expression,
        }
        .parse_conditions()?;
        Self::from_conditions(conditions)
    }

    pub fn from_conditions(conditions: Vec<FilterCondition>) -> Result<Self, SyncError> {
        if conditions.is_empty() {
            return Err(SyncError::Config("Filter has no conditions".to_string()));
        }
        for condition in &conditions {
            condition.validate()?;
        }
        Ok(TableFilter::Conditions(conditions))
    }

    pub fn where_clause(&self) -> WhereClause {
        match self {
            TableFilter::Raw(expression) => WhereClause {
                sql: expression.clone(),
                params: Vec::new(),
            },
            TableFilter::Conditions(conditions) => {
                let mut params = Vec::new();
                let parts: Vec<String> = conditions
                    .iter()
                    .map(|condition| {
                        params.extend(condition.values.iter().cloned());
                        let column = quote_identifier(&condition.column);
                        if condition.op.is_list() {
                            let placeholders = vec!["?"; condition.values.len()].join(", ");
                            format!("{} {} ({})", column, condition.op.sql(), placeholders)
                        } else {
                            format!("{} {} ?", column, condition.op.sql())
                        }
                    })
                    .collect();
                WhereClause {
                    sql: parts.join(" AND "),
                    params,
                }
            }
        }
    }
}

impl fmt::Display for TableFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFilter::Raw(expression) => write!(f, "{} (raw)", expression),
            TableFilter::Conditions(conditions) => {
                let parts: Vec<String> = conditions.iter().map(|c| c.to_string()).collect();
                write!(f, "{}", parts.join(" AND "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident { name: String, quoted: bool },
    Number(String),
    Str(String),
    Op(String),
    LParen,
    RParen,
    Comma,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, SyncError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let error = |msg: String| SyncError::Config(format!("Invalid filter '{}': {}", expression, msg));

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '`' => {
                let mut name = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(error("unterminated quoted identifier".to_string())),
                        Some('`') if chars.get(i + 1) == Some(&'`') => {
                            name.push('`');
                            i += 2;
                        }
                        Some('`') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            name.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Ident { name, quoted: true });
            }
            '\'' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(error("unterminated string literal".to_string())),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            text.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '<' | '>' | '=' | '!' => {
                let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                let symbol = if matches!(two.as_str(), "<=" | ">=" | "<>" | "!=") {
                    two
                } else if c == '!' {
                    return Err(error("unexpected '!'".to_string()));
                } else {
                    c.to_string()
                };
                i += symbol.len();
                tokens.push(Token::Op(symbol));
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '.')
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident {
                    name: chars[start..i].iter().collect(),
                    quoted: false,
                });
            }
            other => return Err(error(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self, msg: &str) -> SyncError {
        SyncError::Config(format!(
            "Invalid filter '{}': {}. Use 'raw_filter' for expressions outside the supported grammar",
            self.source, msg
        ))
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
        matches!(token, Some(Token::Ident { name, quoted: false }) if name.eq_ignore_ascii_case(keyword))
    }

    fn parse_conditions(mut self) -> Result<Vec<FilterCondition>, SyncError> {
        let mut conditions = Vec::new();
        loop {
            conditions.push(self.parse_condition()?);
            match self.peek() {
                None => break,
                token if Self::is_keyword(token, "and") => {
                    self.position += 1;
                }
                _ => return Err(self.error("expected AND or end of expression")),
            }
        }
        Ok(conditions)
    }

    fn parse_condition(&mut self) -> Result<FilterCondition, SyncError> {
        let column = match self.next() {
            Some(Token::Ident { name, quoted }) => {
                if !quoted && is_reserved(&name) {
                    return Err(self.error(&format!("expected a column name, found '{}'", name)));
                }
                name
            }
            _ => return Err(self.error("expected a column name")),
        };

        let op = match self.next() {
            Some(Token::Op(symbol)) => FilterOperator::from_symbol(&symbol)
                .ok_or_else(|| self.error(&format!("unknown operator '{}'", symbol)))?,
            token if Self::is_keyword(token.as_ref(), "in") => FilterOperator::In,
            token if Self::is_keyword(token.as_ref(), "not") => {
                if !Self::is_keyword(self.next().as_ref(), "in") {
                    return Err(self.error("expected IN after NOT"));
                }
                FilterOperator::NotIn
            }
            _ => return Err(self.error(&format!("expected an operator after '{}'", column))),
        };

        let values = if op.is_list() {
            self.parse_list()?
        } else {
            vec![self.parse_value()?]
        };

        Ok(FilterCondition { column, op, values })
    }

    fn parse_list(&mut self) -> Result<Vec<FilterValue>, SyncError> {
        if self.next() != Some(Token::LParen) {
            return Err(self.error("expected '(' after IN"));
        }
        let mut values = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.position += 1;
            return Ok(values);
        }
        loop {
            values.push(self.parse_value()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                _ => return Err(self.error("expected ',' or ')' in value list")),
            }
        }
        Ok(values)
    }

    fn parse_value(&mut self) -> Result<FilterValue, SyncError> {
        match self.next() {
            Some(Token::Number(text)) => {
                let integral = !text.contains('.');
                if let Ok(i) = text.parse::<i64>() {
                    Ok(FilterValue::Integer(i))
                } else if integral {
                    // a float would silently round large unsigned ids
                    Err(self.error(&format!("integer '{}' is out of range", text)))
                } else {
                    text.parse::<f64>()
                        .map(FilterValue::Float)
                        .map_err(|_| self.error(&format!("invalid number '{}'", text)))
                }
            }
            Some(Token::Str(text)) => Ok(FilterValue::Text(text)),
            _ => Err(self.error("expected a number or quoted string")),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    const RESERVED: &[&str] = &[
        "and", "or", "not", "in", "select", "drop", "delete", "insert", "update", "union",
        "where", "from", "null",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_in_list() {
        let filter = TableFilter::parse("removed_by_user_id IN (106, 109)").unwrap();
        assert_eq!(
            filter,
            TableFilter::Conditions(vec![FilterCondition {
                column: "removed_by_user_id".to_string(),
                op: FilterOperator::In,
                values: vec![FilterValue::Integer(106), FilterValue::Integer(109)],
            }])
        );

        let clause = filter.where_clause();
        assert_eq!(clause.sql, "`removed_by_user_id` IN (?, ?)");
        assert_eq!(
            clause.params,
            vec![FilterValue::Integer(106), FilterValue::Integer(109)]
        );
    }

    #[test]
    fn test_parse_conjunction_with_strings_and_comparisons() {
        let filter = TableFilter::parse("status = 'it''s open' and `order` >= 10.5").unwrap();
        let clause = filter.where_clause();
        assert_eq!(clause.sql, "`status` = ? AND `order` >= ?");
        assert_eq!(
            clause.params,
            vec![
                FilterValue::Text("it's open".to_string()),
                FilterValue::Float(10.5)
            ]
        );
    }

    #[test]
    fn test_parse_not_in_and_negative_numbers() {
        let filter = TableFilter::parse("kind NOT IN ('a', 'b') AND delta <> -3").unwrap();
        let clause = filter.where_clause();
        assert_eq!(clause.sql, "`kind` NOT IN (?, ?) AND `delta` <> ?");
        assert_eq!(clause.params[2], FilterValue::Integer(-3));
    }

    #[test]
    fn test_quoted_identifier_with_backtick_is_escaped() {
        let filter = TableFilter::parse("`we``ird` = 1").unwrap();
        assert_eq!(filter.where_clause().sql, "`we``ird` = ?");
    }

    #[test]
    fn test_rejects_expressions_outside_grammar() {
        let invalid = vec![
            "",
            "id IN ()",
            "id = 1 OR 1 = 1",
            "id = 1; DROP TABLE contacts",
            "DROP TABLE contacts",
            "id = (SELECT 1)",
            "id IN (1, 2",
            "name = 'unterminated",
            "id",
            "id = 1 2",
        ];

        for expression in invalid {
            let result = TableFilter::parse(expression);
            assert!(result.is_err(), "Filter should be rejected: {}", expression);
        }
    }

    #[test]
    fn test_integer_beyond_i64_is_rejected() {
        let err = TableFilter::parse("id IN (1, 18446744073709551615)").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("out of range"));

        let filter = TableFilter::parse("score > 99999999999999999999.5").unwrap();
        assert!(matches!(filter.where_clause().params[0], FilterValue::Float(_)));
    }

    #[test]
    fn test_structured_conditions_are_validated() {
        let too_many = FilterCondition {
            column: "id".to_string(),
            op: FilterOperator::Eq,
            values: vec![FilterValue::Integer(1), FilterValue::Integer(2)],
        };
        assert!(TableFilter::from_conditions(vec![too_many]).is_err());
        assert!(TableFilter::from_conditions(Vec::new()).is_err());
    }

    #[test]
    fn test_raw_filter_is_verbatim() {
        let filter = TableFilter::Raw("DATE(created_at) > CURDATE() - 7".to_string());
        let clause = filter.where_clause();
        assert_eq!(clause.sql, "DATE(created_at) > CURDATE() - 7");
        assert!(clause.params.is_empty());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let filter = TableFilter::parse("uploaded_by IN (106, 109) AND note = 'x'").unwrap();
        assert_eq!(filter.to_string(), "uploaded_by IN (106, 109) AND note = 'x'");
        assert_eq!(TableFilter::parse(&filter.to_string()).unwrap(), filter);
    }
}
