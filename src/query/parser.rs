use serde_json::Value;

use super::{Chain, Comparator, Operand, Predicate, Step};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

pub fn parse(source: &str) -> Result<Vec<Chain>, ParseError> {
    let mut parser = Parser { source, position: 0 };
    let mut pipeline = vec![parser.parse_chain()?];
    while parser.eat('|') {
        pipeline.push(parser.parse_chain()?);
    }
    parser.skip_whitespace();
    match parser.peek() {
        None => Ok(pipeline),
        Some(char) => Err(parser.error(format!("unexpected `{char}`"))),
    }
}

struct Parser<'a> {
    source: &'a str,

    /// Byte offset, always at a character boundary.
    position: usize,
}

impl<'a> Parser<'a> {
    const COMPARATORS: [(&'static str, Comparator); 6] = [
        ("==", Comparator::Equal),
        ("!=", Comparator::NotEqual),
        ("<=", Comparator::LessOrEqual),
        (">=", Comparator::GreaterOrEqual),
        ("<", Comparator::Less),
        (">", Comparator::Greater),
    ];

    fn rest(&self) -> &'a str {
        let source = self.source;
        &source[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let char = self.peek()?;
        self.position += char.len_utf8();
        Some(char)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{expected}`")))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError { position: self.position, message: message.into() }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(char) => self.error(format!("expected {expected}, found `{char}`")),
            None => self.error(format!("expected {expected}, found the end")),
        }
    }

    fn parse_chain(&mut self) -> Result<Chain, ParseError> {
        self.skip_whitespace();
        let mut steps = vec![match self.peek() {
            Some('[') => self.parse_bracket()?,
            Some('@') => {
                self.bump();
                Step::Current
            }
            _ => Step::Field(self.parse_identifier()?),
        }];
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('.') => {
                    self.bump();
                    self.skip_whitespace();
                    steps.push(Step::Field(self.parse_identifier()?));
                }
                Some('[') => steps.push(self.parse_bracket()?),
                _ => break,
            }
        }
        Ok(Chain(steps))
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some('"') => self.parse_quoted_identifier(),
            Some(char) if char.is_ascii_alphabetic() || char == '_' => {
                let start = self.position;
                while self.peek().is_some_and(|char| char.is_ascii_alphanumeric() || char == '_') {
                    self.bump();
                }
                Ok(self.source[start..self.position].to_owned())
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn parse_quoted_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.position;
        let raw = self.take_delimited('"')?;
        serde_json::from_str(&format!("\"{raw}\""))
            .map_err(|error| ParseError { position: start, message: format!("invalid quoted identifier: {error}") })
    }

    /// Take the text between the delimiters, leaving the escape sequences intact.
    fn take_delimited(&mut self, delimiter: char) -> Result<&'a str, ParseError> {
        let source = self.source;
        let start = self.position;
        self.bump();
        let content_start = self.position;
        let mut is_escaped = false;
        while let Some(char) = self.bump() {
            if is_escaped {
                is_escaped = false;
            } else if char == '\\' {
                is_escaped = true;
            } else if char == delimiter {
                return Ok(&source[content_start..self.position - delimiter.len_utf8()]);
            }
        }
        Err(ParseError { position: start, message: format!("unterminated `{delimiter}`") })
    }

    fn parse_bracket(&mut self) -> Result<Step, ParseError> {
        self.expect('[')?;
        self.skip_whitespace();
        let step = match self.peek() {
            Some('*') => {
                self.bump();
                Step::Wildcard
            }
            Some('?') => {
                self.bump();
                Step::Filter(Box::new(self.parse_predicate()?))
            }
            Some(char) if char == '-' || char.is_ascii_digit() => Step::Index(self.parse_integer()?),
            _ => return Err(self.unexpected("an index, `*`, or `?`")),
        };
        self.expect(']')?;
        Ok(step)
    }

    fn parse_integer(&mut self) -> Result<i64, ParseError> {
        let start = self.position;
        if self.peek() == Some('-') {
            self.bump();
        }
        while self.peek().is_some_and(|char| char.is_ascii_digit()) {
            self.bump();
        }
        self.source[start..self.position]
            .parse()
            .map_err(|error| ParseError { position: start, message: format!("invalid index: {error}") })
    }

    fn eat_token(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.position += token.len();
            true
        } else {
            false
        }
    }

    /// `||` has the lowest precedence, then `&&`, then `!`.
    fn parse_predicate(&mut self) -> Result<Predicate, ParseError> {
        let mut predicate = self.parse_conjunction()?;
        while self.eat_token("||") {
            predicate = Predicate::Or(Box::new(predicate), Box::new(self.parse_conjunction()?));
        }
        Ok(predicate)
    }

    fn parse_conjunction(&mut self) -> Result<Predicate, ParseError> {
        let mut predicate = self.parse_unary()?;
        while self.eat_token("&&") {
            predicate = Predicate::And(Box::new(predicate), Box::new(self.parse_unary()?));
        }
        Ok(predicate)
    }

    fn parse_unary(&mut self) -> Result<Predicate, ParseError> {
        if self.eat('!') {
            return Ok(Predicate::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat('(') {
            let predicate = self.parse_predicate()?;
            self.expect(')')?;
            return Ok(predicate);
        }
        let lhs = self.parse_operand()?;
        match self.parse_comparator() {
            Some(comparator) => Ok(Predicate::Compare(lhs, comparator, self.parse_operand()?)),
            None => Ok(Predicate::Truthy(lhs)),
        }
    }

    fn parse_comparator(&mut self) -> Option<Comparator> {
        self.skip_whitespace();
        let (token, comparator) =
            Self::COMPARATORS.into_iter().find(|(token, _)| self.rest().starts_with(token))?;
        self.position += token.len();
        Some(comparator)
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('`') => {
                let raw = self.take_delimited('`')?.replace("\\`", "`");
                let raw = raw.trim();
                // Legacy JMESPath: an unquoted literal which is not valid JSON is a string.
                let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
                Ok(Operand::Literal(value))
            }
            Some('\'') => {
                let raw = self.take_delimited('\'')?.replace("\\'", "'");
                Ok(Operand::Literal(Value::String(raw)))
            }
            _ => Ok(Operand::Chain(self.parse_chain()?)),
        }
    }
}
