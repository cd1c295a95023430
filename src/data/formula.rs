/*!
A whitelisted arithmetic grammar for derived channels.

Formulas are parsed into an explicit expression tree before evaluation,
so only column references, numeric literals, negation, and the five
binary operators (`+ - * / **`, with `^` accepted for `**`) can ever
run. Evaluation is element-wise over equal-length columns with scalar
broadcast.
*/
use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("formula syntax error: {0}")]
    Syntax(String),
    #[error("formula references unknown column '{0}'")]
    UnknownColumn(String),
    #[error("formula references non-numeric column '{0}'")]
    NonNumericColumn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(f64),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleStar,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::DoubleStar);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '^' => {
                chars.next();
                tokens.push(Token::DoubleStar);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' {
                        text.push(c);
                        chars.next();
                        // Exponent sign only directly after e/E
                        if (c == 'e' || c == 'E')
                            && matches!(chars.peek(), Some('+') | Some('-'))
                        {
                            text.push(chars.next().unwrap());
                        }
                    } else {
                        break;
                    }
                }
                let value: f64 = text
                    .parse()
                    .map_err(|_| FormulaError::Syntax(format!("bad number '{}'", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(FormulaError::Syntax(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // sum := product (('+'|'-') product)*
    fn sum(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.product()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.eat(&Token::Minus) {
            Ok(Expr::Neg(Box::new(self.unary()?)))
        } else if self.eat(&Token::Plus) {
            self.unary()
        } else {
            self.power()
        }
    }

    // Exponentiation binds tighter than unary minus and associates right,
    // so -x**2 is -(x**2) and a**b**c is a**(b**c).
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if self.eat(&Token::DoubleStar) {
            let exp = self.unary()?;
            Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)))
        } else {
            Ok(base)
        }
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Literal(value)),
            Some(Token::Ident(name)) => Ok(Expr::Column(name)),
            Some(Token::LParen) => {
                let inner = self.sum()?;
                if self.eat(&Token::RParen) {
                    Ok(inner)
                } else {
                    Err(FormulaError::Syntax("missing ')'".to_string()))
                }
            }
            other => Err(FormulaError::Syntax(format!(
                "unexpected token {:?}",
                other
            ))),
        }
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl Expr {
    /// Parse a bare expression (no assignment form).
    pub fn parse(text: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(FormulaError::Syntax("empty formula".to_string()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.sum()?;
        if parser.pos != parser.tokens.len() {
            return Err(FormulaError::Syntax(format!(
                "trailing input after expression: {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(expr)
    }

    /// A single bare column reference acts as an alias, letting callers
    /// copy a column instead of computing one.
    pub fn as_alias(&self) -> Option<&str> {
        match self {
            Self::Column(name) => Some(name),
            _ => None,
        }
    }

    /// Every column name the expression reads, in first-use order.
    pub fn column_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Self::Column(name) => {
                if !refs.contains(&name.as_str()) {
                    refs.push(name);
                }
            }
            Self::Literal(_) => {}
            Self::Neg(inner) => inner.collect_refs(refs),
            Self::Binary(_, lhs, rhs) => {
                lhs.collect_refs(refs);
                rhs.collect_refs(refs);
            }
        }
    }

    /// Evaluate element-wise over `rows` rows. Literals broadcast; every
    /// referenced column must be present in `context` with `rows` values.
    pub fn evaluate(
        &self,
        context: &HashMap<&str, &[f64]>,
        rows: usize,
    ) -> Result<Vec<f64>, FormulaError> {
        match self.eval_inner(context)? {
            Evaluated::Vector(v) => Ok(v),
            Evaluated::Scalar(x) => Ok(vec![x; rows]),
        }
    }

    fn eval_inner(&self, context: &HashMap<&str, &[f64]>) -> Result<Evaluated, FormulaError> {
        match self {
            Self::Literal(value) => Ok(Evaluated::Scalar(*value)),
            Self::Column(name) => context
                .get(name.as_str())
                .map(|values| Evaluated::Vector(values.to_vec()))
                .ok_or_else(|| FormulaError::UnknownColumn(name.clone())),
            Self::Neg(inner) => Ok(match inner.eval_inner(context)? {
                Evaluated::Scalar(x) => Evaluated::Scalar(-x),
                Evaluated::Vector(v) => Evaluated::Vector(v.into_iter().map(|x| -x).collect()),
            }),
            Self::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval_inner(context)?;
                let rhs = rhs.eval_inner(context)?;
                Ok(apply(*op, lhs, rhs))
            }
        }
    }
}

enum Evaluated {
    Scalar(f64),
    Vector(Vec<f64>),
}

fn apply_scalar(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Pow => a.powf(b),
    }
}

fn apply(op: BinOp, lhs: Evaluated, rhs: Evaluated) -> Evaluated {
    match (lhs, rhs) {
        (Evaluated::Scalar(a), Evaluated::Scalar(b)) => Evaluated::Scalar(apply_scalar(op, a, b)),
        (Evaluated::Scalar(a), Evaluated::Vector(b)) => {
            Evaluated::Vector(b.into_iter().map(|x| apply_scalar(op, a, x)).collect())
        }
        (Evaluated::Vector(a), Evaluated::Scalar(b)) => {
            Evaluated::Vector(a.into_iter().map(|x| apply_scalar(op, x, b)).collect())
        }
        (Evaluated::Vector(a), Evaluated::Vector(b)) => Evaluated::Vector(
            a.into_iter()
                .zip(b)
                .map(|(x, y)| apply_scalar(op, x, y))
                .collect(),
        ),
    }
}

/// Parse `"name = expr"` or a bare `"expr"`, returning the optional
/// assignment target and the expression tree. The target must be a plain
/// identifier.
pub fn parse_assignment(text: &str) -> Result<(Option<String>, Expr), FormulaError> {
    if let Some(pos) = text.find('=') {
        let lhs = text[..pos].trim();
        if !is_identifier(lhs) {
            return Err(FormulaError::Syntax(format!(
                "assignment target '{}' is not an identifier",
                lhs
            )));
        }
        let expr = Expr::parse(&text[pos + 1..])?;
        Ok((Some(lhs.to_string()), expr))
    } else {
        Ok((None, Expr::parse(text)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ctx<'a>(pairs: &[(&'a str, &'a [f64])]) -> HashMap<&'a str, &'a [f64]> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn product_of_two_columns() {
        let (target, expr) = parse_assignment("Power = Field * Current").unwrap();
        assert_eq!(target.as_deref(), Some("Power"));
        assert_eq!(expr.column_refs(), vec!["Field", "Current"]);
        let field = [1.0, 2.0];
        let current = [2.0, 3.0];
        let values = expr
            .evaluate(&ctx(&[("Field", &field), ("Current", &current)]), 2)
            .unwrap();
        assert_eq!(values, vec![2.0, 6.0]);
    }

    #[test]
    fn precedence_and_associativity() {
        let one = [0.0];
        let c = ctx(&[("x", &one)]);
        let eval = |text: &str| Expr::parse(text).unwrap().evaluate(&c, 1).unwrap()[0];
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("2 ** 3 ** 2"), 512.0);
        assert_eq!(eval("-2 ** 2"), -4.0);
        assert_eq!(eval("2 ^ 3"), 8.0);
        assert_eq!(eval("10 / 4"), 2.5);
        assert_eq!(eval("1.5e2 + x"), 150.0);
    }

    #[test]
    fn scalar_broadcast() {
        let expr = Expr::parse("2 * x + 1").unwrap();
        let x = [1.0, 2.0, 3.0];
        let values = expr.evaluate(&ctx(&[("x", &x)]), 3).unwrap();
        assert_eq!(values, vec![3.0, 5.0, 7.0]);
        // Pure-literal formulas broadcast to the requested length
        let constant = Expr::parse("9.81").unwrap();
        assert_eq!(constant.evaluate(&ctx(&[]), 2).unwrap(), vec![9.81, 9.81]);
    }

    #[test]
    fn alias_detection() {
        let (target, expr) = parse_assignment("copy = Original").unwrap();
        assert_eq!(target.as_deref(), Some("copy"));
        assert_eq!(expr.as_alias(), Some("Original"));
        assert!(Expr::parse("a + b").unwrap().as_alias().is_none());
    }

    #[test]
    fn rejects_anything_outside_the_grammar() {
        assert!(matches!(
            Expr::parse("__import__('os')"),
            Err(FormulaError::Syntax(_))
        ));
        assert!(matches!(Expr::parse("a; b"), Err(FormulaError::Syntax(_))));
        assert!(matches!(Expr::parse("f(x)"), Err(FormulaError::Syntax(_))));
        assert!(matches!(Expr::parse(""), Err(FormulaError::Syntax(_))));
        assert!(matches!(
            parse_assignment("a + b = c"),
            Err(FormulaError::Syntax(_))
        ));
    }

    #[test]
    fn unknown_column_is_reported_by_name() {
        let expr = Expr::parse("Field * Missing").unwrap();
        let field = [1.0];
        let err = expr.evaluate(&ctx(&[("Field", &field)]), 1).unwrap_err();
        assert_eq!(err, FormulaError::UnknownColumn("Missing".to_string()));
    }

    #[test]
    fn accented_channel_names_parse() {
        let (target, expr) = parse_assignment("Référence_GR1 = Référence_A1 + Référence_A2").unwrap();
        assert_eq!(target.as_deref(), Some("Référence_GR1"));
        let a1 = [1.0, 2.0];
        let a2 = [3.0, 4.0];
        let values = expr
            .evaluate(&ctx(&[("Référence_A1", &a1), ("Référence_A2", &a2)]), 2)
            .unwrap();
        assert_eq!(values, vec![4.0, 6.0]);
    }
}
