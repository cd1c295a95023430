/*!
Dimensioned units for instrument data columns.

A [`UnitRegistry`] maps unit names and symbols onto scale factors over the
SI base dimensions, and parses compound unit expressions like
`"liter/minute"` or `"meter**3/hour"` into a [`UnitExpr`] that can be
compared for dimensional compatibility and used for value conversion.

Conversion failure is never fatal anywhere in this crate: callers that
cannot convert fall back to the original values, so the registry exposes
both a strict [`UnitRegistry::parse_expression`] and the lenient
[`UnitRegistry::parse_or_dimensionless`]/[`UnitRegistry::convert`] entry
points.
*/
use std::collections::HashMap;
use std::fmt::{self, Display};

use thiserror::Error;

/// Integer exponents over the seven SI base dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimensions {
    pub length: i8,
    pub mass: i8,
    pub time: i8,
    pub current: i8,
    pub temperature: i8,
    pub amount: i8,
    pub luminosity: i8,
}

const fn dims(length: i8, mass: i8, time: i8, current: i8, temperature: i8) -> Dimensions {
    Dimensions {
        length,
        mass,
        time,
        current,
        temperature,
        amount: 0,
        luminosity: 0,
    }
}

impl Dimensions {
    pub const NONE: Dimensions = dims(0, 0, 0, 0, 0);

    pub fn is_dimensionless(&self) -> bool {
        *self == Self::NONE
    }

    fn combine(&self, other: &Dimensions, sign: i8) -> Dimensions {
        Dimensions {
            length: self.length + sign * other.length,
            mass: self.mass + sign * other.mass,
            time: self.time + sign * other.time,
            current: self.current + sign * other.current,
            temperature: self.temperature + sign * other.temperature,
            amount: self.amount + sign * other.amount,
            luminosity: self.luminosity + sign * other.luminosity,
        }
    }

    fn pow(&self, n: i8) -> Dimensions {
        Dimensions {
            length: self.length * n,
            mass: self.mass * n,
            time: self.time * n,
            current: self.current * n,
            temperature: self.temperature * n,
            amount: self.amount * n,
            luminosity: self.luminosity * n,
        }
    }
}

impl Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return f.write_str("dimensionless");
        }
        let parts = [
            ("[length]", self.length),
            ("[mass]", self.mass),
            ("[time]", self.time),
            ("[current]", self.current),
            ("[temperature]", self.temperature),
            ("[substance]", self.amount),
            ("[luminosity]", self.luminosity),
        ];
        let mut first = true;
        for (name, exp) in parts {
            if exp == 0 {
                continue;
            }
            if !first {
                f.write_str(" * ")?;
            }
            first = false;
            if exp == 1 {
                f.write_str(name)?;
            } else {
                write!(f, "{} ** {}", name, exp)?;
            }
        }
        Ok(())
    }
}

/// A resolved unit expression: a multiplicative factor over SI base
/// dimensions, plus an affine offset for lone temperature units.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitExpr {
    /// Multiplier taking a magnitude in this unit to SI base units
    pub scale: f64,
    /// Affine offset to SI, nonzero only for a bare `celsius`/`fahrenheit`
    pub offset: f64,
    pub dims: Dimensions,
    display: String,
}

impl UnitExpr {
    pub fn dimensionless() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            dims: Dimensions::NONE,
            display: String::new(),
        }
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dims.is_dimensionless()
    }

    pub fn compatible_with(&self, other: &UnitExpr) -> bool {
        self.dims == other.dims
    }

    /// The compact symbol rendering, e.g. `"L/min"` for `"liter/minute"`.
    /// Empty for dimensionless expressions with no named unit.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Re-express `value` in `target`, or `None` when the dimensions differ.
    pub fn convert(&self, value: f64, target: &UnitExpr) -> Option<f64> {
        if !self.compatible_with(target) {
            return None;
        }
        let si = value * self.scale + self.offset;
        Some((si - target.offset) / target.scale)
    }
}

impl Display for UnitExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum UnitParseError {
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("unit expression syntax error: {0}")]
    Syntax(String),
}

#[derive(Debug, Clone)]
struct UnitDef {
    symbol: String,
    scale: f64,
    offset: f64,
    dims: Dimensions,
    prefixable: bool,
}

const PREFIXES: &[(&str, &str, f64)] = &[
    ("nano", "n", 1e-9),
    ("micro", "µ", 1e-6),
    ("milli", "m", 1e-3),
    ("centi", "c", 1e-2),
    ("deci", "d", 1e-1),
    ("hecto", "h", 1e2),
    ("kilo", "k", 1e3),
    ("mega", "M", 1e6),
    ("giga", "G", 1e9),
];

/// A table of named units with SI prefixes and an expression parser.
///
/// The registry is seeded with every unit the builtin format definitions
/// reference, plus the domain custom units `percent`, `ppm` and `var`.
/// Additional units can be added with [`UnitRegistry::define`].
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: HashMap<String, UnitDef>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            units: HashMap::new(),
        };
        reg.seed();
        reg
    }

    /// Register a unit under `name` and `symbol`. `scale` takes a magnitude
    /// in this unit to SI base units.
    pub fn define(
        &mut self,
        name: &str,
        symbol: &str,
        scale: f64,
        dims: Dimensions,
        prefixable: bool,
    ) {
        self.add(name, symbol, scale, 0.0, dims, prefixable);
    }

    fn add(
        &mut self,
        name: &str,
        symbol: &str,
        scale: f64,
        offset: f64,
        dims: Dimensions,
        prefixable: bool,
    ) {
        let def = UnitDef {
            symbol: symbol.to_string(),
            scale,
            offset,
            dims,
            prefixable,
        };
        if !symbol.is_empty() && symbol != name {
            self.units.insert(symbol.to_string(), def.clone());
        }
        self.units.insert(name.to_string(), def);
    }

    fn alias(&mut self, alias: &str, name: &str) {
        if let Some(def) = self.units.get(name).cloned() {
            self.units.insert(alias.to_string(), def);
        }
    }

    fn seed(&mut self) {
        let none = Dimensions::NONE;
        // Time
        self.add("second", "s", 1.0, 0.0, dims(0, 0, 1, 0, 0), true);
        self.add("minute", "min", 60.0, 0.0, dims(0, 0, 1, 0, 0), false);
        self.add("hour", "h", 3600.0, 0.0, dims(0, 0, 1, 0, 0), false);
        // Geometry
        self.add("meter", "m", 1.0, 0.0, dims(1, 0, 0, 0, 0), true);
        self.add("square_meter", "m²", 1.0, 0.0, dims(2, 0, 0, 0, 0), false);
        self.add(
            "square_centimeter",
            "cm²",
            1e-4,
            0.0,
            dims(2, 0, 0, 0, 0),
            false,
        );
        self.add("cubic_meter", "m³", 1.0, 0.0, dims(3, 0, 0, 0, 0), false);
        self.add(
            "cubic_centimeter",
            "cm³",
            1e-6,
            0.0,
            dims(3, 0, 0, 0, 0),
            false,
        );
        self.add("liter", "L", 1e-3, 0.0, dims(3, 0, 0, 0, 0), true);
        // Mass
        self.add("gram", "g", 1e-3, 0.0, dims(0, 1, 0, 0, 0), true);
        // Electromagnetics
        self.add("ampere", "A", 1.0, 0.0, dims(0, 0, 0, 1, 0), true);
        self.add("volt", "V", 1.0, 0.0, dims(2, 1, -3, -1, 0), true);
        self.add("ohm", "Ω", 1.0, 0.0, dims(2, 1, -3, -2, 0), true);
        self.add("watt", "W", 1.0, 0.0, dims(2, 1, -3, 0, 0), true);
        self.add("tesla", "T", 1.0, 0.0, dims(0, 1, -2, -1, 0), true);
        self.add("gauss", "G", 1e-4, 0.0, dims(0, 1, -2, -1, 0), true);
        // Temperature; celsius and fahrenheit are affine as lone units
        self.add("kelvin", "K", 1.0, 0.0, dims(0, 0, 0, 0, 1), true);
        self.add("celsius", "°C", 1.0, 273.15, dims(0, 0, 0, 0, 1), false);
        self.alias("degC", "celsius");
        self.add(
            "fahrenheit",
            "°F",
            5.0 / 9.0,
            459.67 * 5.0 / 9.0,
            dims(0, 0, 0, 0, 1),
            false,
        );
        self.alias("degF", "fahrenheit");
        // Pressure
        self.add("pascal", "Pa", 1.0, 0.0, dims(-1, 1, -2, 0, 0), true);
        self.add("bar", "bar", 1e5, 0.0, dims(-1, 1, -2, 0, 0), true);
        self.add("atmosphere", "atm", 101325.0, 0.0, dims(-1, 1, -2, 0, 0), false);
        self.add("torr", "torr", 101325.0 / 760.0, 0.0, dims(-1, 1, -2, 0, 0), false);
        // Rates
        self.add("hertz", "Hz", 1.0, 0.0, dims(0, 0, -1, 0, 0), true);
        self.add("radian", "rad", 1.0, 0.0, none, false);
        self.add(
            "rpm",
            "rpm",
            2.0 * std::f64::consts::PI / 60.0,
            0.0,
            dims(0, 0, -1, 0, 0),
            false,
        );
        // Dimensionless and domain custom units: percent = 0.01 = %,
        // ppm = 1e-6, var = 1 (reactive power is tracked as a bare number)
        self.add("dimensionless", "", 1.0, 0.0, none, false);
        self.add("percent", "%", 0.01, 0.0, none, false);
        self.add("ppm", "ppm", 1e-6, 0.0, none, false);
        self.add("var", "var", 1.0, 0.0, none, false);
    }

    /// Resolve one unit token, trying an exact match before SI prefixes.
    fn resolve(&self, token: &str) -> Option<(f64, f64, Dimensions, String)> {
        if let Some(def) = self.units.get(token) {
            return Some((def.scale, def.offset, def.dims, def.symbol.clone()));
        }
        for (pname, psym, factor) in PREFIXES {
            for prefix in [*pname, *psym, if *psym == "µ" { "u" } else { *psym }] {
                if let Some(rest) = token.strip_prefix(prefix) {
                    if rest.is_empty() {
                        continue;
                    }
                    if let Some(def) = self.units.get(rest) {
                        if def.prefixable {
                            return Some((
                                def.scale * factor,
                                0.0,
                                def.dims,
                                format!("{}{}", psym, def.symbol),
                            ));
                        }
                    }
                }
            }
        }
        None
    }

    /// Parse a unit expression: unit tokens, numeric literals, `*`, `/`,
    /// integer powers (`**`, `^`, or `²`/`³`), and parentheses.
    pub fn parse_expression(&self, expr: &str) -> Result<UnitExpr, UnitParseError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Ok(UnitExpr::dimensionless());
        }
        // A lone unit token keeps its affine offset; compound expressions
        // treat temperature units as deltas, the way pint does.
        if let Some((scale, offset, dims, symbol)) = self.resolve(trimmed) {
            return Ok(UnitExpr {
                scale,
                offset,
                dims,
                display: symbol,
            });
        }
        let tokens = tokenize(trimmed)?;
        let mut parser = Parser {
            reg: self,
            tokens,
            pos: 0,
        };
        let out = parser.expression()?;
        if parser.pos != parser.tokens.len() {
            return Err(UnitParseError::Syntax(format!(
                "unexpected trailing input in '{}'",
                trimmed
            )));
        }
        Ok(out)
    }

    /// Parse a unit expression, degrading to dimensionless on failure.
    pub fn parse_or_dimensionless(&self, expr: &str) -> UnitExpr {
        self.parse_expression(expr)
            .unwrap_or_else(|_| UnitExpr::dimensionless())
    }

    /// Whether two unit expressions share the same dimensionality.
    pub fn compatible(&self, a: &str, b: &str) -> bool {
        match (self.parse_expression(a), self.parse_expression(b)) {
            (Ok(ua), Ok(ub)) => ua.compatible_with(&ub),
            _ => false,
        }
    }

    /// Convert `value` from one unit to another, returning the input
    /// unchanged when either unit fails to parse or dimensions differ.
    pub fn convert(&self, value: f64, from: &str, to: &str) -> f64 {
        let (Ok(src), Ok(dst)) = (self.parse_expression(from), self.parse_expression(to)) else {
            return value;
        };
        src.convert(value, &dst).unwrap_or(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Star,
    Slash,
    Power,
    LParen,
    RParen,
    Sup(i8),
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '°' || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, UnitParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Power);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '·' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Power);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '²' => {
                chars.next();
                tokens.push(Token::Sup(2));
            }
            '³' => {
                chars.next();
                tokens.push(Token::Sup(3));
            }
            '%' => {
                chars.next();
                tokens.push(Token::Ident("%".to_string()));
            }
            '-' => {
                chars.next();
                tokens.push(Token::Number(parse_number(&mut chars, true)?));
            }
            c if c.is_ascii_digit() => {
                tokens.push(Token::Number(parse_number(&mut chars, false)?));
            }
            c if is_ident_start(c) => {
                let mut ident = String::new();
                ident.push(c);
                chars.next();
                while let Some(&n) = chars.peek() {
                    if is_ident_continue(n) {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(UnitParseError::Syntax(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

fn parse_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    negative: bool,
) -> Result<f64, UnitParseError> {
    let mut text = String::new();
    if negative {
        text.push('-');
    }
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    text.parse::<f64>()
        .map_err(|_| UnitParseError::Syntax(format!("bad numeric literal '{}'", text)))
}

struct Parser<'a> {
    reg: &'a UnitRegistry,
    tokens: Vec<Token>,
    pos: usize,
}

/// Intermediate parse product: a pure multiplicative factor (offsets are
/// only honored for lone unit tokens, handled before the grammar runs).
struct Part {
    scale: f64,
    dims: Dimensions,
    display: String,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expression(&mut self) -> Result<UnitExpr, UnitParseError> {
        let mut acc = self.term()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    acc.scale *= rhs.scale;
                    acc.dims = acc.dims.combine(&rhs.dims, 1);
                    if !rhs.display.is_empty() {
                        if !acc.display.is_empty() {
                            acc.display.push('·');
                        }
                        acc.display.push_str(&rhs.display);
                    }
                }
                Token::Slash => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    acc.scale /= rhs.scale;
                    acc.dims = acc.dims.combine(&rhs.dims, -1);
                    if !rhs.display.is_empty() {
                        if acc.display.is_empty() {
                            acc.display.push('1');
                        }
                        acc.display.push('/');
                        acc.display.push_str(&rhs.display);
                    }
                }
                _ => break,
            }
        }
        Ok(UnitExpr {
            scale: acc.scale,
            offset: 0.0,
            dims: acc.dims,
            display: acc.display,
        })
    }

    fn term(&mut self) -> Result<Part, UnitParseError> {
        let mut base = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Power) => {
                    self.pos += 1;
                    let exp = match self.next() {
                        Some(Token::Number(n)) if n.fract() == 0.0 => n as i8,
                        other => {
                            return Err(UnitParseError::Syntax(format!(
                                "expected integer exponent, found {:?}",
                                other
                            )))
                        }
                    };
                    base = raise(base, exp);
                }
                Some(Token::Sup(n)) => {
                    let n = *n;
                    self.pos += 1;
                    base = raise(base, n);
                }
                _ => break,
            }
        }
        Ok(base)
    }

    fn factor(&mut self) -> Result<Part, UnitParseError> {
        match self.next() {
            Some(Token::Ident(name)) => {
                let (scale, _offset, dims, symbol) = self
                    .reg
                    .resolve(&name)
                    .ok_or(UnitParseError::UnknownUnit(name))?;
                Ok(Part {
                    scale,
                    dims,
                    display: symbol,
                })
            }
            Some(Token::Number(n)) => Ok(Part {
                scale: n,
                dims: Dimensions::NONE,
                display: String::new(),
            }),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(Part {
                        scale: inner.scale,
                        dims: inner.dims,
                        display: format!("({})", inner.display),
                    }),
                    _ => Err(UnitParseError::Syntax(
                        "unbalanced parentheses".to_string(),
                    )),
                }
            }
            other => Err(UnitParseError::Syntax(format!(
                "expected unit, number, or '(', found {:?}",
                other
            ))),
        }
    }
}

fn raise(base: Part, exp: i8) -> Part {
    let display = if base.display.is_empty() {
        String::new()
    } else {
        match exp {
            2 => format!("{}²", base.display),
            3 => format!("{}³", base.display),
            n => format!("{}**{}", base.display, n),
        }
    };
    Part {
        scale: base.scale.powi(exp as i32),
        dims: base.dims.pow(exp),
        display,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_simple_units() {
        let reg = UnitRegistry::new();
        let tesla = reg.parse_expression("tesla").unwrap();
        assert_eq!(tesla.display(), "T");
        assert_eq!(tesla.scale, 1.0);

        let gauss = reg.parse_expression("gauss").unwrap();
        assert!(tesla.compatible_with(&gauss));
        assert_eq!(tesla.convert(1.0, &gauss), Some(10000.0));
    }

    #[test]
    fn parse_prefixed_units() {
        let reg = UnitRegistry::new();
        let mt = reg.parse_expression("millitesla").unwrap();
        assert_eq!(mt.display(), "mT");
        assert_eq!(mt.scale, 1e-3);
        assert_eq!(reg.parse_expression("mT").unwrap().scale, 1e-3);
        assert_eq!(reg.parse_expression("kA").unwrap().scale, 1e3);
        // "min" must resolve as minute, not milli-"in"
        assert_eq!(reg.parse_expression("min").unwrap().scale, 60.0);
        // "m" alone is meter
        assert_eq!(
            reg.parse_expression("m").unwrap().dims,
            dims(1, 0, 0, 0, 0)
        );
    }

    #[test]
    fn parse_compound_expressions() {
        let reg = UnitRegistry::new();
        let flow = reg.parse_expression("liter/minute").unwrap();
        assert_eq!(flow.display(), "L/min");
        let flow2 = reg.parse_expression("meter**3/hour").unwrap();
        assert_eq!(flow2.display(), "m³/h");
        assert!(flow.compatible_with(&flow2));
        // 1 m³/h = 1000/60 L/min
        let converted = flow2.convert(1.0, &flow).unwrap();
        assert!((converted - 1000.0 / 60.0).abs() < 1e-9);

        let sup = reg.parse_expression("m³/h").unwrap();
        assert_eq!(sup.dims, flow2.dims);
    }

    #[test]
    fn affine_temperature() {
        let reg = UnitRegistry::new();
        assert!((reg.convert(25.0, "celsius", "kelvin") - 298.15).abs() < 1e-9);
        assert!((reg.convert(32.0, "fahrenheit", "celsius") - 0.0).abs() < 1e-9);
        assert!((reg.convert(300.0, "K", "°C") - 26.85).abs() < 1e-9);
    }

    #[test]
    fn convert_degrades_silently() {
        let reg = UnitRegistry::new();
        // Dimension mismatch
        assert_eq!(reg.convert(3.5, "tesla", "second"), 3.5);
        // Unparsable target
        assert_eq!(reg.convert(3.5, "tesla", "florbs"), 3.5);
    }

    #[test]
    fn custom_domain_units() {
        let reg = UnitRegistry::new();
        let pct = reg.parse_expression("percent").unwrap();
        assert!(pct.is_dimensionless());
        assert_eq!(pct.scale, 0.01);
        assert_eq!(pct.display(), "%");
        assert_eq!(reg.parse_expression("ppm").unwrap().scale, 1e-6);
        assert!(reg.parse_expression("var").unwrap().is_dimensionless());
    }

    #[test]
    fn rotation_speed_compatibility() {
        let reg = UnitRegistry::new();
        assert!(reg.compatible("rpm", "hertz"));
        assert!(reg.compatible("rpm", "radian/second"));
    }

    #[test]
    fn user_defined_unit() {
        // Standard cubic centimeters per minute: cm³/min in SI m³/s
        let mut reg = UnitRegistry::new();
        reg.define("sccm", "sccm", 1e-6 / 60.0, dims(3, 0, -1, 0, 0), false);
        assert!(reg.compatible("sccm", "liter/minute"));
        assert!(!reg.compatible("sccm", "liter"));
        let converted = reg.convert(1000.0, "sccm", "liter/minute");
        assert!((converted - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_unit_is_an_error() {
        let reg = UnitRegistry::new();
        assert!(matches!(
            reg.parse_expression("blorp"),
            Err(UnitParseError::UnknownUnit(_))
        ));
        let lenient = reg.parse_or_dimensionless("blorp");
        assert!(lenient.is_dimensionless());
    }
}
