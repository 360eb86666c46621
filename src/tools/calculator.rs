use std::sync::LazyLock;

use regex::Regex;

use crate::tools::Tool;

const ERROR_OBSERVATION: &str = "Error";
const MAX_NESTING: usize = 256;

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^0-9+\-*/().\s]").expect("calculator sanitizer pattern is valid")
});

/// Arithmetic-only calculator.
///
/// Everything outside digits, `+ - * / ( ) .` and whitespace is stripped
/// before evaluation. The grammar has no names and no function calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorTool;

impl CalculatorTool {
    pub fn new() -> Self {
        Self
    }
}

impl Tool for CalculatorTool {
    fn description(&self) -> &str {
        "useful for getting the result of a math expression. The input to this tool should be a valid mathematical expression that could be executed by a simple calculator.\n"
    }

    fn operate(&self, input: &str) -> String {
        let expression = sanitize(input);
        if expression.is_empty() {
            return ERROR_OBSERVATION.to_string();
        }

        match evaluate(&expression) {
            Ok(value) => value.to_string(),
            Err(err) => {
                tracing::debug!(%expression, %err, "calculator rejected expression");
                ERROR_OBSERVATION.to_string()
            }
        }
    }
}

/// Drops disallowed characters, then any operators left dangling at the end
/// (`"1+2*3; rm -rf"` keeps the `-` of `-rf`).
pub(crate) fn sanitize(input: &str) -> String {
    DISALLOWED
        .replace_all(input, "")
        .trim()
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '+' | '-' | '*' | '/'))
        .to_string()
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Float(value) => value,
        }
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) => f.write_str(&format_float(*value)),
        }
    }
}

/// Shortest round-trip form with a trailing `.0` on whole values. Magnitudes
/// outside `[1e-4, 1e16)` use a signed, two-digit exponent: `1e+20`, `1e-05`.
fn format_float(value: f64) -> String {
    let repr = format!("{value:?}");
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
    Number(Number),
    Plus,
    Minus,
    Star,
    Pow,
    Slash,
    FloorDiv,
    LParen,
    RParen,
}

#[derive(Debug, PartialEq)]
enum EvalError {
    Syntax(String),
    DivisionByZero,
    Overflow,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Syntax(message) => write!(f, "syntax error: {message}"),
            EvalError::DivisionByZero => f.write_str("division by zero"),
            EvalError::Overflow => f.write_str("numeric overflow"),
        }
    }
}

fn evaluate(expression: &str) -> Result<Number, EvalError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(EvalError::Syntax("unexpected trailing input".to_string()));
    }
    match value {
        Number::Float(v) if !v.is_finite() => Err(EvalError::Overflow),
        other => Ok(other),
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, EvalError> {
    let chars = expression.chars().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' if next == Some('*') => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '*' => tokens.push(Token::Star),
            '/' if next == Some('/') => {
                tokens.push(Token::FloorDiv);
                i += 1;
            }
            '/' => tokens.push(Token::Slash),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal = chars[start..i].iter().collect::<String>();
                tokens.push(Token::Number(parse_literal(&literal)?));
                continue;
            }
            other => return Err(EvalError::Syntax(format!("unexpected character {other:?}"))),
        }
        i += 1;
    }

    Ok(tokens)
}

fn parse_literal(literal: &str) -> Result<Number, EvalError> {
    if literal == "." || literal.matches('.').count() > 1 {
        return Err(EvalError::Syntax(format!("invalid number {literal:?}")));
    }
    if literal.contains('.') {
        return literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|err| EvalError::Syntax(err.to_string()));
    }
    match literal.parse::<i64>() {
        Ok(value) => Ok(Number::Int(value)),
        Err(_) => literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|err| EvalError::Syntax(err.to_string())),
    }
}

// expr   := term (('+' | '-') term)*
// term   := unary (('*' | '/' | '//') unary)*
// unary  := ('+' | '-')* power
// power  := atom ('**' unary)?
// atom   := number | '(' expr ')'
//
// Parentheses and exponents recurse; both count towards `MAX_NESTING`.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::Syntax("expression nested too deeply".to_string()));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Number, EvalError> {
        let mut lhs = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Number, EvalError> {
        let mut lhs = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::FloorDiv)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Number, EvalError> {
        let mut negate = false;
        while let Some(sign @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            negate ^= sign == Token::Minus;
        }

        let value = self.power()?;
        if !negate {
            return Ok(value);
        }
        Ok(match value {
            Number::Int(v) => v
                .checked_neg()
                .map_or(Number::Float(-(v as f64)), Number::Int),
            Number::Float(v) => Number::Float(-v),
        })
    }

    fn power(&mut self) -> Result<Number, EvalError> {
        let base = self.atom()?;
        if self.peek() == Some(Token::Pow) {
            self.pos += 1;
            let exponent = self.nested(Self::unary)?;
            return binary(Token::Pow, base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, EvalError> {
        match self.bump() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.nested(Self::expr)?;
                match self.bump() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(EvalError::Syntax("missing closing parenthesis".to_string())),
                }
            }
            Some(other) => Err(EvalError::Syntax(format!("unexpected token {other:?}"))),
            None => Err(EvalError::Syntax("unexpected end of expression".to_string())),
        }
    }
}

/// Integer arithmetic stays exact while it fits in `i64` and falls back to
/// floating point once it does not.
fn binary(op: Token, lhs: Number, rhs: Number) -> Result<Number, EvalError> {
    use Number::Int;

    let exact = match (op, lhs, rhs) {
        (Token::Plus, Int(a), Int(b)) => a.checked_add(b),
        (Token::Minus, Int(a), Int(b)) => a.checked_sub(b),
        (Token::Star, Int(a), Int(b)) => a.checked_mul(b),
        (Token::FloorDiv, Int(_), Int(0)) => return Err(EvalError::DivisionByZero),
        (Token::FloorDiv, Int(a), Int(b)) => a.checked_div(b).map(|quotient| {
            if a % b != 0 && ((a < 0) != (b < 0)) {
                quotient - 1
            } else {
                quotient
            }
        }),
        (Token::Pow, Int(a), Int(b)) if b >= 0 => {
            u32::try_from(b).ok().and_then(|exponent| a.checked_pow(exponent))
        }
        (Token::Pow, Int(0), Int(_)) => return Err(EvalError::DivisionByZero),
        _ => None,
    };
    match exact {
        Some(value) => Ok(Int(value)),
        None => float_binary(op, lhs, rhs),
    }
}

fn float_binary(op: Token, lhs: Number, rhs: Number) -> Result<Number, EvalError> {
    let (a, b) = (lhs.as_f64(), rhs.as_f64());
    let value = match op {
        Token::Plus => a + b,
        Token::Minus => a - b,
        Token::Star => a * b,
        Token::Slash | Token::FloorDiv if b == 0.0 => return Err(EvalError::DivisionByZero),
        Token::Slash => a / b,
        Token::FloorDiv => (a / b).floor(),
        Token::Pow if a == 0.0 && b < 0.0 => return Err(EvalError::DivisionByZero),
        Token::Pow => a.powf(b),
        _ => return Err(EvalError::Syntax(format!("{op:?} is not an operator"))),
    };
    if value.is_nan() {
        return Err(EvalError::Syntax("result is not a real number".to_string()));
    }
    Ok(Number::Float(value))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn calc(input: &str) -> String {
        CalculatorTool.operate(input)
    }

    #[test]
    fn strips_everything_but_arithmetic() {
        assert_eq!(sanitize("1+2*3; rm -rf"), "1+2*3");
        assert_eq!(calc("1+2*3; rm -rf"), "7");
    }

    #[test]
    fn letters_only_input_is_error() {
        assert_eq!(calc("abc"), "Error");
        assert_eq!(calc(""), "Error");
    }

    #[test]
    fn shell_junk_around_expression_is_removed() {
        assert_eq!(calc("what is 1+2*3?"), "7");
        assert_eq!(calc("__import__('os') 2*21"), "Error");
    }

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(calc("2 + 3 * 4"), "14");
        assert_eq!(calc("(2 + 3) * 4"), "20");
        assert_eq!(calc("-2**2"), "-4");
        assert_eq!(calc("2**3**2"), "512");
        assert_eq!(calc("10 - 4 - 3"), "3");
    }

    #[test]
    fn true_division_always_yields_float() {
        assert_eq!(calc("7/2"), "3.5");
        assert_eq!(calc("4/2"), "2.0");
        assert_eq!(calc("(56 - 32) * 5 / 9"), "13.333333333333334");
    }

    #[test]
    fn floor_division_rounds_toward_negative_infinity() {
        assert_eq!(calc("7//2"), "3");
        assert_eq!(calc("-7//2"), "-4");
        assert_eq!(calc("7.5//2"), "3.0");
    }

    #[test]
    fn decimal_literals() {
        assert_eq!(calc("0.5 + .25"), "0.75");
        assert_eq!(calc("2.5 * 2"), "5.0");
        assert_eq!(calc("1.2.3"), "Error");
    }

    #[test]
    fn failures_degrade_to_error_text() {
        assert_eq!(calc("1/0"), "Error");
        assert_eq!(calc("1//0"), "Error");
        assert_eq!(calc("(1+2"), "Error");
        assert_eq!(calc("1 2"), "Error");
        assert_eq!(calc("10**400"), "Error");
        assert_eq!(calc("*"), "Error");
    }

    #[test]
    fn integer_overflow_falls_back_to_float() {
        assert_eq!(calc("9223372036854775807 + 1"), "9.223372036854776e+18");
        assert_eq!(calc("2**64"), "1.8446744073709552e+19");
        assert_eq!(calc("2**62"), "4611686018427387904");
        assert_eq!(calc("99999999999999999999 * 1"), "1e+20");
    }

    #[test]
    fn exponent_form_is_signed_and_padded() {
        assert_eq!(calc("100000000000000000000.0"), "1e+20");
        assert_eq!(calc("1/100000"), "1e-05");
        assert_eq!(calc("1/1000"), "0.001");
        assert_eq!(calc("1000000000000000.0"), "1000000000000000.0");
    }

    #[test]
    fn deep_nesting_is_rejected_without_overflowing_the_stack() {
        assert_eq!(calc(&"(".repeat(100_000)), "Error");
        assert_eq!(
            calc(&format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000))),
            "Error"
        );
        assert_eq!(calc(&format!("2{}", "**1".repeat(5_000))), "Error");
        assert_eq!(
            calc(&format!("{}1{}", "(".repeat(100), ")".repeat(100))),
            "1"
        );
    }

    #[test]
    fn long_sign_runs_are_folded() {
        assert_eq!(calc(&"-".repeat(100_000)), "Error");
        assert_eq!(calc(&format!("{}1", "-".repeat(100_001))), "-1");
        assert_eq!(calc(&format!("{}7", "-+".repeat(20_000))), "7");
    }
}
