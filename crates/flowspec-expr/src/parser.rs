//! Expression AST and Pratt parser.

use std::ops::Range;

use serde_json::Value;

use crate::error::ExprError;
use crate::lexer::{tokenize, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    /// Bare identifier. `datum` names the input record itself.
    Ident(String),
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        /// Byte offset of the function name.
        offset: usize,
    },
}

impl Expr {
    /// Visits every call site in the tree, outermost first.
    pub fn calls(&self) -> Vec<(&str, usize)> {
        let mut out = Vec::new();
        self.collect_calls(&mut out);
        out
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<(&'a str, usize)>) {
        match self {
            Expr::Literal(_) | Expr::Ident(_) => {}
            Expr::Array(items) => items.iter().for_each(|e| e.collect_calls(out)),
            Expr::Member { object, property } => {
                object.collect_calls(out);
                property.collect_calls(out);
            }
            Expr::Unary { operand, .. } => operand.collect_calls(out),
            Expr::Binary { left, right, .. } => {
                left.collect_calls(out);
                right.collect_calls(out);
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                test.collect_calls(out);
                then.collect_calls(out);
                otherwise.collect_calls(out);
            }
            Expr::Call { name, args, offset } => {
                out.push((name.as_str(), *offset));
                args.iter().for_each(|e| e.collect_calls(out));
            }
        }
    }
}

/// Binding power and operator for binary tokens. Higher binds tighter; all
/// binary operators are left-associative.
fn binary_op_info(token: &Token) -> Option<(u8, BinaryOp)> {
    match token {
        Token::OrOr => Some((10, BinaryOp::Or)),
        Token::AndAnd => Some((20, BinaryOp::And)),
        Token::EqEq => Some((30, BinaryOp::Eq)),
        Token::BangEq => Some((30, BinaryOp::Ne)),
        Token::Lt => Some((35, BinaryOp::Lt)),
        Token::LtEq => Some((35, BinaryOp::Le)),
        Token::Gt => Some((35, BinaryOp::Gt)),
        Token::GtEq => Some((35, BinaryOp::Ge)),
        Token::Plus => Some((40, BinaryOp::Add)),
        Token::Minus => Some((40, BinaryOp::Sub)),
        Token::Star => Some((50, BinaryOp::Mul)),
        Token::Slash => Some((50, BinaryOp::Div)),
        Token::Percent => Some((50, BinaryOp::Mod)),
        _ => None,
    }
}

/// Deepest expression tree, and deepest parser recursion, that is accepted.
pub const MAX_DEPTH: usize = 128;

/// A parsed subexpression and the depth of its tree.
type Parsed = (Expr, usize);

struct Parser {
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    end: usize,
    nesting: usize,
}

/// Parses a complete expression.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
        end: source.len(),
        nesting: 0,
    };
    let (expr, _) = parser.parse_expr()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some((token, span)) => Err(ExprError::Unexpected {
            found: token.to_string(),
            expected: "end of expression",
            offset: span.start,
        }),
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let (token, span) = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        Some((token, span.start))
    }

    fn expect(&mut self, want: Token, expected: &'static str) -> Result<(), ExprError> {
        match self.advance() {
            Some((token, _)) if token == want => Ok(()),
            Some((token, offset)) => Err(ExprError::Unexpected {
                found: token.to_string(),
                expected,
                offset,
            }),
            None => Err(ExprError::UnexpectedEnd { expected }),
        }
    }

    fn too_deep(&self) -> ExprError {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.end, |(_, span)| span.start);
        ExprError::TooDeep {
            limit: MAX_DEPTH,
            offset,
        }
    }

    /// Runs `parse` one recursion level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.nesting >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    /// Depth of a node whose deepest child has depth `child`.
    fn wrap(&self, child: usize) -> Result<usize, ExprError> {
        if child >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        Ok(child + 1)
    }

    fn parse_expr(&mut self) -> Result<Parsed, ExprError> {
        self.nested(Self::parse_conditional)
    }

    /// Conditional level: `test ? then : otherwise`, right-associative.
    fn parse_conditional(&mut self) -> Result<Parsed, ExprError> {
        let (test, test_depth) = self.parse_pratt(0)?;
        if self.peek() != Some(&Token::Question) {
            return Ok((test, test_depth));
        }
        self.advance();
        let (then, then_depth) = self.parse_expr()?;
        self.expect(Token::Colon, "`:`")?;
        let (otherwise, otherwise_depth) = self.parse_expr()?;
        let depth = self.wrap(test_depth.max(then_depth).max(otherwise_depth))?;
        Ok((
            Expr::Conditional {
                test: Box::new(test),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            depth,
        ))
    }

    fn parse_pratt(&mut self, min_prec: u8) -> Result<Parsed, ExprError> {
        let (mut left, mut depth) = self.parse_prefix()?;

        while let Some((prec, op)) = self.peek().and_then(binary_op_info) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let (right, right_depth) = self.parse_pratt(prec + 1)?;
            depth = self.wrap(depth.max(right_depth))?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok((left, depth))
    }

    fn parse_prefix(&mut self) -> Result<Parsed, ExprError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let (operand, depth) = self.nested(Self::parse_prefix)?;
        Ok((
            Expr::Unary {
                op,
                operand: Box::new(operand),
            },
            self.wrap(depth)?,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Parsed, ExprError> {
        let (mut expr, mut depth) = self.parse_atom()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = match self.advance() {
                        Some((Token::Ident(name), _)) => name,
                        Some((token, offset)) => {
                            return Err(ExprError::Unexpected {
                                found: token.to_string(),
                                expected: "property name after `.`",
                                offset,
                            })
                        }
                        None => {
                            return Err(ExprError::UnexpectedEnd {
                                expected: "property name after `.`",
                            })
                        }
                    };
                    depth = self.wrap(depth)?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: Box::new(Expr::Literal(Value::String(name))),
                    };
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let (property, property_depth) = self.parse_expr()?;
                    self.expect(Token::RBracket, "`]`")?;
                    depth = self.wrap(depth.max(property_depth))?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: Box::new(property),
                    };
                }
                _ => return Ok((expr, depth)),
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Parsed, ExprError> {
        let (token, offset) = self.advance().ok_or(ExprError::UnexpectedEnd {
            expected: "expression",
        })?;
        let leaf = match token {
            Token::Number(n) => Expr::Literal(crate::eval::number(n)),
            Token::String(s) => Expr::Literal(Value::String(s)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "`)`")?;
                return Ok(inner);
            }
            Token::LBracket => {
                let (items, depth) = self.parse_list(Token::RBracket, "`]`")?;
                return Ok((Expr::Array(items), self.wrap(depth)?));
            }
            Token::Ident(name) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok((Expr::Ident(name), 1));
                }
                self.advance();
                let (args, depth) = self.parse_list(Token::RParen, "`)`")?;
                return Ok((Expr::Call { name, args, offset }, self.wrap(depth)?));
            }
            other => {
                return Err(ExprError::Unexpected {
                    found: other.to_string(),
                    expected: "expression",
                    offset,
                })
            }
        };
        Ok((leaf, 1))
    }

    /// Comma-separated expressions up to and including `close`, with the
    /// depth of the deepest one.
    fn parse_list(
        &mut self,
        close: Token,
        expected: &'static str,
    ) -> Result<(Vec<Expr>, usize), ExprError> {
        let mut items = Vec::new();
        let mut depth = 0;
        if self.peek() == Some(&close) {
            self.advance();
            return Ok((items, depth));
        }
        loop {
            let (item, item_depth) = self.parse_expr()?;
            items.push(item);
            depth = depth.max(item_depth);
            match self.advance() {
                Some((Token::Comma, _)) => continue,
                Some((token, _)) if token == close => return Ok((items, depth)),
                Some((token, offset)) => {
                    return Err(ExprError::Unexpected {
                        found: token.to_string(),
                        expected,
                        offset,
                    })
                }
                None => return Err(ExprError::UnexpectedEnd { expected }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn lit(v: Value) -> Expr {
        Expr::Literal(v)
    }

    #[test]
    fn multiplication_binds_tighter() {
        assert_eq!(
            parse("1 + 2 * 3").unwrap(),
            bin(
                BinaryOp::Add,
                lit(json!(1)),
                bin(BinaryOp::Mul, lit(json!(2)), lit(json!(3)))
            )
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(
            parse("5 - 2 - 1").unwrap(),
            bin(
                BinaryOp::Sub,
                bin(BinaryOp::Sub, lit(json!(5)), lit(json!(2))),
                lit(json!(1))
            )
        );
    }

    #[test]
    fn member_chain_and_index() {
        let expr = parse("datum.a['b'][0]").unwrap();
        let Expr::Member { object, property } = expr else {
            panic!("expected member access");
        };
        assert_eq!(*property, lit(json!(0)));
        assert!(matches!(*object, Expr::Member { .. }));
    }

    #[test]
    fn conditional_is_right_associative() {
        let expr = parse("a ? 1 : b ? 2 : 3").unwrap();
        let Expr::Conditional { otherwise, .. } = expr else {
            panic!("expected conditional");
        };
        assert!(matches!(*otherwise, Expr::Conditional { .. }));
    }

    #[test]
    fn calls_record_offsets() {
        let expr = parse("max(abs(x), 2)").unwrap();
        assert_eq!(expr.calls(), vec![("max", 0), ("abs", 4)]);
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let err = parse("a b").unwrap_err();
        assert_eq!(
            err,
            ExprError::Unexpected {
                found: "b".into(),
                expected: "end of expression",
                offset: 2,
            }
        );
    }

    #[test]
    fn unterminated_group() {
        assert_eq!(
            parse("(1 + 2").unwrap_err(),
            ExprError::UnexpectedEnd { expected: "`)`" }
        );
    }

    #[test]
    fn empty_array_and_call() {
        assert_eq!(parse("[]").unwrap(), Expr::Array(vec![]));
        assert_eq!(
            parse("depth()").unwrap(),
            Expr::Call {
                name: "depth".into(),
                args: vec![],
                offset: 0
            }
        );
    }

    #[test]
    fn deep_nesting_is_an_error() {
        for source in [
            "(".repeat(200_000),
            "-".repeat(200_000) + "1",
            "1".to_string() + &"+1".repeat(200_000),
            "a".to_string() + &".b".repeat(200_000),
            "a ? 1 : ".repeat(200_000) + "2",
            "[".repeat(200_000),
        ] {
            assert!(
                matches!(parse(&source), Err(ExprError::TooDeep { limit: MAX_DEPTH, .. })),
                "accepted {}...",
                &source[..16]
            );
        }
    }

    #[test]
    fn nesting_within_the_limit_parses() {
        let source = "(".repeat(MAX_DEPTH - 1) + "1" + &")".repeat(MAX_DEPTH - 1);
        assert_eq!(parse(&source).unwrap(), lit(json!(1)));

        let sum = "1".to_string() + &"+1".repeat(MAX_DEPTH - 2);
        assert!(parse(&sum).is_ok());
    }
}
