//! Recursive-descent parser over [`tokenize`](crate::lexer::tokenize) output.

use std::sync::Arc;

use crate::{
    ast::{BinOp, Expr, FunctionDef, Handler, Literal, Stmt},
    lexer::{Spanned, SyntaxError, Token, tokenize},
};

const KEYWORDS: [&str; 20] = [
    "and", "as", "async", "await", "def", "elif", "else", "except", "finally", "from", "if",
    "import", "in", "not", "or", "pass", "raise", "return", "try", "while",
];

/// Parse a whole program.
///
/// # Errors
/// Returns the first syntax error.
pub fn parse(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut program = Vec::new();
    while !parser.at(&Token::Eof) {
        if parser.at(&Token::Indent) {
            return Err(parser.error("unexpected indent"));
        }
        program.extend(parser.statement()?);
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |s| s.line)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let hit = self.at_op(op);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        let hit = self.at_keyword(kw);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn error(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message, self.line())
    }

    fn expect_op(&mut self, op: &str) -> Result<(), SyntaxError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{op}'")))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), SyntaxError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{kw}'")))
        }
    }

    fn identifier(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            Token::Name(n) if !KEYWORDS.contains(&n.as_str()) => {
                let name = n.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let Token::Name(word) = self.peek() else {
            return self.simple_statements();
        };
        match word.as_str() {
            "if" => Ok(vec![self.if_statement()?]),
            "def" => Ok(vec![self.function(false)?]),
            "async" => {
                self.pos += 1;
                if !self.at_keyword("def") {
                    return Err(self.error("expected 'def' after 'async'"));
                }
                Ok(vec![self.function(true)?])
            }
            "try" => Ok(vec![self.try_statement()?]),
            "while" => Err(self.error("loops are not supported")),
            _ => self.simple_statements(),
        }
    }

    fn simple_statements(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = vec![self.small_statement()?];
        while self.eat_op(";") {
            if self.at(&Token::Newline) {
                break;
            }
            stmts.push(self.small_statement()?);
        }
        if !matches!(self.advance(), Token::Newline) {
            return Err(self.error("invalid syntax"));
        }
        Ok(stmts)
    }

    fn small_statement(&mut self) -> Result<Stmt, SyntaxError> {
        if self.eat_keyword("pass") {
            return Ok(Stmt::Pass);
        }
        if self.at_keyword("import") || self.at_keyword("from") {
            while !matches!(self.peek(), Token::Newline | Token::Eof) && !self.at_op(";") {
                self.pos += 1;
            }
            return Ok(Stmt::Import);
        }
        if self.eat_keyword("return") {
            if self.at(&Token::Newline) || self.at_op(";") {
                return Ok(Stmt::Return(None));
            }
            return Ok(Stmt::Return(Some(self.expression()?)));
        }
        if self.eat_keyword("raise") {
            if self.at(&Token::Newline) || self.at_op(";") {
                return Ok(Stmt::Raise(None));
            }
            return Ok(Stmt::Raise(Some(self.expression()?)));
        }

        let expr = self.expression()?;
        for (op, bin) in [("=", None), ("+=", Some(BinOp::Add)), ("-=", Some(BinOp::Sub))] {
            if !self.eat_op(op) {
                continue;
            }
            let Expr::Name(target) = expr else {
                return Err(self.error("cannot assign to expression"));
            };
            let value = self.expression()?;
            let value = match bin {
                None => value,
                Some(bin) => Expr::Binary(Box::new(Expr::Name(target.clone())), bin, Box::new(value)),
            };
            return Ok(Stmt::Assign(target, value));
        }
        Ok(Stmt::Expr(expr))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect_op(":")?;
        if !self.at(&Token::Newline) {
            return self.simple_statements();
        }
        self.pos += 1;
        if !matches!(self.advance(), Token::Indent) {
            return Err(self.error("expected an indented block"));
        }
        let mut body = Vec::new();
        while !matches!(self.peek(), Token::Dedent | Token::Eof) {
            body.extend(self.statement()?);
        }
        self.pos += 1;
        Ok(body)
    }

    fn if_statement(&mut self) -> Result<Stmt, SyntaxError> {
        // `if` or `elif`
        self.pos += 1;
        let cond = self.expression()?;
        let then = self.block()?;
        let otherwise = if self.at_keyword("elif") {
            vec![self.if_statement()?]
        } else if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn function(&mut self, is_async: bool) -> Result<Stmt, SyntaxError> {
        self.expect_keyword("def")?;
        let name = self.identifier()?;
        self.expect_op("(")?;
        let mut params = Vec::new();
        while !self.eat_op(")") {
            params.push(self.identifier()?);
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        let body = self.block()?;
        Ok(Stmt::Def(Arc::new(FunctionDef {
            name,
            params,
            body,
            is_async,
        })))
    }

    fn try_statement(&mut self) -> Result<Stmt, SyntaxError> {
        self.expect_keyword("try")?;
        let body = self.block()?;
        let mut handlers = Vec::new();
        while self.eat_keyword("except") {
            let kind = if self.at_op(":") {
                None
            } else {
                Some(self.identifier()?)
            };
            let binding = if self.eat_keyword("as") {
                Some(self.identifier()?)
            } else {
                None
            };
            handlers.push(Handler {
                kind,
                binding,
                body: self.block()?,
            });
        }
        let finally = if self.eat_keyword("finally") {
            self.block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finally.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        Ok(Stmt::Try {
            body,
            handlers,
            finally,
        })
    }

    fn expression(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.additive()?;
        for (op, bin) in [("==", BinOp::Eq), ("!=", BinOp::NotEq)] {
            if self.eat_op(op) {
                let right = self.additive()?;
                return Ok(Expr::Binary(Box::new(left), bin, Box::new(right)));
            }
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.unary()?;
        loop {
            let bin = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.unary()?;
            left = Expr::Binary(Box::new(left), bin, Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat_keyword("await") {
            return Ok(Expr::Await(Box::new(self.postfix()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("(") {
                let (args, kwargs) = self.arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat_op(".") {
                expr = Expr::Attr(Box::new(expr), self.identifier()?);
            } else if self.eat_op("[") {
                let index = self.expression()?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), SyntaxError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat_op(")") {
            let keyword = matches!(self.peek(), Token::Name(_))
                && matches!(self.peek_nth(1), Token::Op("="));
            if keyword {
                let name = self.identifier()?;
                self.pos += 1;
                kwargs.push((name, self.expression()?));
            } else if kwargs.is_empty() {
                args.push(self.expression()?);
            } else {
                return Err(self.error("positional argument follows keyword argument"));
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Literal::Int(n))),
            Token::Float(f) => Ok(Expr::Literal(Literal::Float(f))),
            Token::Str(mut s) => {
                // adjacent literals concatenate
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Literal::Str(s)))
            }
            Token::Name(name) => match name.as_str() {
                "None" => Ok(Expr::Literal(Literal::None)),
                "True" => Ok(Expr::Literal(Literal::Bool(true))),
                "False" => Ok(Expr::Literal(Literal::Bool(false))),
                kw if KEYWORDS.contains(&kw) => Err(SyntaxError::new("invalid syntax", self.line())),
                _ => Ok(Expr::Name(name)),
            },
            Token::Op("(") => {
                let inner = self.expression()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Op("[") => {
                let mut items = Vec::new();
                while !self.eat_op("]") {
                    items.push(self.expression()?);
                    if !self.eat_op(",") {
                        self.expect_op("]")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::Op("{") => {
                let mut entries = Vec::new();
                while !self.eat_op("}") {
                    let key = self.expression()?;
                    self.expect_op(":")?;
                    entries.push((key, self.expression()?));
                    if !self.eat_op(",") {
                        self.expect_op("}")?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            _ => Err(SyntaxError::new("invalid syntax", self.line())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolons_and_calls() {
        let program = parse("print(\"hi\"); send_result(1)").unwrap();
        assert_eq!(program.len(), 2);
        assert!(matches!(&program[0], Stmt::Expr(Expr::Call { args, .. }) if args.len() == 1));
    }

    #[test]
    fn test_wrapped_program() {
        let source = "import asyncio\n\nasync def __run_code():\n    try:\n        x = await input('? ')\n    except Exception as __bridge_exc:\n        report_exception(__bridge_exc)\n\nawait __run_code()\n";
        let program = parse(source).unwrap();
        assert_eq!(program.len(), 3);
        let Stmt::Def(def) = &program[1] else {
            panic!("expected a definition, got {:?}", program[1]);
        };
        assert!(def.is_async);
        let Stmt::Try { handlers, .. } = &def.body[0] else {
            panic!("expected try");
        };
        assert_eq!(handlers[0].kind.as_deref(), Some("Exception"));
        assert_eq!(handlers[0].binding.as_deref(), Some("__bridge_exc"));
        assert!(matches!(&program[2], Stmt::Expr(Expr::Await(_))));
    }

    #[test]
    fn test_keyword_arguments() {
        let program = parse("print('x', end='', file=sys.stderr)").unwrap();
        let Stmt::Expr(Expr::Call { args, kwargs, .. }) = &program[0] else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert_eq!(kwargs[0].0, "end");
        assert!(matches!(&kwargs[1].1, Expr::Attr(_, attr) if attr == "stderr"));
    }

    #[test]
    fn test_if_elif_else() {
        let program = parse("if a == 1:\n    x = 1\nelif a:\n    x = 2\nelse:\n    x = 3\n").unwrap();
        let Stmt::If { otherwise, .. } = &program[0] else {
            panic!("expected if");
        };
        assert!(matches!(&otherwise[0], Stmt::If { otherwise, .. } if otherwise.len() == 1));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("x = (1").is_err());
        assert!(parse("  x = 1").is_err());
        assert!(parse("f(a=1, 2)").is_err());
        assert!(parse("1 = x").is_err());
    }
}
