//! Parser for SIN source text.
//!
//! A recursive-descent statement parser with a Pratt expression parser
//! underneath. Produces the [`StatementBlock`] tree the code generator
//! consumes; every node carries the line of its first token.

use tracing::trace;

use crate::ast::{Expression, Literal, Operator, Statement, StatementBlock, StatementKind};
use crate::error::ParserError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::types::{DataType, Quality, Type};

/// Precedence for a binary operator token, or `None` if the token does not
/// continue an expression.
fn precedence(token: &Token) -> Option<(Operator, u8)> {
    match token.kind {
        TokenKind::Op => match token.value.as_str() {
            "|" => Some((Operator::BitOr, 4)),
            "&" => Some((Operator::BitAnd, 5)),
            "=" => Some((Operator::Equal, 7)),
            "!=" => Some((Operator::NotEqual, 7)),
            "<" => Some((Operator::Less, 8)),
            ">" => Some((Operator::Greater, 8)),
            "<=" => Some((Operator::LessOrEqual, 8)),
            ">=" => Some((Operator::GreaterOrEqual, 8)),
            "+" => Some((Operator::Plus, 10)),
            "-" => Some((Operator::Minus, 10)),
            "*" => Some((Operator::Mult, 20)),
            "/" => Some((Operator::Div, 20)),
            "%" => Some((Operator::Modulo, 20)),
            _ => None,
        },
        TokenKind::Keyword => match token.value.as_str() {
            "or" => Some((Operator::Or, 2)),
            "and" => Some((Operator::And, 3)),
            _ => None,
        },
        _ => None,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParserError> {
        Ok(Parser {
            tokens: Lexer::tokenize(source)?,
            position: 0,
        })
    }

    /// Parse the whole token stream into a statement block.
    pub fn create_ast(&mut self) -> Result<StatementBlock, ParserError> {
        let mut block = StatementBlock::default();
        while !self.at_end() {
            if self.check_punc(";") {
                self.advance();
                continue;
            }
            block.statements.push(self.parse_statement()?);
        }
        Ok(block)
    }

    // ---- token plumbing ----

    fn at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn current_line(&self) -> usize {
        self.peek()
            .map(|t| t.line)
            .or_else(|| self.tokens.last().map(|t| t.line))
            .unwrap_or(0)
    }

    fn check_punc(&self, value: &str) -> bool {
        self.peek().is_some_and(|t| t.is(TokenKind::Punc, value))
    }

    fn check_op(&self, value: &str) -> bool {
        self.peek().is_some_and(|t| t.is(TokenKind::Op, value))
    }

    fn check_keyword(&self, value: &str) -> bool {
        self.peek().is_some_and(|t| t.is(TokenKind::Keyword, value))
    }

    fn eat_punc(&mut self, value: &str) -> Result<usize, ParserError> {
        let line = self.current_line();
        if self.check_punc(value) {
            self.advance();
            Ok(line)
        } else {
            Err(ParserError::plain(format!("expected '{}'", value), line))
        }
    }

    fn eat_op(&mut self, value: &str) -> Result<(), ParserError> {
        let line = self.current_line();
        if self.check_op(value) {
            self.advance();
            Ok(())
        } else {
            Err(ParserError::plain(format!("expected '{}'", value), line))
        }
    }

    fn eat_ident(&mut self) -> Result<(String, usize), ParserError> {
        let line = self.current_line();
        match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                let name = t.value.clone();
                self.advance();
                Ok((name, line))
            }
            _ => Err(ParserError::plain("expected an identifier", line)),
        }
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        let token = self
            .peek()
            .ok_or_else(|| ParserError::plain("unexpected end of file", line))?
            .clone();

        let statement = match (token.kind, token.value.as_str()) {
            (TokenKind::Keyword, "include") => self.parse_include()?,
            (TokenKind::Keyword, "alloc") => {
                self.advance();
                let stmt = self.parse_allocation()?;
                self.eat_punc(";")?;
                stmt
            }
            (TokenKind::Keyword, "decl") => self.parse_declaration()?,
            (TokenKind::Keyword, "let") => self.parse_assignment()?,
            (TokenKind::Keyword, "if") => self.parse_if()?,
            (TokenKind::Keyword, "while") => self.parse_while()?,
            (TokenKind::Keyword, "def") => self.parse_definition()?,
            (TokenKind::Keyword, "return") => self.parse_return()?,
            (TokenKind::Keyword, "free") => self.parse_free()?,
            (TokenKind::Keyword, "asm") => self.parse_inline_asm()?,
            (TokenKind::Keyword, "pass") => {
                self.advance();
                self.eat_punc(";")?;
                Statement::new(StatementKind::Empty, line)
            }
            (TokenKind::Op, "@") => self.parse_call_statement()?,
            _ => {
                return Err(ParserError::plain(
                    format!("unexpected token '{}'", token.value),
                    line,
                ))
            }
        };
        trace!(line, "parsed statement");
        Ok(statement)
    }

    fn parse_include(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // include
        let filename = match self.peek() {
            Some(t) if t.kind == TokenKind::Str => t.value.clone(),
            _ => {
                return Err(ParserError::plain(
                    "expected a quoted file name after 'include'",
                    line,
                ))
            }
        };
        self.advance();
        self.eat_punc(";")?;
        Ok(Statement::new(StatementKind::Include { filename }, line))
    }

    /// Parse the type and qualities of an allocation or declaration. The
    /// cursor sits on the first quality or type keyword.
    fn parse_type(&mut self) -> Result<DataType, ParserError> {
        let line = self.current_line();
        let mut qualities: Vec<Quality> = Vec::new();

        // prefix qualities, sign specifier last
        while let Some(token) = self.peek() {
            if token.kind != TokenKind::Keyword {
                break;
            }
            match Quality::from_name(&token.value) {
                Some(q) => {
                    qualities.push(q);
                    self.advance();
                }
                None => break,
            }
        }

        let type_line = self.current_line();
        let type_name = match self.peek() {
            Some(t) if t.kind == TokenKind::Keyword => t.value.clone(),
            _ => return Err(ParserError::plain("expected a type name", type_line)),
        };
        let primary = Type::from_name(&type_name)
            .ok_or_else(|| ParserError::plain(format!("'{}' is not a type", type_name), type_line))?;
        self.advance();

        let data_type = match primary {
            Type::Ptr => {
                self.eat_op("<")
                    .map_err(|_| ParserError::plain("proper syntax is 'alloc ptr<type>'", line))?;
                let subtype = self.parse_type_name()?;
                self.eat_op(">")
                    .map_err(|_| {
                        ParserError::plain("pointer type must be enclosed in angle brackets", line)
                    })?;
                DataType::pointer(subtype)
            }
            Type::Array => {
                self.eat_op("<").map_err(|_| {
                    ParserError::plain("you must specify the size and type of an array", line)
                })?;
                let length_line = self.current_line();
                let length = match self.peek() {
                    Some(t) if t.kind == TokenKind::Int => {
                        t.value.parse::<usize>().map_err(|_| {
                            ParserError::plain("invalid array length", length_line)
                        })?
                    }
                    _ => {
                        return Err(ParserError::plain(
                            "the size of an array must be a positive integer",
                            length_line,
                        ))
                    }
                };
                self.advance();
                self.eat_punc(",").map_err(|_| {
                    ParserError::plain("the size of an array must be followed by the type", line)
                })?;
                let subtype = self.parse_type_name()?;
                self.eat_op(">")?;
                DataType::array(length, subtype)
            }
            other => DataType::new(other),
        };

        let data_type = data_type.with_qualities(&qualities);
        data_type
            .validate()
            .map_err(|msg| ParserError::plain(msg, line))?;
        Ok(data_type)
    }

    fn parse_type_name(&mut self) -> Result<Type, ParserError> {
        let line = self.current_line();
        let name = match self.peek() {
            Some(t) if t.kind == TokenKind::Keyword => t.value.clone(),
            _ => return Err(ParserError::plain("expected a type name", line)),
        };
        let parsed = Type::from_name(&name)
            .ok_or_else(|| ParserError::plain(format!("'{}' is not a type", name), line))?;
        self.advance();
        Ok(parsed)
    }

    /// `alloc` has been consumed; parse `<quals> <type> <name> [: <expr>]
    /// [& <quals>]`. Shared by allocation statements and formal parameters.
    fn parse_allocation(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        let mut data_type = self.parse_type()?;
        let (name, _) = self.eat_ident()?;

        let mut initialized = false;
        let mut initial_value = None;
        if self.check_punc(":") {
            self.advance();
            initialized = true;
            initial_value = Some(self.parse_expression(0)?);
        }

        // postfix qualities: `alloc int x: 10 &const unsigned;`
        if self.check_op("&") {
            self.advance();
            let mut any = false;
            while let Some(token) = self.peek() {
                if token.kind != TokenKind::Keyword {
                    break;
                }
                match Quality::from_name(&token.value) {
                    Some(q) => {
                        data_type.add_quality(q);
                        self.advance();
                        any = true;
                    }
                    None => break,
                }
            }
            if !any {
                return Err(ParserError::plain(
                    "expected symbol quality following '&'",
                    self.current_line(),
                ));
            }
            data_type
                .validate()
                .map_err(|msg| ParserError::plain(msg, line))?;
        }

        Ok(Statement::new(
            StatementKind::Allocation {
                data_type,
                name,
                initialized,
                initial_value,
            },
            line,
        ))
    }

    fn parse_declaration(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // decl
        let data_type = self.parse_type()?;
        let (name, _) = self.eat_ident()?;

        let mut is_function = false;
        let mut formal_parameters = Vec::new();
        if self.check_punc("(") {
            is_function = true;
            formal_parameters = self.parse_formal_parameters()?;
        }
        self.eat_punc(";")?;
        Ok(Statement::new(
            StatementKind::Declaration {
                data_type,
                name,
                is_function,
                formal_parameters,
            },
            line,
        ))
    }

    fn parse_assignment(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // let
        let lvalue = self.parse_primary()?;
        match lvalue {
            Expression::LValue(_) | Expression::Indexed { .. } | Expression::Dereferenced(_) => {}
            _ => {
                return Err(ParserError::plain(
                    "expression is not a modifiable-lvalue",
                    line,
                ))
            }
        }
        self.eat_op("=")?;
        let rvalue = self.parse_expression(0)?;
        self.eat_punc(";")?;
        Ok(Statement::new(
            StatementKind::Assignment { lvalue, rvalue },
            line,
        ))
    }

    fn parse_block(&mut self) -> Result<StatementBlock, ParserError> {
        self.eat_punc("{")?;
        let mut block = StatementBlock::default();
        while !self.check_punc("}") {
            if self.at_end() {
                return Err(ParserError::plain(
                    "unexpected end of file in block",
                    self.current_line(),
                ));
            }
            if self.check_punc(";") {
                self.advance();
                continue;
            }
            block.statements.push(self.parse_statement()?);
        }
        self.eat_punc("}")?;
        Ok(block)
    }

    fn parse_if(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // if
        let condition = self.parse_expression(0)?;
        let if_branch = self.parse_block()?;
        let else_branch = if self.check_keyword("else") {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Statement::new(
            StatementKind::IfThenElse {
                condition,
                if_branch,
                else_branch,
            },
            line,
        ))
    }

    fn parse_while(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // while
        let condition = self.parse_expression(0)?;
        let body = self.parse_block()?;
        Ok(Statement::new(
            StatementKind::WhileLoop { condition, body },
            line,
        ))
    }

    fn parse_formal_parameters(&mut self) -> Result<Vec<Statement>, ParserError> {
        self.eat_punc("(")?;
        let mut parameters = Vec::new();
        while !self.check_punc(")") {
            let line = self.current_line();
            if !self.check_keyword("alloc") {
                return Err(ParserError::plain(
                    "only allocation statements are allowed in function parameter definitions",
                    line,
                ));
            }
            self.advance();
            parameters.push(self.parse_allocation()?);
            if self.check_punc(",") {
                self.advance();
            } else if !self.check_punc(")") {
                return Err(ParserError::plain(
                    "expected ',' or ')' in parameter list",
                    self.current_line(),
                ));
            }
        }
        self.eat_punc(")")?;
        Ok(parameters)
    }

    fn parse_definition(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // def
        let return_type = self.parse_type()?;
        let (name, _) = self.eat_ident()?;
        let formal_parameters = self.parse_formal_parameters()?;
        let procedure = self.parse_block()?;
        Ok(Statement::new(
            StatementKind::Definition {
                name,
                return_type,
                formal_parameters,
                procedure,
            },
            line,
        ))
    }

    fn parse_return(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // return
        let value = if self.check_punc(";") {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.eat_punc(";")?;
        Ok(Statement::new(StatementKind::Return { value }, line))
    }

    fn parse_free(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // free
        let (name, _) = self.eat_ident()?;
        self.eat_punc(";")?;
        Ok(Statement::new(StatementKind::Free { name }, line))
    }

    fn parse_inline_asm(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // asm
        let dialect = match self.peek() {
            Some(t) if t.kind == TokenKind::AsmTag => t.value.clone(),
            _ => return Err(ParserError::plain("expected assembly dialect tag", line)),
        };
        self.advance();
        let code = match self.peek() {
            Some(t) if t.kind == TokenKind::AsmBody => t.value.clone(),
            _ => return Err(ParserError::plain("expected assembly block", line)),
        };
        self.advance();
        if self.check_punc(";") {
            self.advance();
        }
        Ok(Statement::new(
            StatementKind::InlineAssembly { dialect, code },
            line,
        ))
    }

    fn parse_call_statement(&mut self) -> Result<Statement, ParserError> {
        let line = self.current_line();
        self.advance(); // @
        let (name, _) = self.eat_ident()?;
        let args = self.parse_call_args()?;
        self.eat_punc(";")?;
        Ok(Statement::new(StatementKind::Call { name, args }, line))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expression>, ParserError> {
        self.eat_punc("(")?;
        let mut args = Vec::new();
        while !self.check_punc(")") {
            args.push(self.parse_expression(0)?);
            if self.check_punc(",") {
                self.advance();
            } else if !self.check_punc(")") {
                return Err(ParserError::plain(
                    "expected ',' or ')' in argument list",
                    self.current_line(),
                ));
            }
        }
        self.eat_punc(")")?;
        Ok(args)
    }

    // ---- expressions ----

    fn parse_expression(&mut self, my_precedence: u8) -> Result<Expression, ParserError> {
        let left = self.parse_primary()?;
        self.maybe_binary(left, my_precedence)
    }

    fn maybe_binary(
        &mut self,
        left: Expression,
        my_precedence: u8,
    ) -> Result<Expression, ParserError> {
        let mut left = left;
        while let Some(token) = self.peek() {
            let Some((operator, their_precedence)) = precedence(token) else {
                break;
            };
            if their_precedence <= my_precedence {
                break;
            }
            self.advance();
            let right = self.parse_expression(their_precedence)?;
            left = Expression::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParserError> {
        let line = self.current_line();
        let token = self
            .peek()
            .ok_or_else(|| ParserError::plain("unexpected end of expression", line))?
            .clone();

        match (token.kind, token.value.as_str()) {
            (TokenKind::Int, _) => {
                self.advance();
                Ok(Expression::Literal(Literal {
                    data_type: DataType::new(Type::Int),
                    value: token.value,
                }))
            }
            (TokenKind::Float, _) => {
                self.advance();
                Ok(Expression::Literal(Literal {
                    data_type: DataType::new(Type::Float),
                    value: token.value,
                }))
            }
            (TokenKind::Str, _) => {
                self.advance();
                Ok(Expression::Literal(Literal {
                    data_type: DataType::new(Type::String),
                    value: token.value,
                }))
            }
            (TokenKind::Bool, _) => {
                self.advance();
                Ok(Expression::Literal(Literal {
                    data_type: DataType::new(Type::Bool),
                    value: token.value,
                }))
            }
            (TokenKind::Punc, "(") => {
                self.advance();
                let inner = self.parse_expression(0)?;
                self.eat_punc(")")?;
                Ok(inner)
            }
            (TokenKind::Punc, "{") => {
                self.advance();
                let mut members = Vec::new();
                while !self.check_punc("}") {
                    members.push(self.parse_expression(0)?);
                    if self.check_punc(",") {
                        self.advance();
                    } else if !self.check_punc("}") {
                        return Err(ParserError::plain(
                            "expected ',' or '}' in list expression",
                            self.current_line(),
                        ));
                    }
                }
                self.eat_punc("}")?;
                Ok(Expression::List(members))
            }
            (TokenKind::Op, "-") => {
                self.advance();
                let operand = self.parse_expression(25)?;
                Ok(Expression::Unary {
                    operator: Operator::Minus,
                    operand: Box::new(operand),
                })
            }
            (TokenKind::Op, "+") => {
                self.advance();
                let operand = self.parse_expression(25)?;
                Ok(Expression::Unary {
                    operator: Operator::Plus,
                    operand: Box::new(operand),
                })
            }
            (TokenKind::Op, "!") | (TokenKind::Keyword, "not") => {
                self.advance();
                let operand = self.parse_expression(25)?;
                Ok(Expression::Unary {
                    operator: Operator::Not,
                    operand: Box::new(operand),
                })
            }
            (TokenKind::Op, "*") => {
                self.advance();
                let inner = self.parse_primary()?;
                let deref = Expression::Dereferenced(Box::new(inner));
                if deref.dereferenced_root().is_none() {
                    return Err(ParserError::plain(
                        "may only dereference a named pointer",
                        line,
                    ));
                }
                Ok(deref)
            }
            (TokenKind::Op, "$") => {
                self.advance();
                let (name, _) = self.eat_ident()?;
                Ok(Expression::AddressOf(name))
            }
            (TokenKind::Op, "@") => {
                self.advance();
                let (name, _) = self.eat_ident()?;
                let args = self.parse_call_args()?;
                Ok(Expression::ValueReturningCall { name, args })
            }
            (TokenKind::Keyword, "sizeof") => {
                self.advance();
                self.eat_op("<")?;
                let type_line = self.current_line();
                let type_name = match self.peek() {
                    Some(t) if t.kind == TokenKind::Keyword || t.kind == TokenKind::Ident => {
                        t.value.clone()
                    }
                    _ => {
                        return Err(ParserError::plain(
                            "expected a type name in sizeof",
                            type_line,
                        ))
                    }
                };
                self.advance();
                self.eat_op(">")?;
                Ok(Expression::SizeOf(type_name))
            }
            (TokenKind::Ident, _) => {
                self.advance();
                if self.check_punc("[") {
                    self.advance();
                    let index = self.parse_expression(0)?;
                    self.eat_punc("]")?;
                    Ok(Expression::Indexed {
                        name: token.value,
                        index: Box::new(index),
                    })
                } else {
                    Ok(Expression::LValue(token.value))
                }
            }
            _ => Err(ParserError::plain(
                format!("unexpected token '{}' in expression", token.value),
                line,
            )),
        }
    }
}
