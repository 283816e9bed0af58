use std::borrow::Cow;
use std::cell::Cell;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{alpha1, char, digit0, digit1, multispace1, not_line_ending, one_of, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value, verify},
    error::{Error as NomError, ErrorKind},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::ast::{Expr, Ident, Opcode, Stmt, StmtBlock};
use crate::error::Error;

/// Words that can never be used as identifiers
const KEYWORDS: &[&str] = &[
    "break", "else", "false", "fn", "if", "let", "loop", "null", "return", "throw", "true",
];

/// Maximum depth of nested expressions, operator chains and blocks in a program
pub const MAX_NESTING: usize = 256;

thread_local! {
    /// Nesting depth of the parse in progress on this thread
    static NESTING: Cell<usize> = Cell::new(0);
}

/// Runs `inner` `levels` deeper than the current nesting
///
/// Fails with `ErrorKind::TooLarge` once the depth would exceed MAX_NESTING, so that deeply
/// nested input is rejected before it exhausts the native stack.
fn nested<'a, O, F>(i: &'a str, levels: usize, inner: F) -> IResult<&'a str, O>
where
    F: FnOnce(&'a str) -> IResult<&'a str, O>,
{
    let outer = NESTING.with(Cell::get);
    if outer + levels > MAX_NESTING {
        return Err(nom::Err::Failure(NomError::new(i, ErrorKind::TooLarge)));
    }
    NESTING.with(|n| n.set(outer + levels));
    let res = inner(i);
    NESTING.with(|n| n.set(outer));
    res
}

/// Skips whitespace and `//` line comments
fn blank(i: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, preceded(tag("//"), not_line_ending)))))(i)
}

/// Runs `inner` after skipping any leading blanks
fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    preceded(blank, inner)
}

/// Returns true if the char is valid for an identifier (not in first position)
fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parser for a keyword: the word must not continue into an identifier ("iffy" is not "if")
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(terminated(tag(kw), not(satisfy(is_ident_char))))
}

/// Parser for a single language identifier (e.g. "name1")
///
/// Boolean literals match in any case, so "True" is no more an identifier than "true".
fn ident(i: &str) -> IResult<&str, Ident> {
    ws(verify(
        recognize(pair(alt((alpha1, tag("_"))), take_while(is_ident_char))),
        |s: &str| {
            !KEYWORDS.contains(&s) && !s.eq_ignore_ascii_case("true") && !s.eq_ignore_ascii_case("false")
        },
    ))(i)
}

/// Parser for a single real number: optional integer component, period, decimal digits and an
/// optional exponent (e.g. "123.456", ".5", "1.5e-3")
fn real(i: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            digit0,
            char('.'),
            digit1,
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>(),
    )(i)
}

/// Parser for a single integer number. Literals too large for an i64 fall back to reals.
fn number(i: &str) -> IResult<&str, Expr> {
    alt((
        map(real, Expr::Real),
        map(map_res(digit1, |s: &str| s.parse::<i64>()), Expr::Int),
        map(map_res(digit1, |s: &str| s.parse::<f64>()), Expr::Real),
    ))(i)
}

/// Parser for Boolean literals
fn bool_literal(i: &str) -> IResult<&str, bool> {
    terminated(
        alt((
            value(true, tag_no_case("true")),
            value(false, tag_no_case("false")),
        )),
        not(satisfy(is_ident_char)),
    )(i)
}

/// Resolves the char following a `\` in a string literal; `rest` starts after that char
fn unescape(c: char, rest: &str) -> Option<(char, usize)> {
    let ch = match c {
        'n'  => '\n',
        't'  => '\t',
        'r'  => '\r',
        '0'  => '\0',
        '\\' => '\\',
        '"'  => '"',
        '\'' => '\'',
        'u'  => {
            let body = rest.strip_prefix('{')?;
            let end = body.find('}')?;
            let code = u32::from_str_radix(&body[..end], 16).ok()?;
            return char::from_u32(code).map(|ch| (ch, end + 2));
        }
        _ => return None,
    };
    Some((ch, 0))
}

/// Parser for the body of a string literal up to (not including) the closing `quote`
///
/// Borrows from the source unless the body contains escapes.
fn string_body<'a>(quote: char) -> impl FnMut(&'a str) -> IResult<&'a str, Cow<'a, str>> {
    move |i: &'a str| {
        let mut owned: Option<String> = None;
        let mut pos = 0;
        while let Some(c) = i[pos..].chars().next() {
            if c == quote {
                let body = match owned {
                    Some(s) => Cow::Owned(s),
                    None => Cow::Borrowed(&i[..pos]),
                };
                return Ok((&i[pos..], body));
            }
            if c == '\\' {
                let buf = owned.get_or_insert_with(|| i[..pos].to_string());
                let after = &i[pos + 1..];
                let esc = match after.chars().next() {
                    Some(esc) => esc,
                    None => break,
                };
                match unescape(esc, &after[esc.len_utf8()..]) {
                    Some((ch, extra)) => {
                        buf.push(ch);
                        pos += 1 + esc.len_utf8() + extra;
                    }
                    None => {
                        return Err(nom::Err::Failure(NomError::new(&i[pos..], ErrorKind::Escaped)));
                    }
                }
                continue;
            }
            if let Some(buf) = owned.as_mut() {
                buf.push(c);
            }
            pos += c.len_utf8();
        }
        Err(nom::Err::Error(NomError::new(i, ErrorKind::Char)))
    }
}

/// Parser for string literals (characters enclosed by '"' or '\'' characters)
fn str_literal(i: &str) -> IResult<&str, Cow<str>> {
    ws(alt((
        delimited(char('"'), string_body('"'), char('"')),
        delimited(char('\''), string_body('\''), char('\'')),
    )))(i)
}


// --- Expressions ---

/// Parser for "||"
fn or_opcode(i: &str) -> IResult<&str, Opcode> {
    ws(value(Opcode::LogicalOr, tag("||")))(i)
}

/// Parser for "^"
fn xor_opcode(i: &str) -> IResult<&str, Opcode> {
    ws(value(Opcode::LogicalXor, tag("^")))(i)
}

/// Parser for "&&"
fn and_opcode(i: &str) -> IResult<&str, Opcode> {
    ws(value(Opcode::LogicalAnd, tag("&&")))(i)
}

/// Parser for "==", "!=" Opcodes
fn equality_opcode(i: &str) -> IResult<&str, Opcode> {
    ws(alt((
        value(Opcode::Equal,    tag("==")),
        value(Opcode::NotEqual, tag("!=")),
    )))(i)
}

/// Parser for relational Opcodes (e.g. <, >=)
fn relational_opcode(i: &str) -> IResult<&str, Opcode> {
    ws(alt((
        value(Opcode::LessThanOrEqual,    tag("<=")),
        value(Opcode::GreaterThanOrEqual, tag(">=")),
        value(Opcode::LessThan,           tag("<")),
        value(Opcode::GreaterThan,        tag(">")),
    )))(i)
}

/// Parser for "+", "-" Opcodes
fn sum_opcode(i: &str) -> IResult<&str, Opcode> {
    ws(alt((
        value(Opcode::Add, char('+')),
        value(Opcode::Sub, char('-')),
    )))(i)
}

/// Parser for "*", "/", "%" Opcodes
fn product_opcode(i: &str) -> IResult<&str, Opcode> {
    ws(alt((
        value(Opcode::Mul, char('*')),
        value(Opcode::Div, char('/')),
        value(Opcode::Mod, char('%')),
    )))(i)
}

/// Parser for a unary Opcode ("!" or "-")
fn unary_opcode(i: &str) -> IResult<&str, Opcode> {
    ws(alt((
        value(Opcode::Not, char('!')),
        value(Opcode::Neg, char('-')),
    )))(i)
}

/// Parses a chain of `operand (opcode operand)*` into left-associative BinOps
///
/// Every link deepens the resulting tree by one, so it counts as a nesting level.
fn left_assoc<'a>(
    i: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expr<'a>>,
    opcode: fn(&'a str) -> IResult<&'a str, Opcode>,
) -> IResult<&'a str, Expr<'a>> {
    let (mut i, mut lhs) = operand(i)?;
    let mut links = 0;
    loop {
        let (rest, op) = match opcode(i) {
            Ok(res) => res,
            Err(nom::Err::Error(_)) => return Ok((i, lhs)),
            Err(e) => return Err(e),
        };
        match nested(rest, links + 1, operand) {
            Ok((rest, rhs)) => {
                lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
                i = rest;
                links += 1;
            }
            Err(nom::Err::Error(_)) => return Ok((i, lhs)),
            Err(e) => return Err(e),
        }
    }
}

/// Parser for any language expression
fn expr(i: &str) -> IResult<&str, Expr> {
    nested(i, 1, |i| left_assoc(i, xor_expr, or_opcode))
}

/// Parser for logical xor expressions (e.g. true ^ false)
fn xor_expr(i: &str) -> IResult<&str, Expr> {
    left_assoc(i, and_expr, xor_opcode)
}

/// Parser for logical and expressions (e.g. a && b)
fn and_expr(i: &str) -> IResult<&str, Expr> {
    left_assoc(i, equality_expr, and_opcode)
}

/// Parser for equality expressions (e.g. 1 == 2)
fn equality_expr(i: &str) -> IResult<&str, Expr> {
    left_assoc(i, relational_expr, equality_opcode)
}

/// Parser for relational expressions (e.g. 1 < 2)
fn relational_expr(i: &str) -> IResult<&str, Expr> {
    left_assoc(i, sum_expr, relational_opcode)
}

/// Parser for sum expressions (e.g. 1 + 2)
fn sum_expr(i: &str) -> IResult<&str, Expr> {
    left_assoc(i, product_expr, sum_opcode)
}

/// Parser for product expressions (e.g. 2 * 3)
fn product_expr(i: &str) -> IResult<&str, Expr> {
    left_assoc(i, unary_expr, product_opcode)
}

/// Parser for any unary operation (e.g. "!true", "-a")
fn unary_expr(i: &str) -> IResult<&str, Expr> {
    alt((
        map(
            pair(unary_opcode, |i| nested(i, 1, unary_expr)),
            |(op, x)| Expr::UnaryOp(op, Box::new(x)),
        ),
        postfix_expr,
    ))(i)
}

/// Parser for a comma-separated list of expressions between `open` and `close`; a trailing comma
/// is allowed
fn expr_list<'a>(open: char, close: char) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<Expr<'a>>> {
    delimited(
        ws(char(open)),
        terminated(separated_list0(ws(char(',')), expr), opt(ws(char(',')))),
        ws(char(close)),
    )
}

/// Suffix applied to a primary expression
enum Postfix<'src> {
    Call(Vec<Expr<'src>>),
    Index(Expr<'src>),
    Member(Ident<'src>),
}

/// Parser for call arguments, an index or a member name following an expression
fn postfix(i: &str) -> IResult<&str, Postfix> {
    alt((
        map(expr_list('(', ')'), Postfix::Call),
        map(delimited(ws(char('[')), expr, ws(char(']'))), Postfix::Index),
        map(preceded(ws(char('.')), ident), Postfix::Member),
    ))(i)
}

/// Parser for a primary expression followed by any number of calls, indexes and member accesses
fn postfix_expr(i: &str) -> IResult<&str, Expr> {
    let (mut i, mut target) = primary(i)?;
    loop {
        match postfix(i) {
            Ok((rest, suffix)) => {
                target = match suffix {
                    Postfix::Call(args)  => Expr::FuncCall(Box::new(target), args),
                    Postfix::Index(idx)  => Expr::Index(Box::new(target), Box::new(idx)),
                    Postfix::Member(key) => Expr::Member(Box::new(target), key),
                };
                i = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((i, target)),
            Err(e) => return Err(e),
        }
    }
}

/// Parser for a dict key: a string literal or a bare identifier
fn dict_key(i: &str) -> IResult<&str, Cow<str>> {
    alt((str_literal, map(ident, Cow::Borrowed)))(i)
}

/// Parser for a key / value (expr) pair
fn key_val_pair(i: &str) -> IResult<&str, (Cow<str>, Expr)> {
    pair(dict_key, preceded(ws(char(':')), expr))(i)
}

/// Parser for Dict literals
fn dict_literal(i: &str) -> IResult<&str, Expr> {
    map(
        delimited(
            ws(char('{')),
            terminated(separated_list0(ws(char(',')), key_val_pair), opt(ws(char(',')))),
            ws(char('}')),
        ),
        Expr::Dict,
    )(i)
}

/// Parser for any language expression that results in a single value
fn primary(i: &str) -> IResult<&str, Expr> {
    preceded(
        blank,
        alt((
            number,
            map(bool_literal, Expr::Bool),
            value(Expr::None, keyword("null")),
            map(str_literal, Expr::Str),
            map(expr_list('[', ']'), Expr::List),
            dict_literal,
            delimited(char('('), expr, ws(char(')'))),
            map(ident, Expr::Id),
        )),
    )(i)
}


// --- Statements ---

fn break_statement(i: &str) -> IResult<&str, Stmt> {
    value(Stmt::Break, keyword("break"))(i)
}

fn expr_statement(i: &str) -> IResult<&str, Stmt> {
    map(expr, Stmt::Expr)(i)
}

fn fndef_statement(i: &str) -> IResult<&str, Stmt> {
    map(
        tuple((
            preceded(keyword("fn"), ident),
            delimited(
                ws(char('(')),
                terminated(separated_list0(ws(char(',')), ident), opt(ws(char(',')))),
                ws(char(')')),
            ),
            statement_block,
        )),
        |(id, args, stmts)| Stmt::FnDef(id, args, stmts),
    )(i)
}

/// Parser for "if" with an optional "else" block or chained "else if"
fn if_statement(i: &str) -> IResult<&str, Stmt> {
    let (i, cond) = preceded(keyword("if"), expr)(i)?;
    let (i, stmts) = statement_block(i)?;
    let (i, else_stmts) = opt(preceded(
        keyword("else"),
        alt((statement_block, map(|i| nested(i, 1, if_statement), |s| vec![s]))),
    ))(i)?;
    let stmt = match else_stmts {
        Some(else_stmts) => Stmt::IfElse(cond, stmts, else_stmts),
        None => Stmt::If(cond, stmts),
    };
    Ok((i, stmt))
}

fn let_statement(i: &str) -> IResult<&str, Stmt> {
    map(
        pair(
            preceded(keyword("let"), ident),
            preceded(assign_op, expr),
        ),
        |(id, val)| Stmt::Let(id, val),
    )(i)
}

/// Parser for "=" that is not the start of "=="
fn assign_op(i: &str) -> IResult<&str, char> {
    ws(terminated(char('='), not(char('='))))(i)
}

fn list_assignment_statement(i: &str) -> IResult<&str, Stmt> {
    map(
        tuple((
            ident,
            delimited(ws(char('[')), expr, ws(char(']'))),
            preceded(assign_op, expr),
        )),
        |(id, idx, val)| Stmt::ListItemAssignment(id, idx, val),
    )(i)
}

fn loop_statement(i: &str) -> IResult<&str, Stmt> {
    map(preceded(keyword("loop"), statement_block), Stmt::Loop)(i)
}

fn return_statement(i: &str) -> IResult<&str, Stmt> {
    map(preceded(keyword("return"), opt(expr)), |val| {
        Stmt::Return(val.unwrap_or(Expr::None))
    })(i)
}

fn throw_statement(i: &str) -> IResult<&str, Stmt> {
    map(preceded(keyword("throw"), expr), Stmt::Throw)(i)
}

/// Parser for a single supported statement of any type
fn statement(i: &str) -> IResult<&str, Stmt> {
    alt((
        break_statement,
        fndef_statement,
        if_statement,
        let_statement,
        loop_statement,
        return_statement,
        throw_statement,
        list_assignment_statement,
        expr_statement,
    ))(i)
}

/// Parser for a list of "statement" separated by ";"
///
/// Empty statements and a trailing ";" are allowed. A statement ending with a block may be
/// followed by the next one without a separator.
fn statements(i: &str) -> IResult<&str, StmtBlock> {
    let (mut i, _) = many0(ws(char(';')))(i)?;
    let mut list = Vec::new();
    loop {
        let (rest, stmt) = match statement(i) {
            Ok(res) => res,
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        };
        let needs_separator = !stmt.ends_with_block();
        list.push(stmt);
        let (rest, separators) = many0(ws(char(';')))(rest)?;
        i = rest;
        if separators.is_empty() && needs_separator {
            break;
        }
    }
    Ok((i, list))
}

/// Parser for "statements" enclosed within braces
fn statement_block(i: &str) -> IResult<&str, StmtBlock> {
    nested(i, 1, delimited(ws(char('{')), statements, ws(char('}'))))
}

/// Axiom rule: parses an entire program, which must consume all input
fn program_parser(i: &str) -> IResult<&str, StmtBlock> {
    all_consuming(terminated(statements, blank))(i)
}

/// Main parser function: takes source code and returns a Result containing either the AST or a
/// syntax Error locating where parsing stopped.
pub fn parse(source: &str) -> Result<StmtBlock, Error> {
    match program_parser(source) {
        Ok((_, stmts)) => Ok(stmts),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => Err(Error::Nesting(MAX_NESTING)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(Error::syntax(source, e.input)),
        Err(nom::Err::Incomplete(_)) => Err(Error::syntax(source, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(l: Expr<'static>, op: Opcode, r: Expr<'static>) -> Expr<'static> {
        Expr::BinOp(Box::new(l), op, Box::new(r))
    }

    #[test]
    fn real_test_valid() {
        assert_eq!(Ok(("", 123f64)),    real("123.0"));
        assert_eq!(Ok(("", 123.45f64)), real("123.45"));
        assert_eq!(Ok(("", 0.5f64)),    real(".5"));
        assert_eq!(Ok(("", 1500f64)),   real("1.5e3"));
        assert_eq!(Ok(("", 0.015f64)),  real("1.5E-2"));
    }

    #[test]
    fn real_test_invalid() {
        assert!(real("123").is_err());
        assert!(real("123.").is_err());
    }

    #[test]
    fn number_test_valid() {
        assert_eq!(Ok(("", Expr::Int(123))), number("123"));
        assert_eq!(Ok(("", Expr::Real(1.25))), number("1.25"));
        assert_eq!(Ok(("", Expr::Real(1e20))), number("100000000000000000000"));
    }

    #[test]
    fn ident_test_valid() {
        assert_eq!(Ok(("",   "abc123")), ident("abc123"));
        assert_eq!(Ok(("",   "a")),      ident("a"));
        assert_eq!(Ok(("",   "_a")),     ident("_a"));
        assert_eq!(Ok(("",   "iffy")),   ident("iffy"));
        assert_eq!(Ok((" a", "a")),      ident(" a a"));
    }

    #[test]
    fn ident_test_invalid() {
        assert!(ident("123abc").is_err());
        assert!(ident("if").is_err());
        assert!(ident("null").is_err());
        assert!(ident("True").is_err());
        assert!(ident("fALSE").is_err());
        assert_eq!(Ok(("", "Null")), ident("Null"));
        assert_eq!(Ok(("", "Trueish")), ident("Trueish"));
    }

    #[test]
    fn blank_skips_comments() {
        assert_eq!(Ok(("x", ())), blank("  // note\n\t x"));
        assert_eq!(Ok(("", ())), blank("// only a comment"));
    }

    #[test]
    fn bool_literal_valid() {
        assert_eq!(Ok(("", true)),  bool_literal("true"));
        assert_eq!(Ok(("", true)),  bool_literal("True"));
        assert_eq!(Ok(("", false)), bool_literal("FALSE"));
        assert!(bool_literal("trueish").is_err());
    }

    #[test]
    fn str_literal_valid() {
        assert_eq!(Ok(("", Cow::Borrowed(""))),        str_literal(r#""""#));
        assert_eq!(Ok(("", Cow::Borrowed("abc 123"))), str_literal(r#""abc 123""#));
        assert_eq!(Ok(("", Cow::Borrowed("it's"))),    str_literal(r#""it's""#));
        assert_eq!(Ok(("", Cow::Borrowed("say \"hi\""))), str_literal(r#"'say "hi"'"#));

        let (_, s) = str_literal(r#""a\"b\n\u{e9}""#).unwrap();
        assert_eq!("a\"b\n\u{e9}", s);
        assert!(matches!(s, Cow::Owned(_)));
    }

    #[test]
    fn str_literal_invalid() {
        assert!(str_literal(r#""unterminated"#).is_err());
        assert!(str_literal(r#""bad \q escape""#).is_err());
    }

    #[test]
    fn opcodes_valid() {
        assert_eq!(Ok(("", Opcode::LogicalOr)),          or_opcode("||"));
        assert_eq!(Ok(("", Opcode::LogicalXor)),         xor_opcode("^"));
        assert_eq!(Ok(("", Opcode::LogicalAnd)),         and_opcode(" &&"));
        assert_eq!(Ok(("", Opcode::NotEqual)),           equality_opcode("!="));
        assert_eq!(Ok(("", Opcode::LessThanOrEqual)),    relational_opcode("<="));
        assert_eq!(Ok(("", Opcode::GreaterThan)),        relational_opcode(">"));
        assert_eq!(Ok(("", Opcode::Sub)),                sum_opcode("-"));
        assert_eq!(Ok(("", Opcode::Mod)),                product_opcode("%"));
        assert_eq!(Ok(("", Opcode::Neg)),                unary_opcode("-"));
        assert!(product_opcode("+").is_err());
        assert!(sum_opcode("*").is_err());
    }

    #[test]
    fn precedence() {
        // 1 + 2 * 3 == 7 && true  =>  ((1 + (2 * 3)) == 7) && true
        assert_eq!(
            Ok(("", bin(
                bin(
                    bin(Expr::Int(1), Opcode::Add, bin(Expr::Int(2), Opcode::Mul, Expr::Int(3))),
                    Opcode::Equal,
                    Expr::Int(7),
                ),
                Opcode::LogicalAnd,
                Expr::Bool(true),
            ))),
            expr("1 + 2 * 3 == 7 && true")
        );

        // a || b && c  =>  a || (b && c)
        assert_eq!(
            Ok(("", bin(
                Expr::Id("a"),
                Opcode::LogicalOr,
                bin(Expr::Id("b"), Opcode::LogicalAnd, Expr::Id("c")),
            ))),
            expr("a || b && c")
        );
    }

    #[test]
    fn left_associativity() {
        assert_eq!(
            Ok(("", bin(bin(Expr::Int(1), Opcode::Sub, Expr::Int(2)), Opcode::Sub, Expr::Int(3)))),
            expr("1 - 2 - 3")
        );
        assert_eq!(
            Ok(("", bin(bin(Expr::Int(8), Opcode::Div, Expr::Int(2)), Opcode::Div, Expr::Int(2)))),
            expr("8/2/2")
        );
    }

    #[test]
    fn unary_valid() {
        assert_eq!(
            Ok(("", Expr::UnaryOp(Opcode::Not, Box::new(Expr::Id("a"))))),
            expr("!a")
        );
        assert_eq!(
            Ok(("", bin(
                Expr::UnaryOp(Opcode::Neg, Box::new(Expr::Int(1))),
                Opcode::Sub,
                Expr::UnaryOp(Opcode::Neg, Box::new(Expr::Int(2))),
            ))),
            expr("-1 - -2")
        );
    }

    #[test]
    fn postfix_valid() {
        assert_eq!(
            Ok(("", Expr::FuncCall(
                Box::new(Expr::Id("testFun")),
                vec![Expr::Int(1), Expr::Int(2), Expr::Int(3)],
            ))),
            expr("testFun(1, 2, 3,)")
        );
        assert_eq!(
            Ok(("", Expr::Index(Box::new(Expr::Id("a")), Box::new(Expr::Int(1))))),
            expr("a[1]")
        );
        assert_eq!(
            Ok(("", Expr::FuncCall(
                Box::new(Expr::Member(
                    Box::new(Expr::Index(
                        Box::new(Expr::FuncCall(Box::new(Expr::Id("parse")), vec![Expr::Id("stdin")])),
                        Box::new(Expr::Str(Cow::Borrowed("k"))),
                    )),
                    "trim",
                )),
                vec![],
            ))),
            expr(r#"parse(stdin)["k"].trim()"#)
        );
    }

    #[test]
    fn literals_valid() {
        assert_eq!(
            Ok(("", Expr::List(vec![
                Expr::Int(1),
                Expr::Str(Cow::Borrowed("two")),
                Expr::Bool(true),
                Expr::Real(4.56f64),
                Expr::None,
            ]))),
            expr(r#"[1, "two", true, 4.56, null]"#)
        );
        assert_eq!(
            Ok(("", Expr::Dict(vec![
                (Cow::Borrowed("a"),   Expr::Int(1)),
                (Cow::Borrowed("bcd"), Expr::Real(23.45f64)),
            ]))),
            expr(r#"{"a":1, bcd : 23.45}"#)
        );
        assert_eq!(Ok(("", Expr::List(vec![]))), expr("[ ]"));
        assert_eq!(Ok(("", Expr::Dict(vec![]))), expr("{}"));
    }

    #[test]
    fn fndef_statement_valid() {
        assert_eq!(
            Ok(("", Stmt::FnDef("abc", vec!["a", "b", "c"], vec![Stmt::Return(Expr::Id("a"))]))),
            fndef_statement("fn abc(a,b,c) { return a;}")
        );
    }

    #[test]
    fn if_statement_valid() {
        let print_call = |n| Stmt::Expr(Expr::FuncCall(Box::new(Expr::Id("print")), vec![Expr::Int(n)]));
        assert_eq!(
            Ok(("", Stmt::If(Expr::Bool(true), vec![print_call(1)]))),
            if_statement("if true { print(1); }")
        );
        assert_eq!(
            Ok(("", Stmt::IfElse(Expr::Bool(true), vec![print_call(1)], vec![print_call(0)]))),
            if_statement("if true { print(1) } else { print(0); }")
        );
        assert_eq!(
            Ok(("", Stmt::IfElse(
                Expr::Id("a"),
                vec![print_call(1)],
                vec![Stmt::IfElse(Expr::Id("b"), vec![print_call(2)], vec![print_call(3)])],
            ))),
            if_statement("if a { print(1) } else if b { print(2) } else { print(3) }")
        );
    }

    #[test]
    fn assignment_statements_valid() {
        assert_eq!(Ok(("", Stmt::Let("a", Expr::Int(123)))), let_statement("let a = 123"));
        assert_eq!(
            Ok(("", Stmt::ListItemAssignment("a", Expr::Str(Cow::Borrowed("idx")), Expr::Int(2)))),
            list_assignment_statement(r#"a["idx"] = 2"#)
        );
        assert!(list_assignment_statement("a[1] == 2").is_err());
    }

    #[test]
    fn flow_statements_valid() {
        assert_eq!(Ok(("", Stmt::Loop(vec![Stmt::Break]))), loop_statement("loop { break; }"));
        assert_eq!(Ok(("", Stmt::Return(Expr::Int(1)))), return_statement("return 1"));
        assert_eq!(Ok(("", Stmt::Return(Expr::None))), return_statement("return"));
        assert_eq!(
            Ok(("", Stmt::Throw(Expr::Str(Cow::Borrowed("x"))))),
            throw_statement("throw 'x'")
        );
        assert_eq!(Ok((";", Stmt::Break)), break_statement(" break;"));
    }

    #[test]
    fn program_valid() {
        assert_eq!(Vec::<Stmt>::new(), parse("").unwrap());
        assert_eq!(Vec::<Stmt>::new(), parse("  ;; // nothing\n").unwrap());
        assert_eq!(
            vec![Stmt::Expr(bin(Expr::Int(1), Opcode::Add, Expr::Int(1)))],
            parse("1+1").unwrap()
        );
        assert_eq!(
            vec![
                Stmt::FnDef("f", vec![], vec![Stmt::Return(Expr::Int(1))]),
                Stmt::Expr(Expr::FuncCall(Box::new(Expr::Id("f")), vec![])),
            ],
            parse("fn f() { return 1 } f();").unwrap()
        );
    }

    #[test]
    fn program_invalid() {
        assert!(matches!(parse("1 +"), Err(Error::Syntax { column: 3, .. })));
        assert!(matches!(parse("let = 4"), Err(Error::Syntax { .. })));
        assert!(matches!(parse("a b"), Err(Error::Syntax { column: 3, .. })));
        assert!(matches!(parse("(1"), Err(Error::Syntax { .. })));
        assert!(matches!(parse("'abc"), Err(Error::Syntax { .. })));
        assert!(matches!(parse("let True = 1"), Err(Error::Syntax { .. })));
    }

    /// Runs `f` on a thread with room for the deepest accepted nesting in debug builds
    fn with_large_stack<F: FnOnce() + Send + 'static>(f: F) {
        std::thread::Builder::new()
            .stack_size(256 << 20)
            .spawn(f)
            .unwrap()
            .join()
            .unwrap();
    }

    #[test]
    fn nesting_limit() {
        with_large_stack(|| {
            let parens = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));
            assert_eq!(vec![Stmt::Expr(Expr::Int(1))], parse(&parens(100)).unwrap());
            assert!(matches!(parse(&parens(20000)), Err(Error::Nesting(MAX_NESTING))));

            assert!(matches!(parse(&"[".repeat(20000)), Err(Error::Nesting(MAX_NESTING))));
            assert!(matches!(parse(&"{a:".repeat(20000)), Err(Error::Nesting(MAX_NESTING))));
            assert!(matches!(parse(&"f(".repeat(20000)), Err(Error::Nesting(MAX_NESTING))));

            let negations = |n: usize| format!("{}true", "!".repeat(n));
            assert!(parse(&negations(100)).is_ok());
            assert!(matches!(parse(&negations(100000)), Err(Error::Nesting(MAX_NESTING))));

            let chain = |n: usize| format!("1{}", "+1".repeat(n));
            assert!(parse(&chain(200)).is_ok());
            assert!(matches!(parse(&chain(100000)), Err(Error::Nesting(MAX_NESTING))));

            let loops = "loop {".repeat(20000);
            assert!(matches!(parse(&loops), Err(Error::Nesting(MAX_NESTING))));
            let ifs = format!("if a {{}}{}", " else if a {}".repeat(20000));
            assert!(matches!(parse(&ifs), Err(Error::Nesting(MAX_NESTING))));

            // The depth is released once a parse finishes
            assert_eq!(0, NESTING.with(Cell::get));
            assert!(parse(&parens(100)).is_ok());
        });
    }
}
