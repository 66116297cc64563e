// Parser for block-diagram source files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators, one layer per precedence tier (see `ast::CompOp::precedence`).
//
// Preconditions: input is a token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any syntax errors (non-fatal). Failed
//                 statements are skipped to the next `;`; a failed definition
//                 keeps its name with an `Invalid` body.
// Failure modes: syntax errors produce `SyntaxError` diagnostics; parsing
//                continues with the next statement.
// Side effects: none.

use chumsky::error::{RichPattern, RichReason};
use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::diag::{DiagKind, Diagnostic};
use crate::lexer::{LexResult, Token};

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    /// Lexical errors first, then syntax errors in source order.
    pub errors: Vec<Diagnostic>,
}

/// Parse a source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    parse_tokens(source, crate::lexer::lex(source))
}

/// Parse an already-lexed source. `source` must be the text `lex_result`
/// was produced from; identifier names are sliced from it.
pub fn parse_tokens(source: &str, lex_result: LexResult) -> ParseResult {
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result
        .tokens
        .into_iter()
        .map(|lexeme| (lexeme.token, lexeme.span));
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut errors = lex_result.errors;
    errors.extend(parse_errors.iter().map(syntax_diagnostic));

    ParseResult { program, errors }
}

// ── Error conversion ──

fn syntax_diagnostic(err: &Rich<'_, Token, SimpleSpan>) -> Diagnostic {
    let span = *err.span();
    if let RichReason::Custom(message) = err.reason() {
        return Diagnostic::new(DiagKind::SyntaxError, span, message.clone());
    }

    let found = match err.found() {
        Some(token) => format!("'{token}'"),
        None => "end of input".to_string(),
    };
    let mut expected: Vec<String> = err.expected().map(describe_pattern).collect();
    expected.sort();
    expected.dedup();

    let message = if expected.is_empty() {
        format!("unexpected {found}")
    } else {
        format!("unexpected {found}, expected {}", expected.join(", "))
    };
    let mut diag = Diagnostic::new(DiagKind::SyntaxError, span, message);

    let wants_semi = err
        .expected()
        .any(|p| matches!(p, RichPattern::Token(t) if **t == Token::Semi));
    if wants_semi || err.found().is_none() {
        diag = diag.with_suggestion("terminate the statement with `;`");
    }
    diag
}

fn describe_pattern(pattern: &RichPattern<'_, Token>) -> String {
    match pattern {
        RichPattern::Token(token) => format!("'{}'", &**token),
        RichPattern::Label(label) => label.to_string(),
        RichPattern::EndOfInput => "end of input".to_string(),
        _ => "something else".to_string(),
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so that the `source`
// reference is captured once and shared by all combinators.

/// Operator joining two operands in a binary tier.
#[derive(Debug, Clone, Copy)]
enum Binary {
    Comp(CompOp),
    Prim(PrimOp),
}

/// Left-fold `first (op operand)*` into a left-associative tree.
fn fold_chain(first: Expr, rest: Vec<(Binary, Expr)>) -> Expr {
    rest.into_iter().fold(first, |left, (op, right)| {
        let span = join(left.span, right.span);
        let (left, right) = (Box::new(left), Box::new(right));
        let kind = match op {
            Binary::Comp(op) => ExprKind::Compose { op, left, right },
            Binary::Prim(op) => ExprKind::Infix { op, left, right },
        };
        Expr::new(kind, span)
    })
}

enum Item {
    Import(Import),
    Declare(Declaration),
    Define(Definition),
    Skipped(Span),
}

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    let string = select! { Token::Str(s) => s };

    let params = ident
        .clone()
        .separated_by(just(Token::Par))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // `name =` or `name(params) =`: recovery never skips past one.
    let definition_start = ident
        .clone()
        .then(params.clone().or_not())
        .then(just(Token::Equals))
        .ignored();

    // ── Expression ──

    let expression = recursive(|expression| {
        let mut arg_expr = Recursive::declare();

        let args = arg_expr
            .clone()
            .separated_by(just(Token::Par))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        // `-` directly followed by a number is a negative literal, not the
        // subtraction box.
        let negative = just(Token::Sub)
            .ignore_then(select! { Token::Number(n) => n })
            .map_with(|n, e| Expr::new(ExprKind::Number(-n), e.span()));

        let literal = select! {
            Token::Number(n) = e => Expr::new(ExprKind::Number(n), e.span()),
            Token::Str(s) = e => Expr::new(ExprKind::Str(s), e.span()),
        };

        let prim_op = select! {
            Token::Add => PrimOp::Add,
            Token::Sub => PrimOp::Sub,
            Token::Mul => PrimOp::Mul,
            Token::Div => PrimOp::Div,
            Token::Mod => PrimOp::Mod,
            Token::At => PrimOp::Delay,
            Token::Cut => PrimOp::Cut,
        };

        let op_box = prim_op
            .map_with(|op, e| (op, e.span()))
            .then(args.clone().or_not())
            .map_with(|((op, op_span), args), e| match args {
                Some(args) => Expr::new(
                    ExprKind::Call {
                        callee: Ident {
                            name: op.symbol().to_string(),
                            span: op_span,
                        },
                        args,
                    },
                    e.span(),
                ),
                None => Expr::new(ExprKind::Prim(op), op_span),
            });

        let named = ident
            .clone()
            .then(args.or_not())
            .map_with(|(callee, args), e| match args {
                Some(args) => Expr::new(ExprKind::Call { callee, args }, e.span()),
                None => Expr::new(ExprKind::Ident(callee.name), callee.span),
            });

        let paren = expression
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let primary = choice((negative, literal, op_box, named, paren)).boxed();

        // ── Postfix: e' ──

        let postfix = primary
            .then(
                just(Token::Prime)
                    .map_with(|_, e| e.span())
                    .repeated()
                    .collect::<Vec<SimpleSpan>>(),
            )
            .map(|(inner, primes)| {
                primes.into_iter().fold(inner, |inner, prime| {
                    let span = join(inner.span, prime);
                    Expr::new(ExprKind::Prime(Box::new(inner)), span)
                })
            })
            .boxed();

        // ── Arithmetic tiers ──

        let delay = postfix
            .clone()
            .then(
                just(Token::At)
                    .to(Binary::Prim(PrimOp::Delay))
                    .then(postfix)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_chain(first, rest))
            .boxed();

        let multiplicative = delay
            .clone()
            .then(
                select! {
                    Token::Mul => Binary::Prim(PrimOp::Mul),
                    Token::Div => Binary::Prim(PrimOp::Div),
                    Token::Mod => Binary::Prim(PrimOp::Mod),
                }
                .then(delay)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_chain(first, rest))
            .boxed();

        let additive = multiplicative
            .clone()
            .then(
                select! {
                    Token::Add => Binary::Prim(PrimOp::Add),
                    Token::Sub => Binary::Prim(PrimOp::Sub),
                }
                .then(multiplicative)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_chain(first, rest))
            .boxed();

        // ── Composition tiers ──

        let recursion = additive
            .clone()
            .then(
                just(Token::Rec)
                    .to(Binary::Comp(CompOp::Rec))
                    .then(additive)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_chain(first, rest))
            .boxed();

        let parallel = recursion
            .clone()
            .then(
                just(Token::Par)
                    .to(Binary::Comp(CompOp::Par))
                    .then(recursion.clone())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_chain(first, rest))
            .boxed();

        let seq_op = just(Token::Seq).to(Binary::Comp(CompOp::Seq));
        let split_merge_op = select! {
            Token::Split => Binary::Comp(CompOp::Split),
            Token::Merge => Binary::Comp(CompOp::Merge),
        };

        let sequential = parallel
            .clone()
            .then(
                seq_op
                    .clone()
                    .then(parallel)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_chain(first, rest))
            .boxed();

        let split_merge = sequential
            .clone()
            .then(
                split_merge_op
                    .clone()
                    .then(sequential)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_chain(first, rest));

        // Call arguments: the same tiers minus `,`, which separates them.
        let arg_sequential = recursion
            .clone()
            .then(
                seq_op
                    .then(recursion)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_chain(first, rest))
            .boxed();

        arg_expr.define(
            arg_sequential
                .clone()
                .then(
                    split_merge_op
                        .then(arg_sequential)
                        .repeated()
                        .collect::<Vec<_>>(),
                )
                .map(|(first, rest)| fold_chain(first, rest)),
        );

        // ── with { definition* } ──

        let local_definition = ident
            .clone()
            .then(params.clone().or_not())
            .then_ignore(just(Token::Equals))
            .then(expression.clone())
            .then_ignore(just(Token::Semi))
            .map_with(|((name, params), body), e| {
                Some(Definition {
                    name,
                    params: params.unwrap_or_default(),
                    body,
                    span: e.span(),
                })
            });

        // Inside a block, recovery also stops before the closing brace.
        let local_recovery = ident
            .clone()
            .then_ignore(
                definition_start
                    .clone()
                    .not()
                    .ignore_then(none_of([Token::Semi, Token::RBrace]))
                    .repeated(),
            )
            .then_ignore(just(Token::Semi).or_not())
            .map_with(|name, e| Some(invalid_definition(name, e.span())))
            .or(none_of([Token::Semi, Token::RBrace])
                .repeated()
                .at_least(1)
                .then(just(Token::Semi).or_not())
                .ignored()
                .or(just(Token::Semi).ignored())
                .to(None));

        let with_block = just(Token::With).ignore_then(
            local_definition
                .recover_with(via_parser(local_recovery))
                .repeated()
                .collect::<Vec<Option<Definition>>>()
                .map(|defs| defs.into_iter().flatten().collect::<Vec<_>>())
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        );

        split_merge
            .then(with_block.or_not())
            .map_with(|(body, defs), e| match defs {
                Some(defs) => Expr::new(
                    ExprKind::With {
                        body: Box::new(body),
                        defs,
                    },
                    e.span(),
                ),
                None => body,
            })
    });

    // ── Statements ──

    let import = just(Token::Import)
        .ignore_then(
            string
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then_ignore(just(Token::Semi))
        .map_with(|path, e| Item::Import(Import {
            path,
            span: e.span(),
        }));

    let declare = just(Token::Declare)
        .ignore_then(ident.clone())
        .then(ident.clone().or_not())
        .then(string)
        .then_ignore(just(Token::Semi))
        .map_with(|((first, second), value), e| {
            let (target, key) = match second {
                Some(key) => (Some(first), key),
                None => (None, first),
            };
            Item::Declare(Declaration {
                target,
                key,
                value,
                span: e.span(),
            })
        });

    let definition = ident
        .clone()
        .then(params.or_not())
        .then_ignore(just(Token::Equals))
        .then(expression)
        .then_ignore(just(Token::Semi))
        .map_with(|((name, params), body), e| {
            Item::Define(Definition {
                name,
                params: params.unwrap_or_default(),
                body,
                span: e.span(),
            })
        });

    // A statement that fails to parse is skipped through the next `;`, or up
    // to the next definition when its `;` is missing. If it starts with a
    // name, the name is kept so later uses still resolve.
    let recovery = ident
        .then_ignore(
            definition_start
                .not()
                .ignore_then(none_of([Token::Semi]))
                .repeated(),
        )
        .then_ignore(just(Token::Semi).or_not())
        .map_with(|name, e| Item::Define(invalid_definition(name, e.span())))
        .or(none_of([Token::Semi])
            .repeated()
            .at_least(1)
            .then(just(Token::Semi).or_not())
            .ignored()
            .or(just(Token::Semi).ignored())
            .map_with(|_, e| Item::Skipped(e.span())));

    let item = choice((import, declare, definition)).recover_with(via_parser(recovery));

    // ── Program ──

    item.repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map_with(|items, e| {
            let mut program = Program {
                imports: Vec::new(),
                declarations: Vec::new(),
                definitions: Vec::new(),
                skipped: Vec::new(),
                span: e.span(),
            };
            for item in items {
                match item {
                    Item::Import(import) => program.imports.push(import),
                    Item::Declare(decl) => program.declarations.push(decl),
                    Item::Define(def) => program.definitions.push(def),
                    Item::Skipped(span) => program.skipped.push(span),
                }
            }
            program
        })
}

fn invalid_definition(name: Ident, span: Span) -> Definition {
    Definition {
        name,
        params: Vec::new(),
        body: Expr::new(ExprKind::Invalid, span),
        span,
    }
}

// ── Tests ──
