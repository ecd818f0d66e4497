// slot_type.rs — Parser for slot-type strings
//
// Grammar (tokens from `lexer::lex()`):
//
//   type     := IDENT suffix? arity?
//   suffix   := '<' IDENT (':' IDENT)? '>'     world<domain[:semantics]>
//             | ':' IDENT                      legacy world:domain
//   arity    := '[' NUMBER ']'
//
// A bare IDENT is shorthand for a structural type: `Domain`, `RenderTree`,
// `RenderNode`, `Render`, `Program`.
//
// Preconditions: none.
// Postconditions: on success the returned `TypeDesc` displays in canonical form.
// Failure modes: lex, syntax or name errors yield `PatchError::SlotType`.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::error::{PatchError, PatchResult};
use crate::lexer::Token;
use crate::types::{Domain, TypeDesc, World};

// ── Raw syntax ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Suffix {
    Generic {
        domain: String,
        semantics: Option<String>,
    },
    Legacy(String),
}

#[derive(Debug, Clone, PartialEq)]
struct RawType {
    head: String,
    suffix: Option<Suffix>,
    arity: Option<u32>,
}

fn type_parser<'tokens, I>(
) -> impl Parser<'tokens, I, RawType, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = select! { Token::Ident(name) => name };

    let generic = ident
        .clone()
        .then(just(Token::Colon).ignore_then(ident.clone()).or_not())
        .delimited_by(just(Token::Lt), just(Token::Gt))
        .map(|(domain, semantics)| Suffix::Generic { domain, semantics });

    let legacy = just(Token::Colon)
        .ignore_then(ident.clone())
        .map(Suffix::Legacy);

    let arity = select! { Token::Number(n) => n }
        .delimited_by(just(Token::LBracket), just(Token::RBracket));

    ident
        .then(generic.or(legacy).or_not())
        .then(arity.or_not())
        .then_ignore(end())
        .map(|((head, suffix), arity)| RawType {
            head,
            suffix,
            arity,
        })
}

// ── Public API ──────────────────────────────────────────────────────────────

/// Parse a slot-type string such as `Field<vec2:position>` into a `TypeDesc`.
pub fn parse_slot_type(source: &str) -> PatchResult<TypeDesc> {
    let lex_result = crate::lexer::lex(source);
    if let Some(err) = lex_result.errors.first() {
        return Err(PatchError::slot_type(source, err.message.clone()));
    }

    let len = source.len();
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (raw, errors) = type_parser().parse(stream).into_output_errors();
    if let Some(err) = errors.first() {
        return Err(PatchError::slot_type(source, err.to_string()));
    }
    let raw = raw.ok_or_else(|| PatchError::slot_type(source, "empty type"))?;
    resolve(source, raw)
}

fn resolve(source: &str, raw: RawType) -> PatchResult<TypeDesc> {
    let mut desc = match raw.suffix {
        Some(Suffix::Generic { domain, semantics }) => {
            let mut desc = TypeDesc::new(world(source, &raw.head)?, domain_named(source, &domain)?);
            desc.semantics = semantics;
            desc
        }
        Some(Suffix::Legacy(domain)) => {
            TypeDesc::new(world(source, &raw.head)?, domain_named(source, &domain)?)
        }
        None => bare(source, &raw.head)?,
    };

    if let Some(n) = raw.arity {
        desc.bundle_arity = match u8::try_from(n) {
            Ok(0) | Err(_) => {
                return Err(PatchError::slot_type(
                    source,
                    format!("bundle arity must be between 1 and 255, got {n}"),
                ))
            }
            Ok(n) => n,
        };
    }
    Ok(desc)
}

fn world(source: &str, name: &str) -> PatchResult<World> {
    World::from_type_name(name)
        .ok_or_else(|| PatchError::slot_type(source, format!("unknown world '{name}'")))
}

fn domain_named(source: &str, name: &str) -> PatchResult<Domain> {
    Domain::from_name(name)
        .ok_or_else(|| PatchError::slot_type(source, format!("unknown domain '{name}'")))
}

fn bare(source: &str, name: &str) -> PatchResult<TypeDesc> {
    let (world, domain) = match name {
        "Domain" => (World::Special, Domain::Domain),
        "RenderTree" => (World::Render, Domain::RenderTree),
        "RenderNode" => (World::Render, Domain::RenderNode),
        "Render" => (World::Render, Domain::Render),
        "Program" => (World::Program, Domain::Program),
        _ => {
            return Err(PatchError::slot_type(
                source,
                format!("'{name}' needs a domain, e.g. {name}<float>"),
            ))
        }
    };
    Ok(TypeDesc::new(world, domain))
}
