use winnow::ascii::digit1;
use winnow::combinator::{alt, cut_err, delimited, opt, preceded, repeat, separated};
use winnow::error::{ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use crate::types::{AttrPath, PathSegment, TemplatePart};

// -- Identifiers ------------------------------------------------------------

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

// -- Attribute paths --------------------------------------------------------

fn index(input: &mut &str) -> ModalResult<usize> {
    delimited(
        '[',
        cut_err(digit1.try_map(|s: &str| s.parse::<usize>())),
        cut_err(']'),
    )
    .context(StrContext::Expected(StrContextValue::Description("index")))
    .parse_next(input)
}

fn segment(input: &mut &str) -> ModalResult<Vec<PathSegment>> {
    alt((
        (ident, repeat(0.., index)).map(|(key, indices): (&str, Vec<usize>)| {
            let mut out = vec![PathSegment::Key(key.to_owned())];
            out.extend(indices.into_iter().map(PathSegment::Index));
            out
        }),
        repeat(1.., index)
            .map(|indices: Vec<usize>| indices.into_iter().map(PathSegment::Index).collect()),
    ))
    .parse_next(input)
}

pub(crate) fn attr_path(input: &mut &str) -> ModalResult<AttrPath> {
    let groups: Vec<Vec<PathSegment>> = separated(1.., segment, '.')
        .context(StrContext::Expected(StrContextValue::Description(
            "attribute path",
        )))
        .parse_next(input)?;
    Ok(AttrPath {
        segments: groups.into_iter().flatten().collect(),
    })
}

// -- Templates --------------------------------------------------------------

#[derive(Clone)]
enum Piece<'i> {
    Text(&'i str),
    Brace(char),
    Placeholder(TemplatePart),
}

fn placeholder(input: &mut &str) -> ModalResult<TemplatePart> {
    '{'.parse_next(input)?;
    let name = cut_err(ident)
        .context(StrContext::Expected(StrContextValue::Description(
            "variable name",
        )))
        .parse_next(input)?;
    let path = opt(preceded('#', cut_err(attr_path))).parse_next(input)?;
    cut_err('}')
        .context(StrContext::Expected(StrContextValue::CharLiteral('}')))
        .parse_next(input)?;
    Ok(TemplatePart::Dynamic {
        name: name.to_owned(),
        path,
    })
}

fn piece<'i>(input: &mut &'i str) -> ModalResult<Piece<'i>> {
    alt((
        "{{".value(Piece::Brace('{')),
        "}}".value(Piece::Brace('}')),
        placeholder.map(Piece::Placeholder),
        take_while(1.., |c: char| c != '{' && c != '}').map(Piece::Text),
    ))
    .parse_next(input)
}

pub(crate) fn template(input: &mut &str) -> ModalResult<Vec<TemplatePart>> {
    let pieces: Vec<Piece<'_>> = repeat(0.., piece).parse_next(input)?;

    let mut parts = Vec::new();
    let mut text = String::new();
    for piece in pieces {
        match piece {
            Piece::Text(s) => text.push_str(s),
            Piece::Brace(c) => text.push(c),
            Piece::Placeholder(part) => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut text)));
                }
                parts.push(part);
            }
        }
    }
    if !text.is_empty() {
        parts.push(TemplatePart::Literal(text));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use crate::parse::{parse_attr_path, parse_template};

    use super::*;

    fn dynamic(name: &str) -> TemplatePart {
        TemplatePart::Dynamic {
            name: name.to_owned(),
            path: None,
        }
    }

    #[test]
    fn parse_static_text() {
        let parts = parse_template("https://example.com").unwrap();
        assert_eq!(
            parts,
            vec![TemplatePart::Literal("https://example.com".to_owned())]
        );
    }

    #[test]
    fn parse_empty_template() {
        assert!(parse_template("").unwrap().is_empty());
    }

    #[test]
    fn parse_placeholder_between_text() {
        let parts = parse_template("https://{Region}.example.com").unwrap();
        assert_eq!(
            parts,
            vec![
                TemplatePart::Literal("https://".to_owned()),
                dynamic("Region"),
                TemplatePart::Literal(".example.com".to_owned()),
            ]
        );
    }

    #[test]
    fn parse_placeholder_with_path() {
        let parts = parse_template("{url#scheme}://{url#authority}").unwrap();
        assert_eq!(parts.len(), 3);
        match &parts[0] {
            TemplatePart::Dynamic {
                name,
                path: Some(path),
            } => {
                assert_eq!(name, "url");
                assert_eq!(path.segments, vec![PathSegment::Key("scheme".to_owned())]);
            }
            other => panic!("expected placeholder with path, got {other:?}"),
        }
    }

    #[test]
    fn escaped_braces_become_literal_text() {
        let parts = parse_template("{{literal}} and {x}").unwrap();
        assert_eq!(
            parts,
            vec![
                TemplatePart::Literal("{literal} and ".to_owned()),
                dynamic("x"),
            ]
        );
    }

    #[test]
    fn unterminated_placeholder_is_error() {
        assert!(parse_template("https://{Region").is_err());
    }

    #[test]
    fn empty_placeholder_is_error() {
        assert!(parse_template("https://{}.com").is_err());
    }

    #[test]
    fn stray_closing_brace_is_error() {
        assert!(parse_template("https://a}b").is_err());
    }

    #[test]
    fn attr_path_keys_and_indices() {
        let path = parse_attr_path("parts[0].name").unwrap();
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Key("parts".to_owned()),
                PathSegment::Index(0),
                PathSegment::Key("name".to_owned()),
            ]
        );
    }

    #[test]
    fn attr_path_leading_index() {
        let path = parse_attr_path("[2]").unwrap();
        assert_eq!(path.segments, vec![PathSegment::Index(2)]);
    }

    #[test]
    fn attr_path_rejects_garbage() {
        assert!(parse_attr_path("").is_err());
        assert!(parse_attr_path("a..b").is_err());
        assert!(parse_attr_path("a[x]").is_err());
    }

    #[test]
    fn attr_path_display_round_trips() {
        let path = parse_attr_path("parts[0].name").unwrap();
        assert_eq!(path.to_string(), "parts[0].name");
    }
}
