use crate::parsers::{identifier, is_identifier_char, keyword, run, Result, ShaderParseError};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{space0, space1},
    combinator::opt,
    multi::many0,
    sequence::{delimited, preceded, terminated, tuple},
};
use std::result::Result as StdResult;

#[derive(Debug, Clone, PartialEq)]
pub struct UniformDeclaration<'a> {
    pub type_name: &'a str,
    pub name: &'a str,
    /// The text between the brackets of `name[N]`, usually a number but it can be a macro.
    pub array_len: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformLine<'a> {
    Declaration(UniformDeclaration<'a>),
    /// `uniform Lights {` opens an interface block. Its members are not uniforms of their own.
    Block(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDeclaration<'a> {
    pub type_name: &'a str,
    pub name: &'a str,
    /// Number of components, 3 for a `vec3`.
    pub size: usize,
}

/// `layout(location = 0)`, `layout(rgba8)`, contents are not interpreted.
fn layout(input: &str) -> Result<&str> {
    let (input, _) = keyword("layout")(input)?;
    let (input, _) = space0(input)?;
    delimited(tag("("), take_until(")"), tag(")"))(input)
}

fn qualifier(input: &str) -> Result<&str> {
    alt((
        keyword("lowp"),
        keyword("mediump"),
        keyword("highp"),
        keyword("readonly"),
        keyword("writeonly"),
        keyword("coherent"),
        keyword("volatile"),
        keyword("restrict"),
    ))(input)
}

/// `//!uniform` marks a uniform that lives in an included header but must still be reflected. The
/// layout qualifier may come first, `layout(binding = 0) uniform sampler2D tex;`.
fn uniform_keyword(input: &str) -> Result<&str> {
    preceded(
        opt(terminated(layout, space0)),
        alt((keyword("uniform"), keyword("//!uniform"))),
    )(input)
}

fn array_len(input: &str) -> Result<&str> {
    delimited(
        tuple((tag("["), space0)),
        take_while1(is_identifier_char),
        tuple((space0, tag("]"))),
    )(input)
}

fn line_end(input: &str) -> Result<()> {
    let (input, _) = space0(input)?;
    if input.is_empty() || input.starts_with("//") {
        Ok(("", ()))
    } else {
        let (input, _) = tag("//")(input)?;
        Ok((input, ()))
    }
}

fn uniform_line(input: &str) -> Result<UniformLine> {
    let (input, _) = uniform_keyword(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = opt(terminated(layout, space0))(input)?;
    let (input, _) = many0(terminated(qualifier, space1))(input)?;
    let (input, type_name) = identifier(input)?;
    let (input, _) = space0(input)?;

    if input.is_empty() || input.starts_with('{') {
        return Ok(("", UniformLine::Block(type_name)));
    }

    let (input, name) = identifier(input)?;
    let (input, _) = space0(input)?;
    let (input, array_len) = opt(array_len)(input)?;
    // Initializers are legal on uniforms and carry no reflection data
    let (input, _) = opt(preceded(tuple((space0, tag("="))), take_until(";")))(input)?;
    let (input, _) = preceded(space0, tag(";"))(input)?;
    let (input, _) = line_end(input)?;

    Ok((
        input,
        UniformLine::Declaration(UniformDeclaration {
            type_name,
            name,
            array_len,
        }),
    ))
}

fn attribute_keyword(input: &str) -> Result<&str> {
    preceded(
        opt(terminated(layout, space0)),
        alt((keyword("in"), keyword("attribute"))),
    )(input)
}

fn attribute_line(input: &str) -> Result<(&str, &str)> {
    let (input, _) = attribute_keyword(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = many0(terminated(qualifier, space1))(input)?;
    let (input, type_name) = identifier(input)?;
    let (input, _) = space1(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = preceded(space0, tag(";"))(input)?;
    let (input, _) = line_end(input)?;
    Ok((input, (type_name, name)))
}

/// Scalars have one component, vectors and matrices are sized by the digit their type ends with.
fn component_count(type_name: &str) -> Option<usize> {
    match type_name {
        "float" | "int" | "uint" | "bool" | "double" => Some(1),
        _ => type_name
            .chars()
            .last()
            .and_then(|c| c.to_digit(10))
            .map(|d| d as usize),
    }
}

/// Parses a `uniform` line. Returns `Ok(None)` if the line doesn't declare a uniform at all.
pub fn uniform(line: &str) -> StdResult<Option<UniformLine>, ShaderParseError> {
    let trimmed = line.trim();
    if uniform_keyword(trimmed).is_err() {
        return Ok(None);
    }

    run(
        uniform_line,
        trimmed,
        ShaderParseError::MalformedUniformDeclaration(trimmed.to_string()),
    )
    .map(Some)
}

/// Parses a vertex input line, `in vec3 pos;` or the older `attribute vec3 pos;`. Returns `Ok(None)` if
/// the line is not a vertex input.
pub fn attribute(line: &str) -> StdResult<Option<AttributeDeclaration>, ShaderParseError> {
    let trimmed = line.trim();
    if attribute_keyword(trimmed).is_err() {
        return Ok(None);
    }

    let malformed = || ShaderParseError::MalformedAttributeDeclaration(trimmed.to_string());
    let (type_name, name) = run(attribute_line, trimmed, malformed())?;
    let size = component_count(type_name).ok_or_else(malformed)?;

    Ok(Some(AttributeDeclaration {
        type_name,
        name,
        size,
    }))
}
