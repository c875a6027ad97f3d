//! The old combined `.shader` format, where every context and all of its stages live in one file:
//!
//! ```text
//! @context mesh
//! -set depth_write = true
//! -set compare_mode = less
//! -link WVP = _worldViewProjectionMatrix
//! -vert mesh.vert.glsl
//! #version 450
//! in vec3 pos;
//! ...
//! -frag mesh.frag.glsl
//! ...
//! @context shadowmap
//! ...
//! ```
//!
//! A stage section runs until the next `-vert`, `-frag` or `@context` line. `-set` and `-link` lines
//! belong to the context no matter where they appear inside it.

use crate::parsers::{identifier, Result, ShaderParseError, Stage};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{space0, space1},
    combinator::{map, rest},
    sequence::{preceded, tuple},
};
use std::result::Result as StdResult;

#[derive(Debug, Clone, PartialEq)]
pub struct StageSection<'a> {
    pub stage: Stage,
    /// The file name written after `-vert`/`-frag`, `mesh.vert.glsl`.
    pub file: &'a str,
    pub lines: Vec<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderFileContext<'a> {
    pub id: &'a str,
    /// `-set key = value` pairs, in file order.
    pub params: Vec<(&'a str, &'a str)>,
    /// `-link id = link` pairs, in file order.
    pub links: Vec<(&'a str, &'a str)>,
    pub stages: Vec<StageSection<'a>>,
}

impl<'a> ShaderFileContext<'a> {
    pub fn stage(&self, stage: Stage) -> Option<&StageSection<'a>> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

fn context_line(input: &str) -> Result<&str> {
    preceded(tuple((tag("@context"), space1)), identifier)(input)
}

fn stage_line(input: &str) -> Result<(Stage, &str)> {
    let (input, stage) = alt((
        map(tag("-vert"), |_| Stage::Vertex),
        map(tag("-frag"), |_| Stage::Fragment),
    ))(input)?;
    let (input, _) = space1(input)?;
    let (input, file) = rest(input)?;
    Ok((input, (stage, file.trim())))
}

/// `-set key = value` and `-link key = value` share their shape.
fn assignment<'a>(keyword: &'static str, input: &'a str) -> Result<'a, (&'a str, &'a str)> {
    let (input, _) = tag(keyword)(input)?;
    let (input, _) = space1(input)?;
    let (input, key) = take_until("=")(input)?;
    let (input, _) = tag("=")(input)?;
    let (input, _) = space0(input)?;
    let (input, value) = rest(input)?;
    Ok((input, (key.trim(), value.trim())))
}

fn starts_with_keyword(line: &str, keyword: &str) -> bool {
    line.starts_with(keyword)
        && line[keyword.len()..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace)
}

/// Splits a combined `.shader` file into its contexts.
pub fn shader_file(text: &str) -> StdResult<Vec<ShaderFileContext>, ShaderParseError> {
    let mut contexts: Vec<ShaderFileContext> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        if starts_with_keyword(trimmed, "@context") {
            let id = match context_line(trimmed) {
                Ok((_, id)) => id,
                Err(_) => return Err(ShaderParseError::MalformedDirective(trimmed.to_string())),
            };
            contexts.push(ShaderFileContext {
                id,
                ..Default::default()
            });
            continue;
        }

        let context = match contexts.last_mut() {
            Some(context) => context,
            None if trimmed.is_empty() || trimmed.starts_with("//") => continue,
            None => return Err(ShaderParseError::UnsupportedProfile(trimmed.to_string())),
        };

        if starts_with_keyword(trimmed, "-vert") || starts_with_keyword(trimmed, "-frag") {
            let (stage, file) = match stage_line(trimmed) {
                Ok((_, v)) => v,
                Err(_) => return Err(ShaderParseError::MalformedDirective(trimmed.to_string())),
            };
            context.stages.push(StageSection {
                stage,
                file,
                lines: Vec::new(),
            });
        } else if starts_with_keyword(trimmed, "-set") {
            match assignment("-set", trimmed) {
                Ok((_, pair)) => context.params.push(pair),
                Err(_) => return Err(ShaderParseError::MalformedDirective(trimmed.to_string())),
            }
        } else if starts_with_keyword(trimmed, "-link") {
            match assignment("-link", trimmed) {
                Ok((_, pair)) => context.links.push(pair),
                Err(_) => return Err(ShaderParseError::MalformedDirective(trimmed.to_string())),
            }
        } else if let Some(section) = context.stages.last_mut() {
            section.lines.push(line);
        }
    }

    Ok(contexts)
}
