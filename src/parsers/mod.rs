pub mod directive;
pub mod shader_file;
pub mod uniform;

use nom::{
    bytes::complete::{tag, take_while, take_while_m_n},
    combinator::{not, recognize},
    error::{ErrorKind, ParseError},
    sequence::{pair, terminated},
    Err, IResult,
};
use std::fmt;

pub(crate) type Result<'a, T> = IResult<&'a str, T, ShaderParseError>;

/// Errors that can happen while reading a single line of shader text or of a combined `.shader` file.
/// Most errors carry the offending line so they can be reported without the surrounding file.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderParseError {
    NomError {
        kind: ErrorKind,
        other: Option<Box<ShaderParseError>>,
    },
    /// A conditional directive without a flag name, like a bare `#ifdef`.
    MalformedDirective(String),
    /// `#version` followed by something that is not a known GLSL version number.
    UnsupportedVersion(String),
    /// A `#version` profile other than `core`, `compatibility` or `es`, `es` on a desktop version, or
    /// text where a combined `.shader` file expects its first `@context`.
    UnsupportedProfile(String),
    /// A line starting with `uniform` that is neither an interface block nor `<type> <name>;` /
    /// `<type> <name>[<N>];`.
    MalformedUniformDeclaration(String),
    /// A vertex input line that is not `<type> <name>;`.
    MalformedAttributeDeclaration(String),
}

impl ParseError<&str> for ShaderParseError {
    fn from_error_kind(_input: &str, kind: ErrorKind) -> Self {
        ShaderParseError::NomError { kind, other: None }
    }

    fn append(_input: &str, kind: ErrorKind, other: Self) -> Self {
        ShaderParseError::NomError {
            kind,
            other: Some(Box::new(other)),
        }
    }
}

impl fmt::Display for ShaderParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ShaderParseError::NomError { kind, .. } => {
                write!(f, "parse error ({})", kind.description())
            }
            ShaderParseError::MalformedDirective(line) => {
                write!(f, "malformed conditional directive: `{}`", line)
            }
            ShaderParseError::UnsupportedVersion(line) => {
                write!(f, "unsupported shader version: `{}`", line)
            }
            ShaderParseError::UnsupportedProfile(line) => {
                write!(f, "unsupported shader profile: `{}`", line)
            }
            ShaderParseError::MalformedUniformDeclaration(line) => {
                write!(f, "malformed uniform declaration: `{}`", line)
            }
            ShaderParseError::MalformedAttributeDeclaration(line) => {
                write!(f, "malformed vertex attribute declaration: `{}`", line)
            }
        }
    }
}

impl std::error::Error for ShaderParseError {}

/// Shader stages a context can reference. The order is the order stages are written and parsed in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Vertex,
    Fragment,
    Geometry,
    TessControl,
    TessEval,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Vertex,
        Stage::Fragment,
        Stage::Geometry,
        Stage::TessControl,
        Stage::TessEval,
    ];

    /// The extension used in generated file names, `vert` in `mesh.vert.glsl`.
    pub fn extension(self) -> &'static str {
        match self {
            Stage::Vertex => "vert",
            Stage::Fragment => "frag",
            Stage::Geometry => "geom",
            Stage::TessControl => "tesc",
            Stage::TessEval => "tese",
        }
    }

    /// The key naming this stage in a context descriptor, `vertex_shader` for example.
    pub fn descriptor_key(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex_shader",
            Stage::Fragment => "fragment_shader",
            Stage::Geometry => "geometry_shader",
            Stage::TessControl => "tesscontrol_shader",
            Stage::TessEval => "tesseval_shader",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.extension())
    }
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// GLSL identifiers: a letter or underscore followed by letters, digits and underscores.
pub(crate) fn identifier(input: &str) -> Result<&str> {
    recognize(pair(
        take_while_m_n(1, 1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_identifier_char),
    ))(input)
}

/// Makes sure a keyword isn't the prefix of a longer word, `#iffy` is not `#if`.
pub(crate) fn keyword<'a>(word: &'static str) -> impl Fn(&'a str) -> Result<'a, &'a str> {
    terminated(tag(word), not(take_while_m_n(1, 1, is_identifier_char)))
}

/// Runs a line parser to completion, turning nom's wrapper into the plain error. `Incomplete` can't
/// happen with complete parsers but is mapped to `fallback` anyway.
pub(crate) fn run<'a, T, F>(
    parser: F,
    input: &'a str,
    fallback: ShaderParseError,
) -> std::result::Result<T, ShaderParseError>
where
    F: Fn(&'a str) -> Result<'a, T>,
{
    match parser(input) {
        Ok((_, value)) => Ok(value),
        Err(Err::Failure(e)) => Err(e),
        Err(Err::Error(ShaderParseError::NomError { .. })) | Err(Err::Incomplete(..)) => {
            Err(fallback)
        }
        Err(Err::Error(e)) => Err(e),
    }
}

/// The file name up to its first dot, which is how shader names are derived from paths:
/// `shaders/mesh.vert.glsl` is `mesh`.
pub fn base_name(path: &str) -> &str {
    let file = path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path);
    file.split('.').next().unwrap_or(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert_eq!(identifier("_Bar rest"), Ok((" rest", "_Bar")));
        assert_eq!(identifier("vec3;"), Ok((";", "vec3")));
        assert!(identifier("3d").is_err());
    }

    #[test]
    fn keywords_end_at_word_boundaries() {
        assert_eq!(keyword("uniform")("uniform vec3 eye;"), Ok((" vec3 eye;", "uniform")));
        assert_eq!(keyword("if")("if("), Ok(("(", "if")));
        assert!(keyword("if")("iffy").is_err());
        assert!(keyword("in")("inside").is_err());
    }

    #[test]
    fn base_names() {
        assert_eq!(base_name("mesh.vert.glsl"), "mesh");
        assert_eq!(base_name("shaders/deferred/mesh.frag.glsl"), "mesh");
        assert_eq!(base_name("C:\\shaders\\blender.shader.json"), "blender");
        assert_eq!(base_name("noext"), "noext");
    }
}
