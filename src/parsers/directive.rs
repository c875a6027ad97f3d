use crate::parsers::{identifier, keyword, Result, ShaderParseError};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, digit1, space0, space1},
    combinator::{map, map_res, opt, rest},
    sequence::{preceded, terminated, tuple},
};
use std::result::Result as StdResult;

/// GLSL versions `#version` may name. 100, 300, 310 and 320 are the ES ones.
const KNOWN_VERSIONS: [u32; 17] = [
    100, 110, 120, 130, 140, 150, 300, 310, 320, 330, 400, 410, 420, 430, 440, 450, 460,
];
const ES_VERSIONS: [u32; 3] = [300, 310, 320];

/// Directives come in two spellings: the C preprocessor one (`#ifdef`) and the one used by old combined
/// `.shader` files (`-ifdef`), which never reaches a GLSL compiler.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Spelling {
    Hash,
    Dash,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Profile {
    Core,
    Compatibility,
    Es,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Version {
    pub number: u32,
    pub profile: Option<Profile>,
}

/// The preprocessor lines the generator cares about. Everything else, `#define` and `#extension`
/// included, is ordinary text.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive<'a> {
    /// `#ifdef FLAG` or, with `negated`, `#ifndef FLAG`.
    IfDef {
        flag: &'a str,
        negated: bool,
        spelling: Spelling,
    },
    /// `#if <expression>`. Expressions are never evaluated.
    If,
    Elif,
    Else(Spelling),
    EndIf(Spelling),
    Version(Version),
}

impl<'a> Directive<'a> {
    pub fn spelling(&self) -> Spelling {
        match self {
            Directive::IfDef { spelling, .. } | Directive::Else(spelling) | Directive::EndIf(spelling) => {
                *spelling
            }
            Directive::If | Directive::Elif | Directive::Version(_) => Spelling::Hash,
        }
    }
}

fn spelling(input: &str) -> Result<Spelling> {
    alt((
        map(tag("#"), |_| Spelling::Hash),
        map(tag("-"), |_| Spelling::Dash),
    ))(input)
}

/// `#ifdef` / `#ifndef` and their dash spellings, returning what follows the keyword.
fn conditional(input: &str) -> Result<(Spelling, bool, &str)> {
    let (input, spelling) = spelling(input)?;
    let (input, negated) = alt((
        map(keyword("ifndef"), |_| true),
        map(keyword("ifdef"), |_| false),
    ))(input)?;
    let (input, flag) = rest(input)?;
    Ok((input, (spelling, negated, flag)))
}

fn branch(input: &str) -> Result<Directive> {
    alt((
        map(preceded(tag("#"), keyword("if")), |_| Directive::If),
        map(preceded(tag("#"), keyword("elif")), |_| Directive::Elif),
        map(terminated(spelling, keyword("else")), Directive::Else),
        map(terminated(spelling, keyword("endif")), Directive::EndIf),
    ))(input)
}

fn profile(input: &str) -> Result<&str> {
    preceded(space1, alpha1)(input)
}

fn version_number(input: &str) -> Result<u32> {
    map_res(digit1, |digits: &str| digits.parse::<u32>())(input)
}

/// `#version 450`, `#version 330 core`, `#version 300 es`.
fn version_line(input: &str) -> Result<Option<(u32, Option<&str>)>> {
    let (input, _) = keyword("#version")(input)?;
    let (input, version) = opt(tuple((preceded(space1, version_number), opt(profile))))(input)?;
    let (input, _) = space0(input)?;
    Ok((input, version))
}

fn version(line: &str) -> StdResult<Option<Version>, ShaderParseError> {
    let (remaining, parsed) = match version_line(line) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let (number, profile) = match parsed {
        Some(v) if KNOWN_VERSIONS.contains(&v.0) => v,
        _ => return Err(ShaderParseError::UnsupportedVersion(line.to_string())),
    };

    if !remaining.is_empty() && !remaining.starts_with("//") {
        return Err(ShaderParseError::UnsupportedProfile(line.to_string()));
    }

    let profile = match profile {
        None => None,
        Some("core") => Some(Profile::Core),
        Some("compatibility") => Some(Profile::Compatibility),
        Some("es") => Some(Profile::Es),
        Some(_) => return Err(ShaderParseError::UnsupportedProfile(line.to_string())),
    };

    let is_es = ES_VERSIONS.contains(&number);
    match profile {
        Some(Profile::Es) if !is_es => Err(ShaderParseError::UnsupportedProfile(line.to_string())),
        Some(Profile::Core) | Some(Profile::Compatibility) if is_es || number < 150 => {
            Err(ShaderParseError::UnsupportedProfile(line.to_string()))
        }
        _ => Ok(Some(Version { number, profile })),
    }
}

/// Recognizes a directive line. Leading whitespace is ignored, as is a trailing `//` comment on
/// conditional lines. Returns `Ok(None)` for every line that is not one of the directives in `Directive`.
pub fn directive(line: &str) -> StdResult<Option<Directive>, ShaderParseError> {
    let trimmed = line.trim();
    if !trimmed.starts_with('#') && !trimmed.starts_with('-') {
        return Ok(None);
    }

    if let Ok((_, (spelling, negated, after))) = conditional(trimmed) {
        let after = after.trim_start();
        return match identifier(after) {
            Ok((remaining, flag)) => {
                let remaining = remaining.trim_start();
                if remaining.is_empty() || remaining.starts_with("//") {
                    Ok(Some(Directive::IfDef {
                        flag,
                        negated,
                        spelling,
                    }))
                } else {
                    Err(ShaderParseError::MalformedDirective(trimmed.to_string()))
                }
            }
            Err(_) => Err(ShaderParseError::MalformedDirective(trimmed.to_string())),
        };
    }

    if let Ok((_, directive)) = branch(trimmed) {
        return Ok(Some(directive));
    }

    Ok(version(trimmed)?.map(Directive::Version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditionals() {
        assert_eq!(
            directive("#ifdef _Bar"),
            Ok(Some(Directive::IfDef {
                flag: "_Bar",
                negated: false,
                spelling: Spelling::Hash
            }))
        );
        assert_eq!(
            directive("    #ifndef _Skinning // bones"),
            Ok(Some(Directive::IfDef {
                flag: "_Skinning",
                negated: true,
                spelling: Spelling::Hash
            }))
        );
        assert_eq!(
            directive("-ifdef _Legacy"),
            Ok(Some(Directive::IfDef {
                flag: "_Legacy",
                negated: false,
                spelling: Spelling::Dash
            }))
        );
    }

    #[test]
    fn branches() {
        assert_eq!(directive("#else"), Ok(Some(Directive::Else(Spelling::Hash))));
        assert_eq!(directive("#endif // _Bar"), Ok(Some(Directive::EndIf(Spelling::Hash))));
        assert_eq!(directive("-endif"), Ok(Some(Directive::EndIf(Spelling::Dash))));
        assert_eq!(directive("#if defined(_A) && N > 2"), Ok(Some(Directive::If)));
        assert_eq!(directive("#elif N > 3"), Ok(Some(Directive::Elif)));
    }

    #[test]
    fn ordinary_lines() {
        assert_eq!(directive("#define PI 3.14"), Ok(None));
        assert_eq!(directive("#extension GL_ARB_x : enable"), Ok(None));
        assert_eq!(directive("#iffy"), Ok(None));
        assert_eq!(directive("-c;"), Ok(None));
        assert_eq!(directive("in vec3 pos;"), Ok(None));
        assert_eq!(directive(""), Ok(None));
    }

    #[test]
    fn malformed_conditionals() {
        assert_eq!(
            directive("#ifdef"),
            Err(ShaderParseError::MalformedDirective("#ifdef".to_string()))
        );
        assert!(directive("#ifdef 3D").is_err());
        assert!(directive("#ifdef A B").is_err());
    }

    #[test]
    fn versions() {
        assert_eq!(
            directive("#version 450"),
            Ok(Some(Directive::Version(Version {
                number: 450,
                profile: None
            })))
        );
        assert_eq!(
            directive("#version 300 es"),
            Ok(Some(Directive::Version(Version {
                number: 300,
                profile: Some(Profile::Es)
            })))
        );
        assert_eq!(
            directive("#version 330 core"),
            Ok(Some(Directive::Version(Version {
                number: 330,
                profile: Some(Profile::Core)
            })))
        );
    }

    #[test]
    fn bad_versions() {
        assert_eq!(
            directive("#version abc"),
            Err(ShaderParseError::UnsupportedVersion("#version abc".to_string()))
        );
        assert!(matches!(
            directive("#version 451"),
            Err(ShaderParseError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            directive("#version 450 es"),
            Err(ShaderParseError::UnsupportedProfile(_))
        ));
        assert!(matches!(
            directive("#version 450 hdr"),
            Err(ShaderParseError::UnsupportedProfile(_))
        ));
        assert!(matches!(
            directive("#version 120 core"),
            Err(ShaderParseError::UnsupportedProfile(_))
        ));
    }
}
