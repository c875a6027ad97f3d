//! Variant enumeration and expansion.
//!
//! A shader family with N flags has 2^N variants. Each variant is identified by a `VariantKey`, the
//! sorted subset of flags that is defined in it. Expanding a source for a key keeps the code reachable
//! when exactly those flags are defined, drops the conditional directives that selected it and injects
//! one `#define` per flag after the `#version` line.

use crate::parsers::directive::{directive, Directive, Spelling};
use crate::parsers::ShaderParseError;
use crate::source::ShaderSource;
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

/// The platform macro every GLSL ES compiler defines. It never becomes a variant.
pub const GL_ES: &str = "GL_ES";

/// How a flag found in `#ifdef`/`#ifndef` is treated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlagPolicy {
    /// The flag is a variant axis. Code it guards is kept or dropped depending on the variant.
    Variant,
    /// The flag belongs to the downstream compiler (`GL_ES`). It is not an axis and its blocks, directives
    /// included, are copied untouched.
    Ignored,
    /// The flag is an axis but its guarded code is always treated as if the flag was undefined.
    ForceExcluded,
}

/// Per-flag policies plus the directive spellings that are recognized.
#[derive(Debug, Clone)]
pub struct FlagRules {
    policies: HashMap<String, FlagPolicy>,
    legacy_directives: bool,
}

impl Default for FlagRules {
    fn default() -> Self {
        FlagRules::empty().with_policy(GL_ES, FlagPolicy::Ignored)
    }
}

impl FlagRules {
    /// No special flags, legacy `-ifdef` spelling accepted.
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
            legacy_directives: true,
        }
    }

    pub fn with_policy(mut self, flag: &str, policy: FlagPolicy) -> Self {
        self.set_policy(flag, policy);
        self
    }

    pub fn set_policy(&mut self, flag: &str, policy: FlagPolicy) {
        if policy == FlagPolicy::Variant {
            self.policies.remove(flag);
        } else {
            self.policies.insert(flag.to_string(), policy);
        }
    }

    pub fn with_legacy_directives(mut self, enabled: bool) -> Self {
        self.legacy_directives = enabled;
        self
    }

    pub fn policy(&self, flag: &str) -> FlagPolicy {
        self.policies
            .get(flag)
            .copied()
            .unwrap_or(FlagPolicy::Variant)
    }

    /// Whether `-ifdef`/`-endif` lines are directives. When they're not, they are plain text.
    pub fn accepts(&self, spelling: Spelling) -> bool {
        spelling == Spelling::Hash || self.legacy_directives
    }

    /// Parses `line` and drops directives written in a spelling these rules don't accept.
    pub(crate) fn directive<'l>(
        &self,
        line: &'l str,
    ) -> Result<Option<Directive<'l>>, ShaderParseError> {
        Ok(directive(line)?.filter(|d| self.accepts(d.spelling())))
    }
}

/// The set of flags defined in one variant, kept sorted so names are stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VariantKey {
    flags: Vec<String>,
}

impl VariantKey {
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut flags: Vec<String> = flags.into_iter().map(Into::into).collect();
        flags.sort();
        flags.dedup();
        Self { flags }
    }

    /// The baseline variant, no flag defined.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.flags
            .binary_search_by(|f| f.as_str().cmp(flag))
            .is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// The flags concatenated with no separator, appended to base names: `mesh` + `_Bar_Tex`.
    pub fn suffix(&self) -> String {
        self.flags.concat()
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.flags.join(", "))
    }
}

/// Calls `visit` with every `k`-combination of `0..n`, in lexicographic order.
fn combinations(n: usize, k: usize, mut visit: impl FnMut(&[usize])) {
    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        visit(&indices);

        let mut i = k;
        loop {
            if i == 0 {
                return;
            }
            i -= 1;
            if indices[i] != i + n - k {
                break;
            }
        }

        indices[i] += 1;
        for j in i + 1..k {
            indices[j] = indices[j - 1] + 1;
        }
    }
}

/// Every subset of `flags`, 2^N keys for N flags: the empty key first, then all single flags, then all
/// pairs and so on, each size in lexicographic order. Callers are expected to keep N small.
pub fn generate_all_variants(flags: &BTreeSet<String>) -> Vec<VariantKey> {
    let flags: Vec<&String> = flags.iter().collect();
    let mut keys = Vec::new();

    for size in 0..=flags.len() {
        combinations(flags.len(), size, |indices| {
            keys.push(VariantKey {
                flags: indices.iter().map(|&i| flags[i].clone()).collect(),
            });
        });
    }

    keys
}

/// Errors found while following the conditional structure of a shader.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandError {
    /// An `#ifdef` that is never closed, or an `#else`/`#endif` closing nothing. `line` is 1-based and
    /// points at the offending directive.
    UnbalancedConditional {
        shader: String,
        line: usize,
        directive: String,
    },
    /// A second `#else`, or an `#elif` inside a block selected by a variant flag.
    UnexpectedDirective {
        shader: String,
        line: usize,
        directive: String,
    },
    Parse {
        shader: String,
        line: usize,
        error: ShaderParseError,
    },
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExpandError::UnbalancedConditional {
                shader,
                line,
                directive,
            } => write!(f, "{}:{}: unbalanced conditional `{}`", shader, line, directive),
            ExpandError::UnexpectedDirective {
                shader,
                line,
                directive,
            } => write!(f, "{}:{}: unexpected `{}`", shader, line, directive),
            ExpandError::Parse {
                shader,
                line,
                error,
            } => write!(f, "{}:{}: {}", shader, line, error),
        }
    }
}

impl std::error::Error for ExpandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExpandError::Parse { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// What happens to conditional blocks selected by variant flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpandMode {
    /// Only the code reachable in the variant is written, variant directives are removed.
    Strip,
    /// Every line is written as is and the downstream compiler resolves the blocks through the injected
    /// defines. Legacy `-ifdef` blocks and blocks of force-excluded flags are still stripped, no define
    /// would ever select them.
    Preserve,
}

#[derive(Debug)]
enum Block {
    /// A block selected by a variant flag. `taking` tells if the current branch is kept.
    Variant { taking: bool, seen_else: bool },
    /// A block left to the compiler (`#if`, `#ifdef GL_ES`, everything in preserve mode). Both branches
    /// are kept. `echo` is false for legacy spelled blocks, whose directive lines are dropped.
    Verbatim { echo: bool },
}

#[derive(Debug)]
struct OpenBlock {
    block: Block,
    line: usize,
    text: String,
}

impl OpenBlock {
    fn taking(&self) -> bool {
        match self.block {
            Block::Variant { taking, .. } => taking,
            Block::Verbatim { .. } => true,
        }
    }
}

/// Produces variant copies of shader sources. An `Expander` holds no state between calls so one can be
/// shared by every variant, including from several threads.
#[derive(Debug, Clone)]
pub struct Expander<'r> {
    rules: &'r FlagRules,
    mode: ExpandMode,
    inject_defines: bool,
}

impl<'r> Expander<'r> {
    pub fn new(rules: &'r FlagRules) -> Self {
        Self {
            rules,
            mode: ExpandMode::Strip,
            inject_defines: true,
        }
    }

    pub fn with_mode(mut self, mode: ExpandMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_defines(mut self, inject_defines: bool) -> Self {
        self.inject_defines = inject_defines;
        self
    }

    pub fn rules(&self) -> &FlagRules {
        self.rules
    }

    fn opens_variant_block(&self, flag: &str, spelling: Spelling) -> bool {
        match self.rules.policy(flag) {
            FlagPolicy::Ignored => false,
            FlagPolicy::ForceExcluded => true,
            FlagPolicy::Variant => self.mode == ExpandMode::Strip || spelling == Spelling::Dash,
        }
    }

    /// One `#define` per flag of `key` that can be defined at all.
    fn defines(&self, key: &VariantKey) -> Vec<String> {
        key.flags()
            .iter()
            .filter(|f| self.rules.policy(f.as_str()) != FlagPolicy::ForceExcluded)
            .map(|f| format!("#define {}", f))
            .collect()
    }

    /// Writes the variant of `source` where exactly the flags in `key` are defined.
    pub fn expand(&self, source: &ShaderSource, key: &VariantKey) -> Result<ShaderSource, ExpandError> {
        let shader = source.name();
        let mut output: Vec<String> = Vec::with_capacity(source.lines().len() + key.flags().len());
        let mut stack: Vec<OpenBlock> = Vec::new();
        let mut defines_written = !self.inject_defines;

        let unbalanced = |line: usize, text: &str| ExpandError::UnbalancedConditional {
            shader: shader.to_string(),
            line,
            directive: text.trim().to_string(),
        };
        let unexpected = |line: usize, text: &str| ExpandError::UnexpectedDirective {
            shader: shader.to_string(),
            line,
            directive: text.trim().to_string(),
        };

        for (index, text) in source.lines().iter().enumerate() {
            let line = index + 1;
            let live = stack.iter().all(OpenBlock::taking);
            let parsed = self.rules.directive(text).map_err(|error| ExpandError::Parse {
                shader: shader.to_string(),
                line,
                error,
            })?;

            match parsed {
                None => {
                    if live {
                        output.push(text.clone());
                    }
                }
                Some(Directive::IfDef {
                    flag,
                    negated,
                    spelling,
                }) => {
                    let block = if self.opens_variant_block(flag, spelling) {
                        let defined = self.rules.policy(flag) == FlagPolicy::Variant && key.contains(flag);
                        Block::Variant {
                            taking: defined != negated,
                            seen_else: false,
                        }
                    } else {
                        let echo = spelling == Spelling::Hash;
                        if live && echo {
                            output.push(text.clone());
                        }
                        Block::Verbatim { echo }
                    };
                    stack.push(OpenBlock {
                        block,
                        line,
                        text: text.trim().to_string(),
                    });
                }
                Some(Directive::If) => {
                    if live {
                        output.push(text.clone());
                    }
                    stack.push(OpenBlock {
                        block: Block::Verbatim { echo: true },
                        line,
                        text: text.trim().to_string(),
                    });
                }
                Some(Directive::Elif) => match stack.last() {
                    Some(OpenBlock {
                        block: Block::Verbatim { echo },
                        ..
                    }) => {
                        if live && *echo {
                            output.push(text.clone());
                        }
                    }
                    Some(_) => return Err(unexpected(line, text)),
                    None => return Err(unbalanced(line, text)),
                },
                Some(Directive::Else(_)) => match stack.last_mut() {
                    Some(OpenBlock {
                        block: Block::Verbatim { echo },
                        ..
                    }) => {
                        if live && *echo {
                            output.push(text.clone());
                        }
                    }
                    Some(OpenBlock {
                        block: Block::Variant { taking, seen_else },
                        ..
                    }) => {
                        if *seen_else {
                            return Err(unexpected(line, text));
                        }
                        *taking = !*taking;
                        *seen_else = true;
                    }
                    None => return Err(unbalanced(line, text)),
                },
                Some(Directive::EndIf(_)) => match stack.pop() {
                    Some(OpenBlock {
                        block: Block::Verbatim { echo },
                        ..
                    }) => {
                        if live && echo {
                            output.push(text.clone());
                        }
                    }
                    Some(_) => {}
                    None => return Err(unbalanced(line, text)),
                },
                Some(Directive::Version(_)) => {
                    if live {
                        output.push(text.clone());
                        if !defines_written {
                            output.extend(self.defines(key));
                            defines_written = true;
                        }
                    }
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(unbalanced(open.line, &open.text));
        }

        if !defines_written {
            output.splice(0..0, self.defines(key));
        }

        Ok(ShaderSource::from_lines(source.stage(), shader, output))
    }
}

/// Expands `source` for `key` with the default rules: strip mode, defines injected, `GL_ES` ignored.
pub fn expand(source: &ShaderSource, key: &VariantKey) -> Result<ShaderSource, ExpandError> {
    Expander::new(&FlagRules::default()).expand(source, key)
}
