use crate::parsers::directive::Directive;
use crate::source::ShaderSource;
use crate::variants::{ExpandError, FlagPolicy, FlagRules};
use std::collections::BTreeSet;

/// Collects every flag named by an `#ifdef`/`#ifndef` in `sources`. Flags whose policy is `Ignored` are
/// left out, as are legacy `-ifdef` lines when the rules don't accept that spelling. Block structure is
/// not checked here, expansion does that.
pub fn scan<'s, I>(sources: I, rules: &FlagRules) -> Result<BTreeSet<String>, ExpandError>
where
    I: IntoIterator<Item = &'s ShaderSource>,
{
    let mut flags = BTreeSet::new();

    for source in sources {
        for (index, line) in source.lines().iter().enumerate() {
            let parsed = rules.directive(line).map_err(|error| ExpandError::Parse {
                shader: source.name().to_string(),
                line: index + 1,
                error,
            })?;

            if let Some(Directive::IfDef { flag, .. }) = parsed {
                if rules.policy(flag) != FlagPolicy::Ignored && !flags.contains(flag) {
                    flags.insert(flag.to_string());
                }
            }
        }
    }

    Ok(flags)
}
