//! Alias registry and matcher.
//!
//! The registry maps every registered alias to its command and compiles one
//! combined pattern that recognises any alias at the start of the text,
//! followed by a separator run or the end of input:
//!
//! ```text
//! (?s)\A(?P<alias>pingpong|ping|p)(?:[\s ]+|\z)(?P<parameters>.*)\z
//! ```
//!
//! Aliases are quoted and ordered longest first, so `pingpong` wins over
//! `ping` for the input `pingpong`, and `ping` alone never matches it because
//! the boundary group requires a separator or the end of input.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use tracing::debug;

use herald_core::{BoxedCommand, ConfigError, ConfigResult};

/// The alias and parameter string extracted from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMatch {
    pub alias: String,
    pub parameter_string: String,
}

/// Immutable mapping from alias to command, plus the combined matcher.
pub struct AliasRegistry<M> {
    commands: HashMap<String, BoxedCommand<M>>,
    /// `None` when no alias is registered; such a registry never matches.
    pattern: Option<Regex>,
    separator: char,
}

impl<M> AliasRegistry<M> {
    /// Builds the registry from the full command set.
    ///
    /// Fails if a command declares no aliases, declares an empty or
    /// whitespace-padded alias, or shares an alias with another command.
    pub fn build(commands: &[BoxedCommand<M>], separator: char) -> ConfigResult<Self> {
        let mut by_alias: HashMap<String, BoxedCommand<M>> = HashMap::new();

        for command in commands {
            let aliases = command.aliases();
            if aliases.is_empty() {
                return Err(ConfigError::EmptyAliases {
                    command: command.name().to_string(),
                });
            }

            for alias in aliases {
                if alias.is_empty() || alias.trim() != alias {
                    return Err(ConfigError::InvalidAlias {
                        command: command.name().to_string(),
                        alias,
                    });
                }

                if let Some(existing) = by_alias.get(&alias) {
                    // A command repeating one of its own aliases is harmless.
                    if std::sync::Arc::ptr_eq(existing, command) {
                        continue;
                    }
                    return Err(ConfigError::DuplicateAlias {
                        first: existing.name().to_string(),
                        second: command.name().to_string(),
                        alias,
                    });
                }
                by_alias.insert(alias, command.clone());
            }
        }

        let pattern = Self::compile(by_alias.keys().map(String::as_str), separator)?;
        debug!(
            aliases = by_alias.len(),
            commands = commands.len(),
            "Alias registry built"
        );

        Ok(Self {
            commands: by_alias,
            pattern,
            separator,
        })
    }

    fn compile<'a>(
        aliases: impl Iterator<Item = &'a str>,
        separator: char,
    ) -> ConfigResult<Option<Regex>> {
        let mut aliases: Vec<&str> = aliases.collect();
        if aliases.is_empty() {
            return Ok(None);
        }
        aliases.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let alternation = aliases
            .iter()
            .map(|alias| regex::escape(alias))
            .collect::<Vec<_>>()
            .join("|");
        let separator = regex::escape(separator.encode_utf8(&mut [0; 4]));
        let source =
            format!(r"(?s)\A(?P<alias>{alternation})(?:[\s{separator}]+|\z)(?P<parameters>.*)\z");

        Regex::new(&source)
            .map(Some)
            .map_err(|e| ConfigError::invalid_pattern(source, e))
    }

    /// Matches `text` against every registered alias.
    ///
    /// `text` is expected to have the prefix already removed and to be
    /// trimmed. Returns `None` when no alias matches at the start.
    pub fn match_alias(&self, text: &str) -> Option<AliasMatch> {
        let captures = self.pattern.as_ref()?.captures(text)?;
        Some(AliasMatch {
            alias: captures.name("alias")?.as_str().to_string(),
            parameter_string: captures
                .name("parameters")
                .map_or("", |m| m.as_str())
                .to_string(),
        })
    }

    /// Returns the command registered under `alias`.
    pub fn get(&self, alias: &str) -> Option<&BoxedCommand<M>> {
        self.commands.get(alias)
    }

    /// Returns `true` if `alias` is registered.
    pub fn contains(&self, alias: &str) -> bool {
        self.commands.contains_key(alias)
    }

    /// Returns every registered alias, sorted.
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns the parameter separator the pattern was compiled with.
    pub fn separator(&self) -> char {
        self.separator
    }
}

impl<M> fmt::Debug for AliasRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasRegistry")
            .field("aliases", &self.aliases())
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .finish()
    }
}
