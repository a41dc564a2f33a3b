//! Token-to-team registry.
//!
//! Fixed when the authority is constructed and immutable afterwards. Several
//! tokens may map to the same team (one per robot).

use crate::config::ConfigError;
use common::types::ClientToken;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Registered clients, keyed by bearer token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientRegistry {
    teams: HashMap<ClientToken, String>,
}

impl ClientRegistry {
    /// Build a registry from `(token, team)` pairs. Later duplicates of a
    /// token replace earlier ones.
    pub fn new<I, T, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<ClientToken>,
        S: Into<String>,
    {
        Self {
            teams: entries
                .into_iter()
                .map(|(token, team)| (token.into(), team.into()))
                .collect(),
        }
    }

    /// Parse `token=team` pairs separated by commas, e.g.
    /// `red-1=red,red-2=red,blue-1=blue`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRegistry`] for an empty list, a pair
    /// without `=`, an empty token or team, or a duplicated token.
    pub fn parse(pairs: &str) -> Result<Self, ConfigError> {
        let mut teams = HashMap::new();

        for entry in pairs.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, team) = entry.split_once('=').ok_or_else(|| {
                ConfigError::InvalidRegistry(format!(
                    "expected 'token=team' pairs, entry #{} has no '='",
                    teams.len() + 1
                ))
            })?;
            let (token, team) = (token.trim(), team.trim());

            if token.is_empty() || team.is_empty() {
                return Err(ConfigError::InvalidRegistry(
                    "token and team must both be non-empty".to_string(),
                ));
            }
            if token.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidRegistry(format!(
                    "token for team '{team}' must not contain whitespace"
                )));
            }
            if teams
                .insert(ClientToken::new(token), team.to_string())
                .is_some()
            {
                return Err(ConfigError::InvalidRegistry(format!(
                    "duplicate token for team '{team}'"
                )));
            }
        }

        if teams.is_empty() {
            return Err(ConfigError::InvalidRegistry(
                "at least one client must be registered".to_string(),
            ));
        }

        Ok(Self { teams })
    }

    /// Team of a registered token.
    #[must_use]
    pub fn team_of(&self, token: &str) -> Option<&str> {
        self.teams.get(token).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.teams.contains_key(token)
    }

    /// Every registered token, in no particular order.
    pub fn tokens(&self) -> impl Iterator<Item = &ClientToken> {
        self.teams.keys()
    }

    /// Distinct team names, sorted.
    #[must_use]
    pub fn teams(&self) -> BTreeSet<&str> {
        self.teams.values().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

/// Custom Debug implementation that shows teams but not tokens.
impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.teams.len())
            .field("teams", &self.teams())
            .finish()
    }
}
