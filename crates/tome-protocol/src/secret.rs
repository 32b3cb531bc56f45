//! Human-shareable room secrets.
//!
//! A secret is a room id and a password, either combined ("mended") as
//! `"ID?PW"` or split ("rended") into the pair. Filtering upper-cases and
//! keeps only `A-Z`, so secrets survive being read aloud or retyped.
use std::fmt;

use rand::seq::IndexedRandom;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const GROUP_LEN: usize = 6;
const SEPARATOR: char = '?';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Secret {
    /// `"ID?PW"`.
    Mended(String),
    /// `(ID, PW)`.
    Rended(String, String),
}

impl Secret {
    /// Two groups of six distinct letters, mended.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let mut group = || -> String {
            ALPHABET
                .choose_multiple(&mut rng, GROUP_LEN)
                .map(|&b| b as char)
                .collect()
        };
        let id = group();
        let pw = group();
        Secret::Mended(format!("{id}{SEPARATOR}{pw}"))
    }

    pub fn id(&self, filter: bool) -> String {
        self.rend(filter).0
    }

    pub fn pw(&self, filter: bool) -> String {
        self.rend(filter).1
    }

    /// Combined `"ID?PW"` form.
    pub fn mend(&self, filter: bool) -> String {
        let (id, pw) = self.rend(filter);
        format!("{id}{SEPARATOR}{pw}")
    }

    /// Split `(ID, PW)` form. A mended secret without `?` has an empty password.
    pub fn rend(&self, filter: bool) -> (String, String) {
        let clean = |s: &str| if filter { filter_letters(s) } else { s.to_string() };
        match self {
            Secret::Rended(id, pw) => (clean(id), clean(pw)),
            Secret::Mended(s) => {
                let mut parts = s.split(SEPARATOR);
                let id = parts.next().unwrap_or_default();
                let pw = parts.next().unwrap_or_default();
                (clean(id), clean(pw))
            }
        }
    }

    /// Canonical filtered secret, rendered mended.
    pub fn normalized(&self) -> Secret {
        Secret::Mended(self.mend(true))
    }
}

/// Upper-case, then drop everything outside `A-Z`.
pub fn filter_letters(s: &str) -> String {
    s.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase())
        .collect()
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mend(false))
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Secret::Mended(s.to_string())
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Secret::Mended(s)
    }
}

impl From<(String, String)> for Secret {
    fn from((id, pw): (String, String)) -> Self {
        Secret::Rended(id, pw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_shape() {
        let secret = Secret::random();
        let s = secret.to_string();
        assert_eq!(s.len(), 2 * GROUP_LEN + 1);
        let (id, pw) = secret.rend(false);
        assert_eq!(id.len(), GROUP_LEN);
        assert_eq!(pw.len(), GROUP_LEN);
        // letters within a group are distinct
        let distinct: std::collections::HashSet<char> = id.chars().collect();
        assert_eq!(distinct.len(), GROUP_LEN);
        // already canonical
        assert_eq!(secret.mend(true), s);
    }

    #[test]
    fn filtering_mended() {
        let secret = Secret::from("ab-c1d?x y z");
        assert_eq!(secret.id(true), "ABCD");
        assert_eq!(secret.pw(true), "XYZ");
        assert_eq!(secret.id(false), "ab-c1d");
        assert_eq!(secret.mend(true), "ABCD?XYZ");
    }

    #[test]
    fn filtering_rended() {
        let secret = Secret::from(("r00m".to_string(), "Pass!".to_string()));
        assert_eq!(secret.rend(true), ("RM".to_string(), "PASS".to_string()));
        assert_eq!(secret.to_string(), "r00m?Pass!");
    }

    #[test]
    fn missing_separator_means_empty_password() {
        let secret = Secret::from("ONLYID");
        assert_eq!(secret.id(true), "ONLYID");
        assert_eq!(secret.pw(true), "");
        assert_eq!(secret.mend(true), "ONLYID?");
    }

    #[test]
    fn extra_separators_are_ignored() {
        let secret = Secret::from("AAA?BBB?CCC");
        assert_eq!(secret.rend(true), ("AAA".to_string(), "BBB".to_string()));
    }

    #[test]
    fn normalized_roundtrip() {
        let secret = Secret::from(("ab".to_string(), "cd".to_string())).normalized();
        assert_eq!(secret, Secret::Mended("AB?CD".to_string()));
    }
}
