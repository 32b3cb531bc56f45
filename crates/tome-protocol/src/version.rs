use std::fmt;

/// Protocol version; its rendering is the application id peers meet under.
///
/// Sessions built from different versions land in different rooms and
/// never see each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub moniker: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(moniker: impl Into<String>, major: u32, minor: u32, patch: u32) -> Self {
        Self {
            moniker: moniker.into(),
            major,
            minor,
            patch,
        }
    }

    /// Version of this crate.
    pub fn current() -> Self {
        Self::new(
            "tome",
            env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        )
    }

    /// Application id used when joining rooms.
    pub fn application_id() -> String {
        Self::current().to_string()
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new("", 0, 0, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}.{}", self.moniker, self.major, self.minor, self.patch)
    }
}
