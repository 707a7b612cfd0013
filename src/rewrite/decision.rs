//! Redirect decisions handed to the HTTP layer.

use std::fmt;

/// A redirect target. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location(String);

impl Location {
    /// Returns `None` for an empty or blank target.
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            None
        } else {
            Some(Self(url))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Decision {
    /// Let the request continue normally.
    #[default]
    NoAction,
    /// Answer with a permanent (301) redirect and stop processing.
    RedirectTo(Location),
}

impl Decision {
    /// Redirect to `url`, or `NoAction` if `url` is empty.
    pub fn redirect_to(url: impl Into<String>) -> Self {
        Location::new(url).map_or(Decision::NoAction, Decision::RedirectTo)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Decision::RedirectTo(_))
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Decision::RedirectTo(location) => Some(location),
            Decision::NoAction => None,
        }
    }
}

impl From<Option<Location>> for Decision {
    fn from(location: Option<Location>) -> Self {
        location.map_or(Decision::NoAction, Decision::RedirectTo)
    }
}
