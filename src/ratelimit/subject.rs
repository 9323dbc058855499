//! Subject identification for rate limiting.

use serde::{Deserialize, Serialize};

/// The class of entity a rate limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    /// An authenticated end user.
    User,
    /// A client network address.
    Ip,
    /// An agent route, counted across all of its callers.
    Agent,
}

impl SubjectType {
    /// Name used in storage keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::Ip => "ip",
            SubjectType::Agent => "agent",
        }
    }
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key identifying whom a rate limit check applies to.
///
/// Two keys with the same type and value share counters, regardless of which
/// route the check came through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectKey {
    /// The class of subject.
    pub subject_type: SubjectType,
    /// The subject's identifier (user id, IP address, or route id).
    pub value: String,
}

impl SubjectKey {
    /// Create a new subject key.
    pub fn new(subject_type: SubjectType, value: impl Into<String>) -> Self {
        Self {
            subject_type,
            value: value.into(),
        }
    }

    /// Key for an end user.
    pub fn user(value: impl Into<String>) -> Self {
        Self::new(SubjectType::User, value)
    }

    /// Key for a client address.
    pub fn ip(value: impl Into<String>) -> Self {
        Self::new(SubjectType::Ip, value)
    }

    /// Key for an agent route.
    pub fn agent(value: impl Into<String>) -> Self {
        Self::new(SubjectType::Agent, value)
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.value)
    }
}
