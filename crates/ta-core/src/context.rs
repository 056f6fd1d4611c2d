//! Tracking context and validated identifier types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated user identifier.
    ///
    /// Every tracking context requires one; without an authenticated user
    /// there is nothing to account time against.
    UserId, "user ID"
);

define_string_id!(
    /// A validated training-session identifier.
    SessionId, "session ID"
);

define_string_id!(
    /// A validated course identifier.
    CourseId, "course ID"
);

/// Identifies what activity is being measured.
///
/// Two contexts are distinct if any field differs, including the presence or
/// absence of the optional identifiers. A context change while tracking must
/// drain the old context's accumulator before tracking resumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackingContext {
    /// The authenticated user this activity belongs to.
    pub user_id: UserId,

    /// The training session being viewed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// The course being viewed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<CourseId>,
}

impl TrackingContext {
    /// Creates a context for a user with no session or course attribution.
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            session_id: None,
            course_id: None,
        }
    }

    /// Attributes this context to a training session.
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attributes this context to a course.
    #[must_use]
    pub fn with_course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }

    /// Resolves a context from raw routing and auth state.
    ///
    /// Returns `Ok(None)` when no user is authenticated - the engine must
    /// stay uninitialized in that case rather than tracking anonymously.
    pub fn from_route_parts(
        user_id: Option<&str>,
        session_id: Option<&str>,
        course_id: Option<&str>,
    ) -> Result<Option<Self>, ValidationError> {
        let Some(user_id) = user_id else {
            return Ok(None);
        };
        Ok(Some(Self {
            user_id: UserId::new(user_id)?,
            session_id: session_id.map(SessionId::new).transpose()?,
            course_id: course_id.map(CourseId::new).transpose()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("u1").is_ok());
    }

    #[test]
    fn user_id_serde_roundtrip() {
        let id = UserId::new("user-123").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"user-123\"");
        let parsed: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn user_id_serde_rejects_empty() {
        let result: Result<UserId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn contexts_differ_on_any_field() {
        let base = TrackingContext::new(UserId::new("u1").unwrap());
        let with_course = base.clone().with_course(CourseId::new("c1").unwrap());
        let other_course = base.clone().with_course(CourseId::new("c2").unwrap());
        let with_session = base.clone().with_session(SessionId::new("s1").unwrap());

        assert_ne!(base, with_course);
        assert_ne!(with_course, other_course);
        assert_ne!(base, with_session);
        assert_ne!(with_course, with_session);
        assert_eq!(base, TrackingContext::new(UserId::new("u1").unwrap()));
    }

    #[test]
    fn from_route_parts_without_user_is_none() {
        let resolved = TrackingContext::from_route_parts(None, Some("s1"), Some("c1")).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn from_route_parts_resolves_full_context() {
        let resolved = TrackingContext::from_route_parts(Some("u1"), None, Some("c1"))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.user_id.as_str(), "u1");
        assert!(resolved.session_id.is_none());
        assert_eq!(resolved.course_id.unwrap().as_str(), "c1");
    }

    #[test]
    fn from_route_parts_rejects_empty_course() {
        let result = TrackingContext::from_route_parts(Some("u1"), None, Some(""));
        assert!(result.is_err());
    }
}
