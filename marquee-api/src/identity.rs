//! Who is calling.

use std::fmt;
use std::net::IpAddr;

use marquee_core::ActorId;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Caller identity resolved by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    User(ActorId),
    Anonymous { addr: IpAddr },
}

impl Identity {
    /// Resolve from an optional session user id and the peer address.
    ///
    /// A user id that is not a valid UUID is treated as no session.
    pub fn resolve(user_id: Option<&str>, addr: IpAddr) -> Self {
        match user_id.and_then(|id| Uuid::parse_str(id.trim()).ok()) {
            Some(id) => Self::User(ActorId::new(id)),
            None => Self::Anonymous { addr },
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }

    /// The signed-in actor, or `Unauthenticated`.
    ///
    /// Toggle operations require this; reads do not.
    pub fn actor(&self) -> ApiResult<ActorId> {
        match self {
            Self::User(actor) => Ok(*actor),
            Self::Anonymous { .. } => Err(ApiError::Unauthenticated),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(actor) => write!(f, "user:{}", actor),
            Self::Anonymous { addr } => write!(f, "anon:{}", addr),
        }
    }
}
