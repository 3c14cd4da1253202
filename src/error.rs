use std::fmt::Display;

use anyhow::Error as anyhowError;

/// Which invariant a rejected operation would have violated. Surfaced so
/// callers can tell, e.g., a duplicate-invitation attempt apart from an
/// already-member attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    RequestExists,
    ConversationExists,
    AlreadyResolved,
    AlreadyMember,
    PendingInvitationExists,
    AlreadyAdmin,
    LastAdmin,
    MustPromoteFirst,
}

#[derive(Debug)]
pub enum AppError {
    // 400 bad request
    BadRequest(anyhowError),
    // 403 forbidden
    Forbidden(anyhowError),
    // 404 not found, or not visible to the caller
    NotFound(anyhowError),
    // 409 conflict with an existing record or a lifecycle invariant
    Conflict(ConflictReason, anyhowError),
    // 500 internal server error
    InternalServerError(anyhowError),
}

impl AppError {
    pub fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            AppError::Conflict(reason, _) => Some(*reason),
            _ => None,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::BadRequest(e) => write!(f, "BadRequest: {}", e),
            AppError::Forbidden(e) => write!(f, "Forbidden: {}", e),
            AppError::NotFound(e) => write!(f, "NotFound: {}", e),
            AppError::Conflict(reason, e) => write!(f, "Conflict ({:?}): {}", reason, e),
            AppError::InternalServerError(e) => write!(f, "InternalServerError: {}", e),
        }
    }
}

impl From<anyhowError> for AppError {
    fn from(e: anyhowError) -> Self {
        AppError::InternalServerError(e)
    }
}

pub type AppResult<T> = Result<T, AppError>;
