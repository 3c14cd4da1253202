pub mod connections;
pub mod groups;
pub mod invitations;
pub mod users;

/// The storage constraints are the authoritative duplicate guard; every
/// insert site translates a unique-key violation into the same `Conflict`
/// the fast-path existence check would have produced.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}
