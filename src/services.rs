pub mod connections;
pub mod groups;
pub mod permissions;
