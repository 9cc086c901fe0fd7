pub mod add;
pub mod common;
pub mod delete;
pub mod drain;
pub mod edit;
pub mod list;
pub mod status;
pub mod watch;
