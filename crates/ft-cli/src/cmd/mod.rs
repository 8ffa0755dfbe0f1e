pub mod config;
pub mod doctor;
pub mod feat;
pub mod init;
pub mod query;
pub mod reindex;
pub mod task;
pub mod validate;
