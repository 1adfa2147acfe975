//! Database access shared across FinOps services

pub mod init;

pub use init::init_database;
