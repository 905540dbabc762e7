pub mod command;
pub mod transfer;
