pub mod catalog;
pub mod deployment;
