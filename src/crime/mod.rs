// Crime records: local catalog search and the backing table

pub mod catalog;
pub mod registry;
