pub mod defs;
pub mod empty;
