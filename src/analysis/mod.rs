pub mod pe_statistics;

pub use pe_statistics::*;
