pub mod analysis;
pub mod contract;
pub mod quote;
pub mod records;
pub mod ticker;
