pub mod builders;
pub mod chain;
pub mod journal;
