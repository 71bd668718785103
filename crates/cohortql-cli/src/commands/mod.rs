pub mod compile;
pub mod criteria;
