pub mod evaluator;
pub mod scan;
