pub mod documents;
pub mod pool;
