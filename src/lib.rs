pub mod core;
pub mod storage;
