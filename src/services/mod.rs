pub mod adapter;
pub mod digest_tee;
pub mod memory_store;
pub mod progress;
pub mod storage;
pub mod uploader;
