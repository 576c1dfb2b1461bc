pub mod db;
pub mod memory;
pub mod realtime;
pub mod storage;
pub mod store;
