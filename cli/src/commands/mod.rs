pub mod apps;
pub mod drafts;
pub mod storage;
pub mod versions;
