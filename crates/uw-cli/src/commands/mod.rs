pub mod audit;
pub mod deal;
pub mod dispatch;
pub mod document;
pub mod init;
pub mod issue;
pub mod run;
pub mod shared;
pub mod source;
