pub mod budget;
pub mod draft;
pub mod gateway;
pub mod init;
