pub mod ftp;
pub mod http;
pub mod registry;
