pub mod connect;
pub mod info;
pub mod password;
pub mod run;
pub mod sessions;
