pub mod app;
pub mod conf;
pub mod init;
pub mod logger;
pub mod registry;

#[cfg(test)]
mod test_utils;
