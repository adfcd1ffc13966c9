pub mod framer;
pub mod matcher;

pub use matcher::RespMatcher;
