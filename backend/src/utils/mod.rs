pub mod time;
pub mod token;
pub mod urls;

pub use time::*;
pub use token::*;
