pub mod id;

pub use id::SessionToken;
