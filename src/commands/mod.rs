//! CLI commands implementation

pub mod index;
pub mod ingest;
pub mod init;
pub mod normalize;
pub mod ready;
pub mod regression;
pub mod status;
pub mod validate;

pub use index::*;
pub use ingest::*;
pub use init::*;
pub use normalize::*;
pub use ready::*;
pub use regression::*;
pub use status::*;
pub use validate::*;
