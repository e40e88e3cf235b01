pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{PsycheError, Result};
pub use traits::{Agent, SessionStore};
pub use types::*;
