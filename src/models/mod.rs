pub mod diagnostics;
pub mod error;
pub mod export;
pub mod health;
pub mod record;

pub use diagnostics::*;
pub use error::*;
pub use export::*;
pub use health::*;
pub use record::*;
