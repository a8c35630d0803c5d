pub mod diagnostics;
pub mod doc_delete;
pub mod doc_get;
pub mod doc_list;
pub mod doc_save;
pub mod health;
pub mod room_export;

pub use diagnostics::*;
pub use doc_delete::*;
pub use doc_get::*;
pub use doc_list::*;
pub use doc_save::*;
pub use health::*;
pub use room_export::*;
