pub mod sui;
pub mod traits;
