pub mod inventory;
pub mod story;
pub mod value;
