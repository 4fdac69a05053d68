pub mod action;
pub mod cascade;
pub mod condition;
pub mod expr;
pub mod history;
pub mod leaf_text;
pub mod persist;
pub mod resolve;
mod scan;
pub mod session;
