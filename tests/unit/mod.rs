pub mod discovery;
pub mod selection;
