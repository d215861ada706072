pub mod images;
pub mod mock;
