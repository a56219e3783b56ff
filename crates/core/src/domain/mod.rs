pub mod conversation;
pub mod dataset;
pub mod item;
pub mod menu;
pub mod order;
