pub mod inventory;
pub mod requirement;

pub use inventory::Inventory;
pub use requirement::Requirement;

pub type ExtendedItem = usize; // Index into World.item_isv.keys: physical items, area/location bits, and synthetic bits
