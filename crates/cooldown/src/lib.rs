pub mod store;

pub use store::{CooldownKey, CooldownPolicy, CooldownStore};
