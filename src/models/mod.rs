//! Domain models shared across the engine.

pub mod enums;

mod caregiver;
mod medicine;
mod occurrence;
mod patient;
mod reminder;

pub use caregiver::*;
pub use enums::*;
pub use medicine::*;
pub use occurrence::*;
pub use patient::*;
pub use reminder::*;
