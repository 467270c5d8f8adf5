//! Narrow interfaces to the collaborators the matcher depends on, with
//! in-memory implementations used by the server binary and tests.

mod clock;
mod profiles;
mod slots;

pub use clock::{Clock, ManualClock, SystemClock};
pub use profiles::{CompatibilityService, MemoryProfiles, ProfileCompatibility, ProfileDirectory};
pub use slots::{MemorySlots, SlotService};
