pub mod interaction;
pub mod update_applier;
pub mod version_differ;

pub use interaction::UpdateInteraction;
pub use update_applier::{CancellationFlag, UpdateApplier, UpdateReport};
pub use version_differ::{UpdatePlanItem, VersionDiffer};
