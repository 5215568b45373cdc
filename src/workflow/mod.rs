pub mod phase;
pub mod research;

pub use phase::{transition_phase, PhaseTransition};
pub use research::{create_job, get_job, list_active_jobs, update_job, ListingCache, LogInvalidator};
