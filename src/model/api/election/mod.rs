mod desc;
mod results;
mod spec;

pub use desc::{CandidateDescription, ElectionDescription};
pub use results::{CandidateVotes, LedgerSync, ResultsView, SyncStatus, TallySource};
pub use spec::ElectionSpec;
