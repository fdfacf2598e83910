//! The data model shared by every engine component.

mod fetch_metadata;
mod fetch_params;
mod fetch_state;
mod pull_record;

pub use fetch_metadata::{FetchMetadata, FetchResults};
pub use fetch_params::{FetchMode, FetchParameters};
pub use fetch_state::FetchState;
pub use pull_record::PullRecord;
