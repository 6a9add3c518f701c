pub mod batch;
pub mod fetcher;
pub mod identity;
pub mod line_diff;
pub mod reconcile;

pub use batch::split_in_batches;
pub use fetcher::{DetailFetcher, FetcherConfig, OrgConnection, MAX_COMPOSITE_SUBREQUESTS};
pub use identity::{canonical_body, record_key};
pub use line_diff::{diff_lines, AlignedDiffer, LineDiffer, PositionalDiffer};
pub use reconcile::{compare_org_kind, reconcile, ReconcileEngine};
