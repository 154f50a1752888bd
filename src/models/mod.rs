// Domain models: feed samples, snapshots, aggregated groups and view state

mod charts;
mod group;
mod sample;
mod view;

pub use charts::{ChartData, CountBucket, HourlyBucket};
pub use group::{GroupRow, QueryGroup, Trend, TrendDirection};
pub use sample::{Sample, Snapshot, query_text};
pub use view::{
    DEFAULT_PAGE_SIZE, SortDirection, SortKey, ViewItems, ViewPage, ViewState, ViewStatePatch,
};
