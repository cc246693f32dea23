pub mod bulk_inspect;
pub mod dispatch;
pub mod type_counts;
