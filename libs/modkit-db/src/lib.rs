//! Generic document repository kernel (spec §4.2-§4.3): a single
//! `Repository` over `type`-tagged documents, with tenant isolation,
//! soft-delete, and audit recording enforced on every call rather than
//! trusted to callers.

pub mod aggregation;
pub mod database;
pub mod directory;
pub mod filter;
pub mod model;
pub mod pagination;
pub mod repository;

pub use aggregation::{AggregateInput, AggregationConfig, GroupBy};
pub use database::{Database, DatabaseHealth, PoolStats};
pub use directory::MongoDirectory;
pub use filter::{Filter, SEARCHABLE_FIELDS, filter_to_bson, mandatory_filter, validate_date_operators};
pub use model::{Document, RESERVED_FIELDS};
pub use pagination::{FindOptions, MAX_PAGE_LIMIT, PaginatedResult, PaginationOptions};
pub use repository::{BulkCreateOutcome, OptionItem, Repository, StatsResult};
