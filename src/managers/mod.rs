pub mod analytics;
pub mod lifecycle_manager;
pub mod query_engine;

pub use analytics::{
    create_shared_analytics, AnalyticsAggregator, AnalyticsSummary, SharedAnalyticsAggregator,
};
pub use lifecycle_manager::{
    create_shared_lifecycle_manager, LifecycleEvent, LifecycleManager, SharedLifecycleManager,
};
pub use query_engine::{
    create_shared_query_engine, ClubFilters, Page, QueryEngine, RequestFilters, SearchOptions,
    SharedQueryEngine, SortBy, SortOrder,
};
