/// Integration tests for the persistence facade over the in-memory store:
/// evaluator/query equivalence, paging, daily partitions, aggregation,
/// failure handling and purge.

mod aggregations;
mod equivalence;
mod failures;
mod helpers;
mod paging;
mod partitions;
mod scenarios;
