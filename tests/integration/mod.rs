//! End-to-end pipeline scenarios

mod experiments_tests;
mod fine_tuning_tests;
mod pipeline_tests;
mod streaming_tests;
