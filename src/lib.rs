pub mod boosting;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod ensemble;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod forest;
pub mod identity;
pub mod ingest;
pub mod logging;
pub mod logistic;
pub mod records;
pub mod scaler;
pub mod split;
pub mod store;
pub mod trainer;
pub mod tree;
