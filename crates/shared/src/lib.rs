pub mod config;

pub use config::{Config, DecisionPolicy, LogFormat, NodeConfig, ProximityConfig, RadioBackend};
