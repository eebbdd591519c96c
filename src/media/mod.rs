pub mod gateway;

pub use gateway::MediaGateway;
