//! Shared contracts for the OptimaLDN services: the message schemas carried
//! over the bus, the exchange/routing-key topology, and the resilient broker
//! client every publisher and consumer goes through.

pub mod broker;
pub mod config;
pub mod routing;
pub mod schema;
