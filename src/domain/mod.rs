// Domain layer: report/CA/portfolio models and the ports the adapters implement.

pub mod model;
pub mod ports;
