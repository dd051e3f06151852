// Domain layer: catalog models and the ports the pipeline steps depend on.

pub mod model;
pub mod ports;
