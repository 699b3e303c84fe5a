//! Gateway control plane: node registry, connection supervisor, HTTP
//! ingress, and the bootstrap glue that wires `ag-domain` config into
//! running services.

pub mod api;
pub mod cli;
pub mod nodes;
pub mod state;
