//! Application Layer
//!
//! Port definitions, order validation, and the order pipeline.

pub mod pipeline;
pub mod ports;
pub mod validation;

pub use pipeline::{OrderPipeline, generate_client_order_id};
pub use ports::{
    BrokerApi, EventPublisher, InMemoryOrderTracker, NoOpEventPublisher, OrderEvent, OrderTracker,
    PublishError, RiskCheck, RiskDecision,
};
pub use validation::{ModifyRequest, OrderRequest, ValidationResult};
