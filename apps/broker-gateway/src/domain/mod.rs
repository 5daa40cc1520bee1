//! Domain Layer
//!
//! Pure types for orders, sessions and subscriptions. No I/O, no external
//! service dependencies.

pub mod order;
pub mod session;
pub mod subscription;

pub use order::{Order, OrderError, OrderSide, OrderStateMachine, OrderStatus, OrderType, TimeInForce};
pub use session::Session;
pub use subscription::{StreamChannel, Subscription, SubscriptionSet};
