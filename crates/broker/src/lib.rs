pub mod backend;
pub mod broker;
pub mod delivery;
pub mod error;
pub mod health_loop;
pub mod lifecycle;

pub use backend::{Backend, FakeBackend, RedisBackend};
pub use broker::{Broker, MessageHandler};
pub use error::BrokerError;
pub use lifecycle::ShutdownHandle;
