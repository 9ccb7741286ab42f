pub mod callback_queue;
pub mod connection;
pub mod frame;
pub mod pool;
#[cfg(feature = "tls")]
pub mod tls;

pub use self::callback_queue::CallbackQueue;
pub use self::connection::{BrokerConnection, BrokerEndpoint, ConnEvent};
pub use self::frame::{Frame, KafkaFrameCodec};
pub use self::pool::BrokerPool;
