pub mod config;
pub mod context;
pub mod error;
pub mod gc;
pub mod handlers;
pub mod hasher;
pub mod memory;
pub mod middleware;
pub mod options;
pub mod server;
pub mod store;
pub mod throttler;

pub use config::Config;
pub use context::Context;
pub use error::{ThrottlerError, ThrottlerResult};
pub use hasher::{identify, KeySpec};
pub use memory::MemoryStore;
pub use middleware::{throttle_middleware, DenyPolicy, HttpThrottle, SessionId};
pub use options::ThrottleOptions;
pub use server::create_app;
pub use store::{RecordStore, Storage, ThrottleRecord};
pub use throttler::Throttle;
