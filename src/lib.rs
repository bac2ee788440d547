pub mod agent;
pub mod definition;
pub mod executor;
pub mod ops;
pub mod session;
pub mod shared;
pub mod state;
