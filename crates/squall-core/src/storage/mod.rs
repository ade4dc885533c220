//! Responder storage for static and dynamic routes

pub mod dynamic_storage;
pub mod static_storage;

pub use dynamic_storage::{
    handler, DynamicHandler, DynamicMatch, DynamicResponder, DynamicResponderStorage, DynamicRoute,
};
pub use static_storage::{
    compile, HashedStaticStorage, PerfectHashStaticStorage, StaticResponderStorage, StaticRoute,
};
