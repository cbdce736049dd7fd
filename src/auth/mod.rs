pub mod abac;
pub mod middleware;
pub mod session;
