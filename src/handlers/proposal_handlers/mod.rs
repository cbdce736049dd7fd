pub mod crud;
pub mod votes;
pub mod workflow;
pub mod ws;
