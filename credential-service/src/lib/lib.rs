pub mod config;
pub mod domain;
pub mod inbound;
pub mod outbound;

pub use domain::credential;
pub use outbound::notifications;
pub use outbound::repositories;
