pub mod config;
pub mod publisher;


pub use config::{ConfigError, RabbitMqConfig};
pub use publisher::{PublisherError, RabbitMqPublisher};
