mod mqtt_server;
pub mod router;
mod routes;

pub use mqtt_server::{start_mqtt_service, MqttStatePublisher};
