use super::router::Router;
use super::routes::{
    ControllerGroupHandler, CoverCommandHandler, CoverPositionHandler, GroupCommandHandler,
    GroupPositionHandler, RefreshHandler,
};
use crate::{
    bridge::Bridge,
    configuration::MqttConfig,
    cover::{slug, BlindsCover, CoverGroup},
    poller::StateSink,
    status::CoverState,
};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnAck, Event, Incoming, MqttOptions, Publish, QoS, SubscribeFilter};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::{unbounded_channel, Sender};
use tracing::*;

enum MqttUpdate {
    Message(Publish),
    Reconnection(ConnAck),
}

pub fn start_mqtt_service(
    mqtt_config: &MqttConfig,
    bridge: Arc<Bridge>,
    refresh: Sender<()>,
) -> anyhow::Result<AsyncClient> {
    let mut mqttoptions = MqttOptions::new(
        &mqtt_config.client_id,
        &mqtt_config.broker_host,
        mqtt_config.broker_port,
    );
    info!("Starting MQTT server with options {:?}", mqttoptions);
    mqttoptions.set_keep_alive(Duration::from_secs(5));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);
    let client_clone = client.clone();

    let base_topic = mqtt_config.base_route.clone();

    info!("MQTT base topic {}", base_topic);

    let (message_sender, mut message_receiver) = unbounded_channel();

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(notification) => match notification {
                    Event::Incoming(Incoming::Publish(publish)) => {
                        if let Err(e) = message_sender.send(MqttUpdate::Message(publish)) {
                            error!("Error sending message {}", e);
                        }
                    }
                    Event::Incoming(Incoming::ConnAck(con_ack)) => {
                        if let Err(e) = message_sender.send(MqttUpdate::Reconnection(con_ack)) {
                            error!("Error sending message {}", e);
                        }
                    }
                    _ => (),
                },
                Err(e) => {
                    error!("Error processing eventloop notifications {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut router = Router::default();

        router.add_handler(
            &format!("{}/cover/+/set", base_topic),
            CoverCommandHandler::new(bridge.clone(), refresh.clone()),
        );

        router.add_handler(
            &format!("{}/cover/+/set_position", base_topic),
            CoverPositionHandler::new(bridge.clone(), refresh.clone()),
        );

        router.add_handler(
            &format!("{}/group/+/set", base_topic),
            GroupCommandHandler::new(bridge.clone(), refresh.clone()),
        );

        router.add_handler(
            &format!("{}/group/+/set_position", base_topic),
            GroupPositionHandler::new(bridge.clone(), refresh.clone()),
        );

        router.add_handler(
            &format!("{}/controller_group/+/set", base_topic),
            ControllerGroupHandler::new(bridge.clone(), refresh.clone()),
        );

        router.add_handler(
            &format!("{}/refresh", base_topic),
            RefreshHandler::new(refresh.clone()),
        );

        // subscriptions are (re)made on every ConnAck
        while let Some(update) = message_receiver.recv().await {
            match update {
                MqttUpdate::Message(message) => {
                    match router
                        .handle_message(&message.topic, &message.payload)
                        .await
                    {
                        Ok(false) => error!("No handler for topic: \"{}\"", &message.topic),
                        Ok(true) => (),
                        Err(e) => error!("Failed running handler with {:?}", e),
                    }
                }
                MqttUpdate::Reconnection(_) => {
                    let topics = router
                        .topics_for_subscription()
                        .map(|topic| SubscribeFilter {
                            path: topic.to_owned(),
                            qos: QoS::AtMostOnce,
                        })
                        .collect::<Vec<_>>();
                    info!("Subscribing to {} topics", topics.len());
                    if let Err(e) = client.subscribe_many(topics).await {
                        error!("Failed to subscribe {}", e);
                    }
                }
            }
        }
    });

    Ok(client_clone)
}

#[derive(Serialize)]
struct Attributes<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    members: Option<Vec<&'a str>>,
    #[serde(flatten)]
    state: &'a CoverState,
    label: &'static str,
}

/// Publishes retained cover state under `<base>/cover/<slug>/...` and `<base>/group/<slug>/...`
pub struct MqttStatePublisher {
    client: AsyncClient,
    base_topic: String,
}

impl MqttStatePublisher {
    pub fn new(client: AsyncClient, base_topic: &str) -> Self {
        Self {
            client,
            base_topic: base_topic.to_owned(),
        }
    }

    async fn publish_state(
        &self,
        kind: &str,
        name: &str,
        state: &CoverState,
        attributes: &Attributes<'_>,
    ) -> anyhow::Result<()> {
        let prefix = format!("{}/{}/{}", self.base_topic, kind, slug(name));
        self.client
            .publish(
                format!("{}/state", prefix),
                QoS::AtLeastOnce,
                true,
                state.label(),
            )
            .await?;
        if let Some(position) = state.position {
            self.client
                .publish(
                    format!("{}/position", prefix),
                    QoS::AtLeastOnce,
                    true,
                    position.to_string(),
                )
                .await?;
        }
        self.client
            .publish(
                format!("{}/attributes", prefix),
                QoS::AtLeastOnce,
                true,
                serde_json::to_vec(attributes)?,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StateSink for MqttStatePublisher {
    async fn cover_state(&self, cover: &BlindsCover, state: &CoverState) -> anyhow::Result<()> {
        let attributes = Attributes {
            name: cover.name(),
            id: Some(cover.id().to_string()),
            module: Some(&cover.info().module),
            members: None,
            state,
            label: state.label(),
        };
        self.publish_state("cover", cover.name(), state, &attributes)
            .await
    }

    async fn group_state(&self, group: &CoverGroup, state: &CoverState) -> anyhow::Result<()> {
        let attributes = Attributes {
            name: group.name(),
            id: None,
            module: None,
            members: Some(group.members().iter().map(|member| member.name()).collect()),
            state,
            label: state.label(),
        };
        self.publish_state("group", group.name(), state, &attributes)
            .await
    }
}
