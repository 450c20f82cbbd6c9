use async_trait::async_trait;
use rumqttc::matches;

#[derive(Default)]
pub struct Router {
    table: Vec<(String, Box<dyn RouteHandler>)>,
}

impl Router {
    pub fn add_handler(&mut self, topic: &str, handler: Box<dyn RouteHandler>) {
        self.table.push((String::from(topic), handler));
    }

    pub fn topics_for_subscription(&self) -> impl Iterator<Item = &str> {
        self.table.iter().map(|(topic, _)| topic.as_str())
    }

    /// First handler whose filter matches wins, `+` and `#` included
    pub async fn handle_message(&mut self, topic: &str, content: &[u8]) -> anyhow::Result<bool> {
        if let Some((_, handler)) = self
            .table
            .iter_mut()
            .find(|(filter, _)| matches(topic, filter))
        {
            handler.call(topic, content).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[async_trait]
pub trait RouteHandler: Send {
    async fn call(&mut self, topic: &str, content: &[u8]) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl RouteHandler for Counter {
        async fn call(&mut self, _topic: &str, _content: &[u8]) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn wildcard_filters() {
        let cover_count = Arc::new(AtomicUsize::new(0));
        let refresh_count = Arc::new(AtomicUsize::new(0));
        let rest_count = Arc::new(AtomicUsize::new(0));
        let mut router = Router::default();
        router.add_handler("blinds/cover/+/set", Box::new(Counter(cover_count.clone())));
        router.add_handler("blinds/refresh", Box::new(Counter(refresh_count.clone())));
        router.add_handler("blinds/group/#", Box::new(Counter(rest_count.clone())));

        assert!(router
            .handle_message("blinds/cover/office_1/set", b"OPEN")
            .await
            .unwrap());
        assert!(!router
            .handle_message("blinds/cover/office_1/set_position", b"40")
            .await
            .unwrap());
        assert!(!router.handle_message("blinds/cover/set", b"OPEN").await.unwrap());
        assert!(router.handle_message("blinds/refresh", b"").await.unwrap());
        assert!(!router.handle_message("blinds/refresh/now", b"").await.unwrap());
        assert!(router
            .handle_message("blinds/group/office/set_position", b"10")
            .await
            .unwrap());

        assert_eq!(cover_count.load(Ordering::SeqCst), 1);
        assert_eq!(refresh_count.load(Ordering::SeqCst), 1);
        assert_eq!(rest_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatches_to_matching_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut router = Router::default();
        router.add_handler("blinds/cover/+/set", Box::new(Counter(count.clone())));

        assert!(router
            .handle_message("blinds/cover/mba_1/set", b"OPEN")
            .await
            .unwrap());
        assert!(!router.handle_message("blinds/other", b"").await.unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            router.topics_for_subscription().collect::<Vec<_>>(),
            vec!["blinds/cover/+/set"]
        );
    }
}
