//! Topic-based event publisher.
//!
//! `publish` dispatches every matching handler on its own task, so it
//! never blocks and never observes handler errors. That fan-out means no
//! ordering guarantee between events; per-client ordering is restored by
//! the hub, which routes everything for one connection into a single
//! ordered outbound queue.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::messages::{
    ClockUpdatePayload, EngineMovePayload, GameCreatedPayload, GameOverPayload, GameStatePayload,
    TimeUpPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    GameCreated,
    MoveProcessed,
    EngineMoved,
    ClockUpdated,
    TimeUp,
    GameOver,
    GameTerminated,
    ConnectionClosed,
}

/// An event on the bus. `game_id` is present for game-scoped events.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub game_id: Option<Uuid>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    GameCreated(GameCreatedPayload),
    GameState(GameStatePayload),
    EngineMove(EngineMovePayload),
    ClockUpdate(ClockUpdatePayload),
    TimeUp(TimeUpPayload),
    GameOver(GameOverPayload),
    GameTerminated { game_id: Uuid },
    ConnectionClosed { connection_id: Uuid },
}

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Central publisher. Subscriptions are permanent for the bus lifetime.
#[derive(Default)]
pub struct Publisher {
    subscribers: RwLock<HashMap<EventType, Vec<Handler>>>,
    all_subscribers: RwLock<Vec<Handler>>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event type.
    pub fn subscribe<F, Fut>(&self, event_type: EventType, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.subscribers
            .write()
            .unwrap()
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    /// Registers a handler that receives every event.
    pub fn subscribe_all<F, Fut>(&self, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.all_subscribers.write().unwrap().push(handler);
    }

    /// Fans the event out to its topic handlers and the wildcard handlers,
    /// each on its own task.
    pub fn publish(&self, event: Event) {
        let mut handlers: Vec<Handler> = self
            .subscribers
            .read()
            .unwrap()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();
        handlers.extend(self.all_subscribers.read().unwrap().iter().cloned());

        for handler in handlers {
            tokio::spawn(handler(event.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    fn terminated(game_id: Uuid) -> Event {
        Event {
            event_type: EventType::GameTerminated,
            game_id: Some(game_id),
            payload: EventPayload::GameTerminated { game_id },
        }
    }

    #[tokio::test]
    async fn test_subscribe_receives_matching_topic_only() {
        let publisher = Publisher::new();
        let (tx, mut rx) = mpsc::channel(8);

        publisher.subscribe(EventType::GameTerminated, move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.game_id).await;
            }
        });

        let id = Uuid::new_v4();
        publisher.publish(terminated(id));
        publisher.publish(Event {
            event_type: EventType::ConnectionClosed,
            game_id: None,
            payload: EventPayload::ConnectionClosed {
                connection_id: Uuid::new_v4(),
            },
        });

        let got = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got, Some(Some(id)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_all_sees_every_event() {
        let publisher = Publisher::new();
        let (tx, mut rx) = mpsc::channel(8);

        publisher.subscribe_all(move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.event_type).await;
            }
        });

        publisher.publish(terminated(Uuid::new_v4()));
        publisher.publish(Event {
            event_type: EventType::ConnectionClosed,
            game_id: None,
            payload: EventPayload::ConnectionClosed {
                connection_id: Uuid::new_v4(),
            },
        });

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(
                timeout(Duration::from_secs(1), rx.recv())
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        assert!(seen.contains(&EventType::GameTerminated));
        assert!(seen.contains(&EventType::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers_is_a_no_op() {
        let publisher = Publisher::new();
        publisher.publish(terminated(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_multiple_handlers_all_fire() {
        let publisher = Publisher::new();
        let (tx, mut rx) = mpsc::channel(8);
        for n in 0..3 {
            let tx = tx.clone();
            publisher.subscribe(EventType::GameTerminated, move |_| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(n).await;
                }
            });
        }

        publisher.publish(terminated(Uuid::new_v4()));

        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(
                timeout(Duration::from_secs(1), rx.recv())
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2]);
    }
}
