use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use shepherd_types::TaskEvent;
use tokio::sync::{Mutex, RwLock, mpsc};

/// A freshly registered subscriber channel, bounded to defeat a slow reader
/// stalling Publish for everyone else.
pub type Subscriber = mpsc::Sender<TaskEvent>;
pub type SubscriberRx = mpsc::Receiver<TaskEvent>;

struct EventStream {
    buffer: VecDeque<TaskEvent>,
    capacity: usize,
    subscribers: Vec<Subscriber>,
    subscriber_capacity: usize,
    done: bool,
}

impl EventStream {
    fn new(capacity: usize, subscriber_capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            subscribers: Vec::new(),
            subscriber_capacity,
            done: false,
        }
    }

    fn publish(&mut self, events: Vec<TaskEvent>) {
        for event in events {
            if self.buffer.len() == self.capacity {
                self.buffer.pop_front();
            }
            self.buffer.push_back(event.clone());
            // Non-blocking fan-out: a full subscriber channel means that
            // subscriber is slow; it detects the gap via sequence number and
            // reconnects with `?after=lastSeen` rather than stalling Publish.
            self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
    }

    fn snapshot_after(&self, after: u64) -> Vec<TaskEvent> {
        self.buffer.iter().filter(|e| e.sequence > after).cloned().collect()
    }
}

/// Process-local pub/sub and ring buffer, keyed by task ID. Explicitly
/// in-memory only: a replica restart drops live streams, and there is no
/// cross-replica fan-out (this process is assumed to be the single active
/// ingress replica, per the concurrency model).
pub struct EventHub {
    streams: RwLock<HashMap<String, Arc<Mutex<EventStream>>>>,
    ring_capacity: usize,
    subscriber_capacity: usize,
}

impl EventHub {
    pub fn new(ring_capacity: usize, subscriber_capacity: usize) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            ring_capacity,
            subscriber_capacity,
        }
    }

    async fn stream_for(&self, task_id: &str) -> Arc<Mutex<EventStream>> {
        if let Some(stream) = self.streams.read().await.get(task_id) {
            return stream.clone();
        }
        let mut streams = self.streams.write().await;
        streams
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(EventStream::new(self.ring_capacity, self.subscriber_capacity))))
            .clone()
    }

    /// Appends events to the buffer (dropping the oldest on overflow) and
    /// fans them out non-blockingly to current subscribers.
    pub async fn publish(&self, task_id: &str, events: Vec<TaskEvent>) {
        let stream = self.stream_for(task_id).await;
        let mut stream = stream.lock().await;
        stream.publish(events);
    }

    /// Returns a snapshot of buffered events with `sequence > after` plus a
    /// freshly registered channel for future events. If the stream is already
    /// done, the channel is dropped immediately (callers see only history).
    pub async fn subscribe(&self, task_id: &str, after: u64) -> (Vec<TaskEvent>, Option<SubscriberRx>) {
        let stream = self.stream_for(task_id).await;
        let mut stream = stream.lock().await;
        let history = stream.snapshot_after(after);
        if stream.done {
            return (history, None);
        }
        let (tx, rx) = mpsc::channel(stream.subscriber_capacity);
        stream.subscribers.push(tx);
        (history, Some(rx))
    }

    /// Marks the stream done and drops all subscriber channels (closing
    /// them); subsequent Subscribe calls return history only.
    pub async fn complete(&self, task_id: &str) {
        let stream = self.stream_for(task_id).await;
        let mut stream = stream.lock().await;
        stream.done = true;
        stream.subscribers.clear();
    }

    /// Whether the stream has already been marked done.
    pub async fn is_done(&self, task_id: &str) -> bool {
        let stream = self.stream_for(task_id).await;
        let stream = stream.lock().await;
        stream.done
    }

    /// Removes the stream entirely. Called on a timer roughly 5 minutes after
    /// `complete`.
    pub async fn cleanup(&self, task_id: &str) {
        self.streams.write().await.remove(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shepherd_types::TaskEventType;

    fn event(sequence: u64) -> TaskEvent {
        TaskEvent {
            sequence,
            timestamp: Utc::now(),
            event_type: TaskEventType::Thinking,
            summary: format!("step {sequence}"),
            tool: None,
            input: None,
            output: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn subscribe_after_replays_only_newer_events() {
        let hub = EventHub::new(1000, 64);
        hub.publish("task-1", vec![event(1), event(2), event(3)]).await;
        let (history, _rx) = hub.subscribe("task-1", 1).await;
        assert_eq!(history.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn ring_buffer_drops_oldest_past_capacity() {
        let hub = EventHub::new(2, 64);
        hub.publish("task-1", vec![event(1), event(2), event(3)]).await;
        let (history, _rx) = hub.subscribe("task-1", 0).await;
        assert_eq!(history.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn complete_marks_done_and_future_subscribe_gets_history_only() {
        let hub = EventHub::new(1000, 64);
        hub.publish("task-1", vec![event(1)]).await;
        hub.complete("task-1").await;
        let (history, rx) = hub.subscribe("task-1", 0).await;
        assert_eq!(history.len(), 1);
        assert!(rx.is_none());
    }

    #[tokio::test]
    async fn live_events_reach_subscriber() {
        let hub = EventHub::new(1000, 64);
        let (_history, rx) = hub.subscribe("task-1", 0).await;
        let mut rx = rx.expect("stream not done");
        hub.publish("task-1", vec![event(1)]).await;
        let received = rx.recv().await.expect("event delivered");
        assert_eq!(received.sequence, 1);
    }
}
