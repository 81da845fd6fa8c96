use aircare_ingest::{FeedError, InMemoryFeed, SnapshotFeed, SnapshotListener};
use domain::{ChannelName, RawRecord};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingListener {
    batches: Mutex<Vec<Vec<RawRecord>>>,
    errors: Mutex<Vec<FeedError>>,
}

impl RecordingListener {
    fn batches(&self) -> Vec<Vec<RawRecord>> {
        self.batches.lock().expect("lock").clone()
    }

    fn errors(&self) -> Vec<FeedError> {
        self.errors.lock().expect("lock").clone()
    }
}

impl SnapshotListener for RecordingListener {
    fn on_batch(&self, batch: Vec<RawRecord>) {
        self.batches.lock().expect("lock").push(batch);
    }

    fn on_error(&self, error: FeedError) {
        self.errors.lock().expect("lock").push(error);
    }
}

fn reading(value: f64, minute: u32) -> RawRecord {
    RawRecord::new(value, format!("2024-01-01T08:{minute:02}:00"))
}

#[tokio::test]
async fn new_listener_receives_current_snapshot() {
    let feed = InMemoryFeed::new();
    let channel = ChannelName::new("temperature");
    feed.publish(channel.clone(), vec![reading(21.5, 0)])
        .expect("publish");

    let listener = Arc::new(RecordingListener::default());
    feed.add_listener(&channel, listener.clone())
        .await
        .expect("listen");

    assert_eq!(listener.batches(), vec![vec![reading(21.5, 0)]]);
}

#[tokio::test]
async fn empty_channel_delivers_empty_batch() {
    let feed = InMemoryFeed::new();
    let listener = Arc::new(RecordingListener::default());
    feed.add_listener(&ChannelName::new("humidity"), listener.clone())
        .await
        .expect("listen");
    assert_eq!(listener.batches(), vec![Vec::<RawRecord>::new()]);
}

#[tokio::test]
async fn append_delivers_full_snapshot_to_matching_channel_only() {
    let feed = InMemoryFeed::new();
    let temperature = ChannelName::new("temperature");
    let humidity = ChannelName::new("humidity");
    let temp_listener = Arc::new(RecordingListener::default());
    let hum_listener = Arc::new(RecordingListener::default());
    feed.add_listener(&temperature, temp_listener.clone())
        .await
        .expect("listen");
    feed.add_listener(&humidity, hum_listener.clone())
        .await
        .expect("listen");

    feed.append(temperature.clone(), reading(21.0, 0))
        .expect("append");
    feed.append(temperature.clone(), reading(21.5, 5))
        .expect("append");

    let batches = temp_listener.batches();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[2], vec![reading(21.0, 0), reading(21.5, 5)]);
    assert_eq!(hum_listener.batches().len(), 1);
    assert_eq!(feed.snapshot(&temperature).len(), 2);
}

#[tokio::test]
async fn removed_listener_gets_nothing_more() {
    let feed = InMemoryFeed::new();
    let channel = ChannelName::new("temperature");
    let listener = Arc::new(RecordingListener::default());
    let id = feed
        .add_listener(&channel, listener.clone())
        .await
        .expect("listen");

    assert!(feed.remove_listener(id));
    assert!(!feed.remove_listener(id));
    feed.append(channel.clone(), reading(20.0, 0)).expect("append");

    assert_eq!(listener.batches().len(), 1);
    assert_eq!(feed.listener_count(&channel), 0);
}

#[tokio::test]
async fn fail_reports_error_and_detaches_channel() {
    let feed = InMemoryFeed::new();
    let channel = ChannelName::new("humidity");
    let listener = Arc::new(RecordingListener::default());
    feed.add_listener(&channel, listener.clone())
        .await
        .expect("listen");

    let error = FeedError::PermissionDenied("rules".to_string());
    feed.fail(channel.clone(), error.clone()).expect("fail");
    feed.append(channel.clone(), reading(40.0, 0)).expect("append");

    assert_eq!(listener.errors(), vec![error]);
    assert_eq!(listener.batches().len(), 1);
    assert_eq!(feed.listener_count(&channel), 0);
}

/// 首次投递时停顿的监听器，用于放大注册与写入之间的竞争窗口。
struct SlowFirstBatchListener {
    batches: Mutex<Vec<Vec<RawRecord>>>,
    started: Mutex<Option<std::sync::mpsc::Sender<()>>>,
}

impl SnapshotListener for SlowFirstBatchListener {
    fn on_batch(&self, batch: Vec<RawRecord>) {
        let first = self.started.lock().expect("lock").take();
        if let Some(started) = first {
            started.send(()).expect("signal");
            std::thread::sleep(Duration::from_millis(100));
        }
        self.batches.lock().expect("lock").push(batch);
    }

    fn on_error(&self, _error: FeedError) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn publish_during_registration_is_delivered_last() {
    let feed = Arc::new(InMemoryFeed::new());
    let channel = ChannelName::new("temperature");
    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let listener = Arc::new(SlowFirstBatchListener {
        batches: Mutex::new(Vec::new()),
        started: Mutex::new(Some(started_tx)),
    });

    let registering = {
        let feed = feed.clone();
        let channel = channel.clone();
        let listener = listener.clone();
        tokio::spawn(async move { feed.add_listener(&channel, listener).await })
    };
    started_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("first delivery started");

    let writer = {
        let feed = feed.clone();
        let channel = channel.clone();
        std::thread::spawn(move || feed.publish(channel, vec![reading(21.5, 0)]))
    };
    writer.join().expect("writer thread").expect("publish");
    registering.await.expect("join").expect("listen");

    let batches = listener.batches.lock().expect("lock").clone();
    assert_eq!(batches, vec![Vec::new(), vec![reading(21.5, 0)]]);
    assert_eq!(batches.last(), Some(&feed.snapshot(&channel)));
}

#[tokio::test]
async fn concurrent_writers_leave_listener_on_stored_snapshot() {
    let feed = Arc::new(InMemoryFeed::new());
    let channel = ChannelName::new("humidity");
    let listener = Arc::new(RecordingListener::default());
    feed.add_listener(&channel, listener.clone())
        .await
        .expect("listen");

    let writers: Vec<_> = (0..8u32)
        .map(|writer| {
            let feed = feed.clone();
            let channel = channel.clone();
            std::thread::spawn(move || {
                for step in 0..25u32 {
                    let minute = (writer * 25 + step) % 60;
                    if step % 5 == 0 {
                        feed.publish(channel.clone(), vec![reading(f64::from(writer), minute)])
                            .expect("publish");
                    } else {
                        feed.append(channel.clone(), reading(f64::from(step), minute))
                            .expect("append");
                    }
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread");
    }

    let batches = listener.batches();
    assert_eq!(batches.len(), 1 + 8 * 25);
    assert_eq!(batches.last(), Some(&feed.snapshot(&channel)));
}
