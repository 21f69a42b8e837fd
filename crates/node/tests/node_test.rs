//! A single node over real ZeroMQ sockets: payloads pushed at its listener
//! are processed, and it elects itself master of a one-node cluster.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use zeromq::{PushSocket, Socket, SocketSend, ZmqMessage};

use switchyard_node::{Node, NodeConfig};
use switchyard_scheduler::{Payload, PayloadHandler, SchedulerError};

const CONFIG: &str = r#"
service_id = "node-a"
stats_port = 0
report_interval_secs = 1

[scheduler]
shutdown_grace_ms = 2000

[[scheduler.bulkhead]]
level = 0
reservation = 4

[negotiation]
tick_interval_ms = 20
comms_timeout_ms = 200
initial_wait_ms = 80
request_interval_ms = 40

[cluster]
bind = "tcp://127.0.0.1:15831"

[[clients]]
id = "orders-hot"
channel = "orders"
endpoint = "tcp://127.0.0.1:15830"
partition = { priority = 0 }
"#;

#[derive(Default)]
struct CountingHandler {
    bodies: std::sync::Mutex<Vec<Vec<u8>>>,
    handled: AtomicUsize,
}

#[async_trait]
impl PayloadHandler for CountingHandler {
    async fn handle(&self, payload: Payload) -> Result<(), SchedulerError> {
        self.bodies.lock().unwrap().push(payload.body);
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 10s");
}

#[tokio::test]
async fn node_processes_pushed_payloads_and_becomes_master() {
    let config = NodeConfig::from_toml(CONFIG).unwrap();
    let handler = Arc::new(CountingHandler::default());
    let node = Arc::new(Node::build(config, handler.clone()).await.unwrap());

    let (shutdown, rx) = watch::channel(false);
    let running = Arc::clone(&node);
    let task = tokio::spawn(async move { running.run(rx).await });

    let mut push = PushSocket::new();
    push.connect("tcp://127.0.0.1:15830").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    for body in ["one", "two", "three"] {
        push.send(ZmqMessage::from(body.as_bytes().to_vec())).await.unwrap();
    }

    wait_for(|| handler.handled.load(Ordering::SeqCst) == 3).await;
    let mut bodies = handler.bodies.lock().unwrap().clone();
    bodies.sort();
    assert_eq!(bodies, vec![b"one".to_vec(), b"three".to_vec(), b"two".to_vec()]);

    let negotiation = node.state().negotiation.clone().unwrap();
    wait_for(|| negotiation.is_master()).await;

    let stats = node.state().statistics();
    assert_eq!(stats.scheduler.payloads_processed, 3);
    assert_eq!(stats.scheduler.collections.len(), 1);
    assert!(stats.negotiation.unwrap().is_master);

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
    assert!(!negotiation.is_master());
    assert_eq!(node.state().scheduler.bulkhead().active_total(), 0);
}

#[tokio::test]
async fn disabled_negotiation_still_schedules() {
    let toml = CONFIG
        .replace("tcp://127.0.0.1:15830", "tcp://127.0.0.1:15832")
        .replace("[negotiation]", "[negotiation]\nenabled = false");
    let config = NodeConfig::from_toml(&toml).unwrap();
    let handler = Arc::new(CountingHandler::default());
    let node = Arc::new(Node::build(config, handler.clone()).await.unwrap());
    assert!(node.state().negotiation.is_none());

    let (shutdown, rx) = watch::channel(false);
    let running = Arc::clone(&node);
    let task = tokio::spawn(async move { running.run(rx).await });

    let mut push = PushSocket::new();
    push.connect("tcp://127.0.0.1:15832").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    push.send(ZmqMessage::from(b"solo".to_vec())).await.unwrap();

    wait_for(|| handler.handled.load(Ordering::SeqCst) == 1).await;
    assert!(!node.state().health().is_master);

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
}
