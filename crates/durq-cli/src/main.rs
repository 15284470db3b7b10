//! Demo: a greeting queue with a handler that fails now and then.
//!
//! Configuration comes from `DURQ_*` variables (see `QueueConfig`). With
//! `DURQ_DATABASE_URL` set, run it twice and kill it in between to watch
//! recovery pick up where it left off.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant, sleep};
use tracing::{info, warn};

use durq_core::app::{HandlerError, MessageHandler, QueueBuilder, QueueConfig};
use durq_core::observability::init_tracing;
use durq_core::queue::MessageState;
use durq_core::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Greeting {
    name: String,
}

impl Message for Greeting {
    const TYPE: &'static str = "demo.greeting.v1";
}

struct FlakyGreeter {
    remaining_failures: AtomicU32,
    greeted: AtomicUsize,
}

impl FlakyGreeter {
    fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            greeted: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MessageHandler<Greeting> for FlakyGreeter {
    async fn handle(&self, message: &Greeting) -> Result<(), HandlerError> {
        let left = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if let Ok(left) = left {
            return Err(format!("intentional failure (left={left})").into());
        }

        println!("Hello, {}!", message.name);
        self.greeted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    enqueued: usize,
    rejected: usize,
    greeted: usize,
    recovered_at_startup: usize,
    still_recoverable: usize,
    dead: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info");

    let mut config = QueueConfig::from_env()?;
    // Failed attempts only come back through a reload pass.
    config.reload_interval_ms.get_or_insert(200);

    let app = QueueBuilder::<Greeting>::new(config).build().await?;
    let startup = app.startup_report();
    info!(?startup, "queue ready");

    let greeter = Arc::new(FlakyGreeter::new(2));
    let workers = app.spawn_workers(2, greeter.clone());
    let reload = app.spawn_reload_loop();

    let names = ["Ada", "Grace", "Linus", "Barbara", "Ken"];
    let mut enqueued = 0;
    let mut rejected = 0;
    for name in names {
        let greeting = Greeting {
            name: name.to_string(),
        };
        if app.queue().enqueue(greeting).await {
            enqueued += 1;
        } else {
            rejected += 1;
            warn!(name, "greeting rejected");
        }
    }

    let expected = enqueued + startup.admitted;
    let deadline = Instant::now() + Duration::from_secs(10);
    tokio::select! {
        _ = async {
            while greeter.greeted.load(Ordering::SeqCst) < expected && Instant::now() < deadline {
                sleep(Duration::from_millis(50)).await;
            }
        } => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    workers.shutdown_and_join().await;
    if let Some(reload) = reload {
        reload.shutdown_and_join().await;
    }

    let store = app.queue().persistence().store();
    let summary = Summary {
        enqueued,
        rejected,
        greeted: greeter.greeted.load(Ordering::SeqCst),
        recovered_at_startup: startup.admitted,
        still_recoverable: store
            .scan_ids(&MessageState::RECOVERABLE, usize::MAX)
            .await?
            .len(),
        dead: store.scan_ids(&[MessageState::Dead], usize::MAX).await?.len(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
