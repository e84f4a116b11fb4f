use futures_util::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

// --- Data Types and Constants ---

#[derive(Debug)]
pub struct HeavyPayload {
    pub _id: u64,
    pub _payload: [u8; 1024], // 1KB array
}
pub type ArcData = Arc<HeavyPayload>;
pub const NUM_CONSUMERS: usize = 5;

fn payloads(count: u64) -> Vec<ArcData> {
    (0..count)
        .map(|i| {
            Arc::new(HeavyPayload {
                _id: i,
                _payload: [0; 1024],
            })
        })
        .collect()
}

// --- Channel Fan-Out (one pump task, one channel per consumer) ---

pub fn run_channel_fan_out<S>(mut original_stream: S) -> Vec<ReceiverStream<ArcData>>
where
    S: Stream<Item = ArcData> + Unpin + Send + 'static,
{
    let (txs, rx_streams): (Vec<_>, Vec<_>) = (0..NUM_CONSUMERS)
        .map(|_| {
            let (tx, rx) = mpsc::channel(1024);
            (tx, ReceiverStream::new(rx))
        })
        .unzip();

    tokio::spawn(async move {
        while let Some(item) = original_stream.next().await {
            for tx in &txs {
                let _ = tx.send(item.clone()).await;
            }
        }
    });
    rx_streams
}

// --- Source Stream Generators ---

// Source A: In-Memory, always ready
pub fn generate_in_memory_stream(
    count: u64,
) -> futures_util::stream::Iter<std::vec::IntoIter<ArcData>> {
    futures_util::stream::iter(payloads(count))
}

// Source B: Simulated I/O. Every other poll answers Pending after scheduling
// its own wake-up, so the fork parks and resumes the upstream once per item.
pub struct SimulatedIoStream {
    data: Vec<ArcData>,
    index: usize,
    ready: bool,
}

impl Stream for SimulatedIoStream {
    type Item = ArcData;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !std::mem::replace(&mut self.ready, true) {
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.ready = false;

        let item = self.data.get(self.index).cloned();
        self.index += 1;
        Poll::Ready(item)
    }
}

pub fn generate_simulated_io_stream(count: u64) -> SimulatedIoStream {
    SimulatedIoStream {
        data: payloads(count),
        index: 0,
        ready: false,
    }
}
